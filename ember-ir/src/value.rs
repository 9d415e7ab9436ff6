//! The base descriptor for various values within the IR.
//!
//! [`Value`]s can be constants, function parameters, captured free values, function references,
//! host symbols and instructions.  [`Instruction`]s generally refer to each other and to the other
//! kinds via the [`Value`] wrapper.
//!
//! Like most IR data structures they are `Copy` and cheap to pass around by value.  They are
//! therefore also easy to replace, a common practise for analysis passes.

use ember_types::Span;
use rustc_hash::FxHashMap;

use crate::{
    constant::Constant, context::Context, function::Function, instruction::Instruction,
    irtype::Type,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Value(pub slotmap::DefaultKey);

#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct ValueContent {
    pub value: ValueDatum,
    pub span: Option<Span>,
    pub ty: Option<Type>,
    /// The variable this value was last bound to, if any.
    pub name: Option<String>,
}

#[doc(hidden)]
#[derive(Debug, Clone)]
pub enum ValueDatum {
    Constant(Constant),
    Parameter {
        function: Function,
        index: usize,
        name: String,
    },
    /// A binding read inside `function` but owned by an enclosing scope.  `captured` is the outer
    /// value it was bound to when the closure was built, or `None` while it waits to be bound at
    /// a call site.
    FreeValue {
        function: Function,
        name: String,
        captured: Option<Value>,
    },
    /// A function used as a first-class value.
    Function(Function),
    /// A symbol provided by the host environment.
    Extern { name: String },
    Instruction(Instruction),
}

impl Value {
    fn new(
        context: &mut Context,
        value: ValueDatum,
        span: Option<Span>,
        ty: Option<Type>,
    ) -> Value {
        Value(context.values.insert(ValueContent {
            value,
            span,
            ty,
            name: None,
        }))
    }

    /// Return a new constant [`Value`].
    pub fn new_constant(context: &mut Context, constant: Constant, span: Option<Span>) -> Value {
        let ty = constant.ty;
        Self::new(context, ValueDatum::Constant(constant), span, Some(ty))
    }

    pub fn new_parameter(
        context: &mut Context,
        function: Function,
        index: usize,
        name: String,
        span: Option<Span>,
    ) -> Value {
        let param = Self::new(
            context,
            ValueDatum::Parameter {
                function,
                index,
                name: name.clone(),
            },
            span,
            None,
        );
        param.set_name(context, name);
        param
    }

    pub fn new_free_value(
        context: &mut Context,
        function: Function,
        name: String,
        captured: Option<Value>,
        span: Option<Span>,
    ) -> Value {
        let free_value = Self::new(
            context,
            ValueDatum::FreeValue {
                function,
                name: name.clone(),
                captured,
            },
            span,
            None,
        );
        free_value.set_name(context, name);
        free_value
    }

    pub fn new_function_ref(
        context: &mut Context,
        function: Function,
        span: Option<Span>,
    ) -> Value {
        Self::new(context, ValueDatum::Function(function), span, None)
    }

    pub fn new_extern(context: &mut Context, name: String, ty: Type, span: Option<Span>) -> Value {
        Self::new(context, ValueDatum::Extern { name }, span, Some(ty))
    }

    /// Return a new instruction [`Value`].  It belongs to no block until inserted into one.
    pub fn new_instruction(
        context: &mut Context,
        instruction: Instruction,
        span: Option<Span>,
    ) -> Value {
        Self::new(context, ValueDatum::Instruction(instruction), span, None)
    }

    pub fn get_datum<'a>(&self, context: &'a Context) -> &'a ValueDatum {
        &context.values[self.0].value
    }

    /// Return whether this is a constant value.
    pub fn is_constant(&self, context: &Context) -> bool {
        matches!(context.values[self.0].value, ValueDatum::Constant(_))
    }

    pub fn get_constant<'a>(&self, context: &'a Context) -> Option<&'a Constant> {
        match &context.values[self.0].value {
            ValueDatum::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// The boolean this value is, if it is a boolean constant.
    pub fn get_bool_constant(&self, context: &Context) -> Option<bool> {
        self.get_constant(context).and_then(Constant::as_bool)
    }

    pub fn get_instruction<'a>(&self, context: &'a Context) -> Option<&'a Instruction> {
        match &context.values[self.0].value {
            ValueDatum::Instruction(ins) => Some(ins),
            _ => None,
        }
    }

    pub fn get_instruction_mut<'a>(&self, context: &'a mut Context) -> Option<&'a mut Instruction> {
        match &mut context.values[self.0].value {
            ValueDatum::Instruction(ins) => Some(ins),
            _ => None,
        }
    }

    /// Return whether this value is an instruction, and specifically a 'terminator'.
    ///
    /// A terminator is always the last instruction in a block (and may not appear anywhere else)
    /// and is either a branch or return.
    pub fn is_terminator(&self, context: &Context) -> bool {
        self.get_instruction(context)
            .is_some_and(|ins| ins.is_terminator())
    }

    pub fn is_phi(&self, context: &Context) -> bool {
        matches!(
            self.get_instruction(context),
            Some(Instruction::Phi { .. })
        )
    }

    /// The function this value refers to when used as a first-class function.
    pub fn get_function_ref(&self, context: &Context) -> Option<Function> {
        match context.values[self.0].value {
            ValueDatum::Function(function) => Some(function),
            _ => None,
        }
    }

    /// If this value is an instruction and if any of its operands are in `replace_map` then
    /// replace them with the mapped values.
    pub fn replace_instruction_values(
        &self,
        context: &mut Context,
        replace_map: &FxHashMap<Value, Value>,
    ) {
        if let ValueDatum::Instruction(instruction) = &mut context.values[self.0].value {
            instruction.replace_values(replace_map);
        }
    }

    /// Overwrite the datum of this value, keeping its span, type and name.
    pub fn replace(&self, context: &mut Context, other: ValueDatum) {
        context.values[self.0].value = other;
    }

    /// Get the type for this value, if it has been resolved.
    pub fn get_type(&self, context: &Context) -> Option<Type> {
        context.values[self.0].ty
    }

    pub fn set_type(&self, context: &mut Context, ty: Type) {
        context.values[self.0].ty = Some(ty);
    }

    pub fn get_span(&self, context: &Context) -> Option<Span> {
        context.values[self.0].span.clone()
    }

    pub fn get_name<'a>(&self, context: &'a Context) -> Option<&'a str> {
        context.values[self.0].name.as_deref()
    }

    pub fn set_name(&self, context: &mut Context, name: String) {
        context.values[self.0].name = Some(name);
    }
}

//! A typical function data type.
//!
//! [`Function`] is named, takes zero or more parameters and contains a list of [`Block`]s.  Nested
//! function literals are functions too: they link to their `parent`, record the bindings they
//! capture from it as free values, and record the outer bindings they write as side effects.

use ember_types::{FxIndexMap, Span};
use rustc_hash::FxHashMap;

use crate::{
    block::{Block, BlockIterator, Label},
    context::Context,
    instruction::Instruction,
    irtype::Type,
    package::Package,
    value::{Value, ValueDatum},
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Function(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct FunctionContent {
    pub name: String,
    pub package: Package,
    pub parent: Option<Function>,
    pub children: Vec<Function>,
    pub params: Vec<Value>,
    /// The last parameter collects any remaining arguments.
    pub variadic: bool,
    pub blocks: Vec<Block>,
    pub free_values: FxIndexMap<String, Value>,
    /// The last value each captured binding was assigned inside this function.
    pub side_effects: FxIndexMap<String, Value>,
    pub defer_block: Option<Block>,
    /// The signature, once inferred.
    pub ty: Option<Type>,
    pub span: Option<Span>,

    next_label_idx: u64,
}

impl Function {
    /// Return a new [`Function`] handle.
    ///
    /// Creates a [`Function`] in the `context` within `package` and returns a handle.  The
    /// function is given an `entry` block and is registered as a child of `parent`.
    pub fn new(
        context: &mut Context,
        package: Package,
        name: String,
        parent: Option<Function>,
        span: Option<Span>,
    ) -> Function {
        let content = FunctionContent {
            name,
            package,
            parent,
            children: Vec::new(),
            params: Vec::new(),
            variadic: false,
            blocks: Vec::new(),
            free_values: FxIndexMap::default(),
            side_effects: FxIndexMap::default(),
            defer_block: None,
            ty: None,
            span,
            next_label_idx: 0,
        };
        let func = Function(context.functions.insert(content));

        context.packages[package.0].functions.push(func);
        if let Some(parent) = parent {
            context.functions[parent.0].children.push(func);
        }

        let entry_block = Block::new(context, func, Some("entry".to_owned()));
        context.functions[func.0].blocks.push(entry_block);

        func
    }

    /// Create and append a new [`Block`] to this function.
    pub fn create_block(&self, context: &mut Context, label: Option<Label>) -> Block {
        let block = Block::new(context, *self, label);
        context.functions[self.0].blocks.push(block);
        block
    }

    /// Remove `block` from this function.  It must have no predecessors.
    pub fn remove_block(&self, context: &mut Context, block: Block) {
        assert!(
            context.blocks[block.0].preds.is_empty(),
            "only unreachable blocks may be removed"
        );
        for succ in context.blocks[block.0].succs.clone() {
            let preds = &mut context.blocks[succ.0].preds;
            if let Some(pos) = preds.iter().position(|pred| *pred == block) {
                preds.remove(pos);
            }
        }
        context.functions[self.0].blocks.retain(|b| *b != block);
    }

    /// Return a label which is unique to this function.
    ///
    /// A `hint` may be provided which will be used as a base for the label, otherwise `block` is
    /// used.
    pub fn get_unique_label(&self, context: &mut Context, hint: Option<String>) -> String {
        match hint {
            Some(hint) => {
                if context.functions[self.0]
                    .blocks
                    .iter()
                    .any(|block| context.blocks[block.0].label == hint)
                {
                    let idx = self.get_next_label_idx(context);
                    self.get_unique_label(context, Some(format!("{hint}{idx}")))
                } else {
                    hint
                }
            }
            None => {
                let idx = self.get_next_label_idx(context);
                self.get_unique_label(context, Some(format!("block{idx}")))
            }
        }
    }

    fn get_next_label_idx(&self, context: &mut Context) -> u64 {
        let func = &mut context.functions[self.0];
        let idx = func.next_label_idx;
        func.next_label_idx += 1;
        idx
    }

    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.functions[self.0].name
    }

    pub fn get_package(&self, context: &Context) -> Package {
        context.functions[self.0].package
    }

    pub fn get_parent(&self, context: &Context) -> Option<Function> {
        context.functions[self.0].parent
    }

    pub fn get_children(&self, context: &Context) -> Vec<Function> {
        context.functions[self.0].children.clone()
    }

    pub fn get_entry_block(&self, context: &Context) -> Block {
        context.functions[self.0].blocks[0]
    }

    pub fn num_blocks(&self, context: &Context) -> usize {
        context.functions[self.0].blocks.len()
    }

    pub fn get_span(&self, context: &Context) -> Option<Span> {
        context.functions[self.0].span.clone()
    }

    pub fn get_type(&self, context: &Context) -> Option<Type> {
        context.functions[self.0].ty
    }

    pub fn set_type(&self, context: &mut Context, ty: Type) {
        context.functions[self.0].ty = Some(ty);
    }

    /// Append a parameter named `name`.
    pub fn add_param(&self, context: &mut Context, name: String, span: Option<Span>) -> Value {
        let index = context.functions[self.0].params.len();
        let param = Value::new_parameter(context, *self, index, name, span);
        context.functions[self.0].params.push(param);
        param
    }

    pub fn params<'a>(&self, context: &'a Context) -> &'a [Value] {
        &context.functions[self.0].params
    }

    pub fn set_variadic(&self, context: &mut Context, variadic: bool) {
        context.functions[self.0].variadic = variadic;
    }

    pub fn is_variadic(&self, context: &Context) -> bool {
        context.functions[self.0].variadic
    }

    /// Record a captured binding.  `captured` is `None` when the binding waits for a call site.
    pub fn add_free_value(
        &self,
        context: &mut Context,
        name: String,
        captured: Option<Value>,
        span: Option<Span>,
    ) -> Value {
        let free_value = Value::new_free_value(context, *self, name.clone(), captured, span);
        context.functions[self.0]
            .free_values
            .insert(name, free_value);
        free_value
    }

    pub fn get_free_value(&self, context: &Context, name: &str) -> Option<Value> {
        context.functions[self.0].free_values.get(name).copied()
    }

    pub fn free_values_iter(&self, context: &Context) -> Vec<(String, Value)> {
        context.functions[self.0]
            .free_values
            .iter()
            .map(|(name, val)| (name.clone(), *val))
            .collect()
    }

    /// The free values still waiting to be bound at a call site.
    pub fn unbound_free_values(&self, context: &Context) -> Vec<(String, Value)> {
        self.free_values_iter(context)
            .into_iter()
            .filter(|(_, val)| {
                matches!(
                    val.get_datum(context),
                    ValueDatum::FreeValue { captured: None, .. }
                )
            })
            .collect()
    }

    pub fn set_side_effect(&self, context: &mut Context, name: String, value: Value) {
        context.functions[self.0].side_effects.insert(name, value);
    }

    pub fn side_effects_iter(&self, context: &Context) -> Vec<(String, Value)> {
        context.functions[self.0]
            .side_effects
            .iter()
            .map(|(name, val)| (name.clone(), *val))
            .collect()
    }

    pub fn get_defer_block(&self, context: &Context) -> Option<Block> {
        context.functions[self.0].defer_block
    }

    /// The block holding deferred calls, created on first use.  It has no predecessors.
    pub fn get_or_create_defer_block(&self, context: &mut Context) -> Block {
        match context.functions[self.0].defer_block {
            Some(block) => block,
            None => {
                let block = self.create_block(context, Some("defer".to_owned()));
                context.functions[self.0].defer_block = Some(block);
                block
            }
        }
    }

    /// Return an iterator for each block in this function.
    pub fn block_iter(&self, context: &Context) -> BlockIterator {
        BlockIterator::new(context, self)
    }

    /// Every phi and instruction in this function, block by block, phis first.
    pub fn instruction_iter(&self, context: &Context) -> Vec<(Block, Value)> {
        context.functions[self.0]
            .blocks
            .iter()
            .flat_map(|block| {
                let content = &context.blocks[block.0];
                content
                    .phis
                    .iter()
                    .chain(content.instructions.iter())
                    .map(move |ins_val| (*block, *ins_val))
            })
            .collect()
    }

    /// The operand lists of every `Return` outside the defer block.
    pub fn return_values(&self, context: &Context) -> Vec<Vec<Value>> {
        let defer_block = self.get_defer_block(context);
        self.block_iter(context)
            .filter(|block| Some(*block) != defer_block)
            .filter_map(|block| match block.get_terminator(context) {
                Some(Instruction::Return(values)) => Some(values.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replace every use of `old_val` in this function with `new_val`, including the capture
    /// edges of its free values and its recorded side effects.
    pub fn replace_value(&self, context: &mut Context, old_val: Value, new_val: Value) {
        let mut replace_map = FxHashMap::default();
        replace_map.insert(old_val, new_val);
        self.replace_values(context, &replace_map);
    }

    pub fn replace_values(&self, context: &mut Context, replace_map: &FxHashMap<Value, Value>) {
        for block in self.block_iter(context) {
            block.replace_values(context, replace_map);
        }
        for (_, free_value) in self.free_values_iter(context) {
            if let ValueDatum::FreeValue {
                captured: Some(captured),
                ..
            } = &mut context.values[free_value.0].value
            {
                while let Some(new_val) = replace_map.get(captured) {
                    *captured = *new_val;
                }
            }
        }
        for value in context.functions[self.0].side_effects.values_mut() {
            while let Some(new_val) = replace_map.get(value) {
                *value = *new_val;
            }
        }
        for block in self.block_iter(context) {
            if let Some(cond) = context.blocks[block.0].condition.as_mut() {
                while let Some(new_val) = replace_map.get(cond) {
                    *cond = *new_val;
                }
            }
        }
    }
}

/// An iterator over each [`Function`] in a [`Package`].
pub struct FunctionIterator {
    functions: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl FunctionIterator {
    /// Return a new iterator for the functions in `package`.
    pub fn new(context: &Context, package: &Package) -> FunctionIterator {
        // Copy all the current function indices, so they may be modified in the context during
        // iteration.
        FunctionIterator {
            functions: context.packages[package.0]
                .functions
                .iter()
                .map(|func| func.0)
                .collect(),
            next: 0,
        }
    }
}

impl Iterator for FunctionIterator {
    type Item = Function;

    fn next(&mut self) -> Option<Function> {
        if self.next < self.functions.len() {
            let idx = self.next;
            self.next += 1;
            Some(Function(self.functions[idx]))
        } else {
            None
        }
    }
}

impl DoubleEndedIterator for FunctionIterator {
    fn next_back(&mut self) -> Option<Function> {
        if self.next < self.functions.len() {
            self.functions.pop().map(Function)
        } else {
            None
        }
    }
}

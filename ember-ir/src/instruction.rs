//! Instructions for data manipulation and control flow.
//!
//! The instruction set mirrors the operations of the scripting language rather than a machine:
//! calls carry the language's call-site flags, `Field`/`Update` cover both member and index
//! access, and `Next` is one step of any iteration.
//!
//! Terminators record their successor blocks; the inserter wires the matching predecessor and
//! successor edges when one is appended.

use std::fmt;

use ember_types::{FxIndexMap, Span};
use rustc_hash::FxHashMap;

use crate::{
    block::Block,
    context::Context,
    irtype::Type,
    value::Value,
};

#[derive(Debug, Clone)]
pub enum Instruction {
    /// A placeholder for a binding with no reaching definition.
    Undefine { name: String, kind: UndefineKind },
    BinaryOp {
        op: BinaryOpKind,
        arg1: Value,
        arg2: Value,
    },
    UnaryOp { op: UnaryOpKind, arg: Value },
    /// Merges one incoming value per predecessor; `edges` is positionally aligned with the
    /// block's predecessor list.
    Phi { name: String, edges: Vec<Value> },
    Call {
        callee: Value,
        args: Vec<Value>,
        /// `f(xs...)`: the last argument is already a spread slice.
        ellipsis: bool,
        /// `f()~`: a trailing error result is discarded.
        drop_error: bool,
        /// `go f()`.
        is_async: bool,
        /// The number of assignment targets the result is unpacked into.
        unpack: Option<usize>,
        /// Values supplied at this call for the callee's late-bound free values.
        binding: FxIndexMap<String, Value>,
    },
    /// Read a member (or, with a numeric key, an element) of `object`.
    Field {
        object: Value,
        key: Value,
        is_method: bool,
    },
    /// Write `value` into a member or element of `object`.
    Update {
        object: Value,
        key: Value,
        value: Value,
    },
    /// Construct a container or channel.  `refine` marks literal placeholders whose element
    /// type is refined from the written elements.
    Make {
        ty: Type,
        len: Option<Value>,
        cap: Option<Value>,
        refine: bool,
    },
    /// One iteration step over `iter`, producing a `key`, `field`, `ok` triple.
    Next { iter: Value },
    /// The new value of the outer binding `name` after `call` ran a closure that writes it.
    SideEffect {
        name: String,
        call: Value,
        value: Value,
    },
    /// The error caught by the handler guarding `try_block`.
    ErrorCatch { try_block: Block },
    /// `object[low:high:max]`, any bound may be left out.
    Slice {
        object: Value,
        low: Option<Value>,
        high: Option<Value>,
        max: Option<Value>,
    },
    /// `ch <- value`.
    Send { chan: Value, value: Value },
    /// `assert cond, msg`.
    Assert { cond: Value, msg: Option<Value> },
    Panic(Value),
    Recover,

    /// An unconditional jump.
    Jump(Block),
    If {
        cond: Value,
        true_block: Block,
        false_block: Block,
    },
    /// The loop header's branch.  `latch` jumps back to this block; `key` and `init` are the
    /// header phi compared in `cond` and its value on entry to the loop.
    Loop {
        cond: Value,
        body: Block,
        exit: Block,
        latch: Block,
        key: Option<Value>,
        init: Option<Value>,
    },
    /// `cond` is `None` for a switch without a tag, whose labels are conditions themselves.
    Switch {
        cond: Option<Value>,
        default: Block,
        labels: Vec<(Value, Block)>,
    },
    ErrorHandler {
        try_block: Block,
        catch_block: Block,
    },
    Return(Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndefineKind {
    /// No binding with this name is visible anywhere.
    Unresolved,
    /// The binding exists but has no value along some path.
    Declared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    /// Membership of `arg1` in the container `arg2`.
    In,
}

impl BinaryOpKind {
    pub fn as_str(&self) -> &'static str {
        use BinaryOpKind::*;
        match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            Xor => "xor",
            Shl => "shl",
            Shr => "shr",
            AndNot => "andnot",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            LogicalAnd => "land",
            LogicalOr => "lor",
            In => "in",
        }
    }

    pub fn is_comparison(&self) -> bool {
        use BinaryOpKind::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOpKind::LogicalAnd | BinaryOpKind::LogicalOr)
    }

    /// The result is a boolean whatever the operand types.
    pub fn yields_bool(&self) -> bool {
        self.is_comparison() || self.is_logical() || *self == BinaryOpKind::In
    }
}

impl UnaryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOpKind::Not => "not",
            UnaryOpKind::Neg => "neg",
            UnaryOpKind::Plus => "plus",
            UnaryOpKind::BitNot => "bitnot",
        }
    }
}

impl fmt::Display for BinaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UnaryOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Instruction {
    /// Every value this instruction reads.
    pub fn get_operands(&self) -> Vec<Value> {
        match self {
            Instruction::Undefine { .. }
            | Instruction::Make { len: None, cap: None, .. }
            | Instruction::ErrorCatch { .. }
            | Instruction::Recover
            | Instruction::Jump(_)
            | Instruction::ErrorHandler { .. } => vec![],
            Instruction::BinaryOp { arg1, arg2, .. } => vec![*arg1, *arg2],
            Instruction::UnaryOp { arg, .. } => vec![*arg],
            Instruction::Phi { edges, .. } => edges.clone(),
            Instruction::Call {
                callee,
                args,
                binding,
                ..
            } => std::iter::once(*callee)
                .chain(args.iter().copied())
                .chain(binding.values().copied())
                .collect(),
            Instruction::Field { object, key, .. } => vec![*object, *key],
            Instruction::Update { object, key, value } => vec![*object, *key, *value],
            Instruction::Make { len, cap, .. } => len.iter().chain(cap.iter()).copied().collect(),
            Instruction::Next { iter } => vec![*iter],
            Instruction::SideEffect { call, value, .. } => vec![*call, *value],
            Instruction::Slice {
                object,
                low,
                high,
                max,
            } => std::iter::once(*object)
                .chain(low.iter().chain(high.iter()).chain(max.iter()).copied())
                .collect(),
            Instruction::Send { chan, value } => vec![*chan, *value],
            Instruction::Assert { cond, msg } => std::iter::once(*cond).chain(*msg).collect(),
            Instruction::Panic(value) => vec![*value],
            Instruction::If { cond, .. } => vec![*cond],
            Instruction::Loop { cond, key, init, .. } => std::iter::once(*cond)
                .chain(key.iter().copied())
                .chain(init.iter().copied())
                .collect(),
            Instruction::Switch { cond, labels, .. } => cond
                .iter()
                .copied()
                .chain(labels.iter().map(|(label, _)| *label))
                .collect(),
            Instruction::Return(values) => values.clone(),
        }
    }

    /// Replace every operand found in `replace_map`, following chains of replacements.
    pub fn replace_values(&mut self, replace_map: &FxHashMap<Value, Value>) {
        let replace = |val: &mut Value| {
            while let Some(new_val) = replace_map.get(val) {
                *val = *new_val;
            }
        };
        match self {
            Instruction::Undefine { .. }
            | Instruction::ErrorCatch { .. }
            | Instruction::Recover
            | Instruction::Jump(_)
            | Instruction::ErrorHandler { .. } => (),
            Instruction::BinaryOp { arg1, arg2, .. } => {
                replace(arg1);
                replace(arg2);
            }
            Instruction::UnaryOp { arg, .. } => replace(arg),
            Instruction::Phi { edges, .. } => edges.iter_mut().for_each(replace),
            Instruction::Call {
                callee,
                args,
                binding,
                ..
            } => {
                replace(callee);
                args.iter_mut().for_each(replace);
                binding.values_mut().for_each(replace);
            }
            Instruction::Field { object, key, .. } => {
                replace(object);
                replace(key);
            }
            Instruction::Update { object, key, value } => {
                replace(object);
                replace(key);
                replace(value);
            }
            Instruction::Make { len, cap, .. } => {
                len.iter_mut().for_each(replace);
                cap.iter_mut().for_each(replace);
            }
            Instruction::Next { iter } => replace(iter),
            Instruction::SideEffect { call, value, .. } => {
                replace(call);
                replace(value);
            }
            Instruction::Slice {
                object,
                low,
                high,
                max,
            } => {
                replace(object);
                low.iter_mut()
                    .chain(high.iter_mut())
                    .chain(max.iter_mut())
                    .for_each(replace);
            }
            Instruction::Send { chan, value } => {
                replace(chan);
                replace(value);
            }
            Instruction::Assert { cond, msg } => {
                replace(cond);
                msg.iter_mut().for_each(replace);
            }
            Instruction::Panic(value) => replace(value),
            Instruction::If { cond, .. } => replace(cond),
            Instruction::Loop { cond, key, init, .. } => {
                replace(cond);
                key.iter_mut().for_each(replace);
                init.iter_mut().for_each(replace);
            }
            Instruction::Switch { cond, labels, .. } => {
                cond.iter_mut().for_each(replace);
                labels.iter_mut().for_each(|(label, _)| replace(label));
            }
            Instruction::Return(values) => values.iter_mut().for_each(replace),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_)
                | Instruction::If { .. }
                | Instruction::Loop { .. }
                | Instruction::Switch { .. }
                | Instruction::ErrorHandler { .. }
                | Instruction::Return(_)
        )
    }

    /// The distinct successor blocks of a terminator, in edge order.
    pub fn successors(&self) -> Vec<Block> {
        match self {
            Instruction::Jump(to) => vec![*to],
            Instruction::If {
                true_block,
                false_block,
                ..
            } => vec![*true_block, *false_block],
            Instruction::Loop { body, exit, .. } => vec![*body, *exit],
            Instruction::Switch {
                default, labels, ..
            } => {
                let mut succs: Vec<Block> = Vec::new();
                for block in labels.iter().map(|(_, block)| block).chain([default]) {
                    if !succs.contains(block) {
                        succs.push(*block);
                    }
                }
                succs
            }
            Instruction::ErrorHandler {
                try_block,
                catch_block,
            } => vec![*try_block, *catch_block],
            _ => vec![],
        }
    }
}

/// Provide a context for appending new [`Instruction`]s to a [`Block`].
pub struct InstructionInserter<'a> {
    context: &'a mut Context,
    block: Block,
    span: Option<Span>,
}

macro_rules! make_instruction {
    ($self: ident, $ctor: expr) => {{
        let instruction_val = Value::new_instruction($self.context, $ctor, $self.span);
        $self.context.blocks[$self.block.0]
            .instructions
            .push(instruction_val);
        instruction_val
    }};
}

impl<'a> InstructionInserter<'a> {
    /// Return a new [`InstructionInserter`] context for `block`.
    pub fn new(context: &'a mut Context, block: Block) -> InstructionInserter<'a> {
        InstructionInserter {
            context,
            block,
            span: None,
        }
    }

    /// Attach `span` to the instruction about to be appended.
    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    fn terminate(self, instruction: Instruction) -> Value {
        let from = self.block;
        for succ in instruction.successors() {
            from.add_successor(self.context, succ);
        }
        make_instruction!(self, instruction)
    }

    pub fn undefine(self, name: String, kind: UndefineKind) -> Value {
        make_instruction!(self, Instruction::Undefine { name, kind })
    }

    pub fn binary_op(self, op: BinaryOpKind, arg1: Value, arg2: Value) -> Value {
        make_instruction!(self, Instruction::BinaryOp { op, arg1, arg2 })
    }

    pub fn unary_op(self, op: UnaryOpKind, arg: Value) -> Value {
        make_instruction!(self, Instruction::UnaryOp { op, arg })
    }

    /// Append a call.  Flags and bindings are set on the returned value afterwards, see
    /// [`Value::get_instruction_mut`].
    pub fn call(self, callee: Value, args: Vec<Value>) -> Value {
        make_instruction!(
            self,
            Instruction::Call {
                callee,
                args,
                ellipsis: false,
                drop_error: false,
                is_async: false,
                unpack: None,
                binding: FxIndexMap::default(),
            }
        )
    }

    pub fn field(self, object: Value, key: Value, is_method: bool) -> Value {
        make_instruction!(
            self,
            Instruction::Field {
                object,
                key,
                is_method
            }
        )
    }

    pub fn update(self, object: Value, key: Value, value: Value) -> Value {
        make_instruction!(self, Instruction::Update { object, key, value })
    }

    pub fn make(self, ty: Type, len: Option<Value>, cap: Option<Value>, refine: bool) -> Value {
        make_instruction!(
            self,
            Instruction::Make {
                ty,
                len,
                cap,
                refine
            }
        )
    }

    pub fn next(self, iter: Value) -> Value {
        make_instruction!(self, Instruction::Next { iter })
    }

    pub fn side_effect(self, name: String, call: Value, value: Value) -> Value {
        make_instruction!(self, Instruction::SideEffect { name, call, value })
    }

    pub fn error_catch(self, try_block: Block) -> Value {
        make_instruction!(self, Instruction::ErrorCatch { try_block })
    }

    pub fn slice(
        self,
        object: Value,
        low: Option<Value>,
        high: Option<Value>,
        max: Option<Value>,
    ) -> Value {
        make_instruction!(
            self,
            Instruction::Slice {
                object,
                low,
                high,
                max
            }
        )
    }

    pub fn send(self, chan: Value, value: Value) -> Value {
        make_instruction!(self, Instruction::Send { chan, value })
    }

    pub fn assert(self, cond: Value, msg: Option<Value>) -> Value {
        make_instruction!(self, Instruction::Assert { cond, msg })
    }

    pub fn panic(self, value: Value) -> Value {
        make_instruction!(self, Instruction::Panic(value))
    }

    pub fn recover(self) -> Value {
        make_instruction!(self, Instruction::Recover)
    }

    pub fn jump(self, to_block: Block) -> Value {
        self.terminate(Instruction::Jump(to_block))
    }

    pub fn branch_if(self, cond: Value, true_block: Block, false_block: Block) -> Value {
        self.terminate(Instruction::If {
            cond,
            true_block,
            false_block,
        })
    }

    pub fn loop_branch(self, cond: Value, body: Block, exit: Block, latch: Block) -> Value {
        self.terminate(Instruction::Loop {
            cond,
            body,
            exit,
            latch,
            key: None,
            init: None,
        })
    }

    pub fn switch(self, cond: Option<Value>, default: Block, labels: Vec<(Value, Block)>) -> Value {
        self.terminate(Instruction::Switch {
            cond,
            default,
            labels,
        })
    }

    pub fn error_handler(self, try_block: Block, catch_block: Block) -> Value {
        self.terminate(Instruction::ErrorHandler {
            try_block,
            catch_block,
        })
    }

    pub fn ret(self, values: Vec<Value>) -> Value {
        self.terminate(Instruction::Return(values))
    }
}

//! Represents a 'basic block' of [`Instruction`]s in a control flow graph.
//!
//! [`Block`]s contain zero or more _non-terminating_ instructions and at most one _terminating_
//! instruction or _terminator_.  Terminators are branches or a return and are the last
//! instruction in the block.
//!
//! Phi instructions are kept in their own list ahead of the instructions.  In
//! [SSA](https://en.wikipedia.org/wiki/Static_single_assignment_form) form 'phi' instructions
//! merge values from preceding blocks, one edge per entry of the block's predecessor list.
//!
//! Every [`Function`] has at least one block, the first of which is labeled `entry`.

use ember_types::Span;
use rustc_hash::FxHashMap;

use crate::{
    context::Context,
    function::Function,
    instruction::{Instruction, InstructionInserter, UndefineKind},
    value::Value,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Block(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct BlockContent {
    /// Block label, useful for printing.
    pub label: Label,
    /// The function containing this block.
    pub function: Function,
    /// List of instructions in the block.
    pub(crate) instructions: Vec<Value>,
    /// Phi instructions, kept apart from the body.
    pub(crate) phis: Vec<Value>,
    /// CFG predecessors, in the order their edges were added.
    pub preds: Vec<Block>,
    /// CFG successors, in the order their edges were added.
    pub succs: Vec<Block>,
    /// When control reaches this block, once computed by the condition analysis.
    pub condition: Option<Value>,
    /// Bypassed while merging predecessor conditions.
    pub skip: bool,
}

/// Each block may be explicitly named.  A [`Label`] is a simple `String` synonym.
pub type Label = String;

impl Block {
    /// Return a new block handle.
    ///
    /// Creates a new Block belonging to `function` in the context and returns its handle.  `label`
    /// is optional and is used only when printing the IR.
    pub fn new(context: &mut Context, function: Function, label: Option<String>) -> Block {
        let label = function.get_unique_label(context, label);
        let content = BlockContent {
            label,
            function,
            instructions: vec![],
            phis: vec![],
            preds: vec![],
            succs: vec![],
            condition: None,
            skip: false,
        };
        Block(context.blocks.insert(content))
    }

    /// Get the parent function for this block.
    pub fn get_function(&self, context: &Context) -> Function {
        context.blocks[self.0].function
    }

    /// Create a new [`InstructionInserter`] to more easily append instructions to this block.
    pub fn append<'a>(&self, context: &'a mut Context) -> InstructionInserter<'a> {
        InstructionInserter::new(context, *self)
    }

    /// Get the label of this block.  If it wasn't given one upon creation it will be a generated
    /// label.
    pub fn get_label(&self, context: &Context) -> String {
        context.blocks[self.0].label.clone()
    }

    /// Get the number of instructions in this block, not counting phis.
    pub fn num_instructions(&self, context: &Context) -> usize {
        context.blocks[self.0].instructions.len()
    }

    pub fn num_predecessors(&self, context: &Context) -> usize {
        context.blocks[self.0].preds.len()
    }

    pub fn pred_iter<'a>(&'a self, context: &'a Context) -> impl Iterator<Item = &'a Block> {
        context.blocks[self.0].preds.iter()
    }

    pub fn succ_iter<'a>(
        &'a self,
        context: &'a Context,
    ) -> impl DoubleEndedIterator<Item = &'a Block> {
        context.blocks[self.0].succs.iter()
    }

    /// Add the CFG edge `self -> to`, on both ends.
    pub fn add_successor(&self, context: &mut Context, to: Block) {
        context.blocks[self.0].succs.push(to);
        context.blocks[to.0].preds.push(*self);
    }

    /// Append a phi to this block.
    pub fn add_phi(&self, context: &mut Context, phi: Value) {
        context.blocks[self.0].phis.push(phi);
    }

    pub fn remove_phi(&self, context: &mut Context, phi: Value) {
        context.blocks[self.0].phis.retain(|val| *val != phi);
    }

    pub fn phi_iter(&self, context: &Context) -> std::vec::IntoIter<Value> {
        context.blocks[self.0].phis.clone().into_iter()
    }

    /// Insert an `Undefine` placeholder at the front of this block, after any placeholders
    /// already there.
    pub fn insert_undefine(
        &self,
        context: &mut Context,
        name: String,
        kind: UndefineKind,
        span: Option<Span>,
    ) -> Value {
        let undef = Value::new_instruction(context, Instruction::Undefine { name, kind }, span);
        let pos = context.blocks[self.0]
            .instructions
            .iter()
            .position(|ins| {
                !matches!(
                    context.values[ins.0].value,
                    crate::value::ValueDatum::Instruction(Instruction::Undefine { .. })
                )
            })
            .unwrap_or(context.blocks[self.0].instructions.len());
        context.blocks[self.0].instructions.insert(pos, undef);
        undef
    }

    /// Get a reference to the block terminator.
    ///
    /// Returns `None` if block is empty or its last instruction is not a terminator.
    pub fn get_terminator<'a>(&self, context: &'a Context) -> Option<&'a Instruction> {
        self.get_terminator_value(context)
            .and_then(|term| term.get_instruction(context))
    }

    /// The value of the block terminator, if terminated.
    pub fn get_terminator_value(&self, context: &Context) -> Option<Value> {
        context.blocks[self.0]
            .instructions
            .last()
            .copied()
            .filter(|ins| ins.is_terminator(context))
    }

    /// Return whether this block is already terminated.  Checks if the final instruction, if it
    /// exists, is a terminator.
    pub fn is_terminated(&self, context: &Context) -> bool {
        self.get_terminator_value(context).is_some()
    }

    pub fn get_condition(&self, context: &Context) -> Option<Value> {
        context.blocks[self.0].condition
    }

    pub fn set_condition(&self, context: &mut Context, condition: Value) {
        context.blocks[self.0].condition = Some(condition);
    }

    pub fn is_skip(&self, context: &Context) -> bool {
        context.blocks[self.0].skip
    }

    pub fn set_skip(&self, context: &mut Context, skip: bool) {
        context.blocks[self.0].skip = skip;
    }

    /// Replace any of the phi or instruction operands in this block found in `replace_map`.
    pub fn replace_values(&self, context: &mut Context, replace_map: &FxHashMap<Value, Value>) {
        let block = &context.blocks[self.0];
        let values = block
            .phis
            .iter()
            .chain(block.instructions.iter())
            .copied()
            .collect::<Vec<_>>();
        for value in values {
            value.replace_instruction_values(context, replace_map);
        }
    }

    /// Replace every use of `old_val` in this block with `new_val`.
    pub fn replace_value(&self, context: &mut Context, old_val: Value, new_val: Value) {
        let mut replace_map = FxHashMap::default();
        replace_map.insert(old_val, new_val);
        self.replace_values(context, &replace_map);
    }

    /// Remove an instruction from this block.  Phis are removed with [`Block::remove_phi`].
    pub fn remove_instruction(&self, context: &mut Context, instr_val: Value) {
        let ins = &mut context.blocks[self.0].instructions;
        if let Some(pos) = ins.iter().position(|iv| *iv == instr_val) {
            ins.remove(pos);
        }
    }

    /// Return an iterator over this block's instructions, phis excluded.
    pub fn instruction_iter(&self, context: &Context) -> InstructionIterator {
        InstructionIterator::new(context, self)
    }
}

/// An iterator over each block in a [`Function`].
pub struct BlockIterator {
    blocks: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl BlockIterator {
    /// Return a new iterator for each block in `function`.
    pub fn new(context: &Context, function: &Function) -> Self {
        // Copy all the current block indices, so they may be modified in the context during
        // iteration.
        BlockIterator {
            blocks: context.functions[function.0]
                .blocks
                .iter()
                .map(|block| block.0)
                .collect(),
            next: 0,
        }
    }
}

impl Iterator for BlockIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next < self.blocks.len() {
            let idx = self.next;
            self.next += 1;
            Some(Block(self.blocks[idx]))
        } else {
            None
        }
    }
}

/// An iterator over each instruction in a [`Block`].
pub struct InstructionIterator {
    instructions: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl InstructionIterator {
    pub fn new(context: &Context, block: &Block) -> Self {
        // Copy all the current instruction indices, so they may be modified in the context during
        // iteration.
        InstructionIterator {
            instructions: context.blocks[block.0]
                .instructions
                .iter()
                .map(|value| value.0)
                .collect(),
            next: 0,
        }
    }
}

impl Iterator for InstructionIterator {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.next < self.instructions.len() {
            let idx = self.next;
            self.next += 1;
            Some(Value(self.instructions[idx]))
        } else {
            None
        }
    }
}

//! On-demand SSA construction.
//!
//! Definitions are recorded per variable and block as the builder writes them.  A read looks
//! backwards through the predecessors of the current block; a block whose predecessors are not
//! all known yet is *unsealed* and gets an operandless phi which is completed once the block is
//! sealed.  Phis which turn out to merge a single value are removed again.

use ember_ir::{Block, Context, Instruction, UndefineKind, Value};
use ember_types::FxIndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use super::lexical_map::VarId;

pub(super) struct Variable {
    pub(super) name: String,
    /// The variable is owned by an enclosing function; writes to it are side effects.
    pub(super) captured: bool,
}

#[derive(Default)]
pub(super) struct SsaState {
    variables: Vec<Variable>,
    current_defs: FxHashMap<(VarId, Block), Value>,
    incomplete_phis: FxIndexMap<Block, Vec<(VarId, Value)>>,
    sealed: FxHashSet<Block>,
    // Live phis and the block holding them.
    phis: FxIndexMap<Value, Block>,
    // Removed trivial phis and what replaced them.
    replaced: FxHashMap<Value, Value>,
}

impl SsaState {
    pub(super) fn new_variable(&mut self, name: String, captured: bool) -> VarId {
        self.variables.push(Variable { name, captured });
        VarId(self.variables.len() - 1)
    }

    pub(super) fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    pub(super) fn write(&mut self, var: VarId, block: Block, value: Value) {
        self.current_defs.insert((var, block), value);
    }

    pub(super) fn read(&mut self, context: &mut Context, var: VarId, block: Block) -> Value {
        match self.current_defs.get(&(var, block)) {
            Some(value) => self.resolve(*value),
            None => self.read_recursive(context, var, block),
        }
    }

    /// Declare that every predecessor of `block` is known, completing its pending phis.
    pub(super) fn seal(&mut self, context: &mut Context, block: Block) {
        if self.sealed.contains(&block) {
            return;
        }
        if let Some(pending) = self.incomplete_phis.shift_remove(&block) {
            for (var, phi) in pending {
                self.add_phi_operands(context, var, phi, block);
            }
        }
        self.sealed.insert(block);
    }

    fn resolve(&self, mut value: Value) -> Value {
        while let Some(replacement) = self.replaced.get(&value) {
            value = *replacement;
        }
        value
    }

    fn read_recursive(&mut self, context: &mut Context, var: VarId, block: Block) -> Value {
        let value = if !self.sealed.contains(&block) {
            let phi = self.new_phi(context, var, block);
            self.incomplete_phis
                .entry(block)
                .or_default()
                .push((var, phi));
            phi
        } else {
            let preds = block.pred_iter(context).copied().collect::<Vec<_>>();
            match preds.as_slice() {
                [] => block.insert_undefine(
                    context,
                    self.variables[var.0].name.clone(),
                    UndefineKind::Declared,
                    None,
                ),
                [pred] => self.read(context, var, *pred),
                _ => {
                    // Break cycles through this block before visiting the predecessors.
                    let phi = self.new_phi(context, var, block);
                    self.write(var, block, phi);
                    self.add_phi_operands(context, var, phi, block)
                }
            }
        };
        self.write(var, block, value);
        value
    }

    fn new_phi(&mut self, context: &mut Context, var: VarId, block: Block) -> Value {
        let name = self.variables[var.0].name.clone();
        let phi = Value::new_instruction(
            context,
            Instruction::Phi {
                name: name.clone(),
                edges: Vec::new(),
            },
            None,
        );
        phi.set_name(context, name);
        block.add_phi(context, phi);
        self.phis.insert(phi, block);
        phi
    }

    fn add_phi_operands(
        &mut self,
        context: &mut Context,
        var: VarId,
        phi: Value,
        block: Block,
    ) -> Value {
        let preds = block.pred_iter(context).copied().collect::<Vec<_>>();
        for pred in preds {
            let operand = self.read(context, var, pred);
            if let Some(Instruction::Phi { edges, .. }) = phi.get_instruction_mut(context) {
                edges.push(operand);
            }
        }
        self.try_remove_trivial_phi(context, phi, block)
    }

    fn try_remove_trivial_phi(&mut self, context: &mut Context, phi: Value, block: Block) -> Value {
        let edges = match phi.get_instruction(context) {
            Some(Instruction::Phi { edges, .. }) => edges.clone(),
            _ => return phi,
        };
        let mut same = None;
        for operand in edges.into_iter().map(|edge| self.resolve(edge)) {
            if Some(operand) == same || operand == phi {
                continue;
            }
            if same.is_some() {
                // Merges at least two values.
                return phi;
            }
            same = Some(operand);
        }
        let same = match same {
            Some(same) => same,
            // Unreachable, or only reachable from itself.
            None => block.insert_undefine(
                context,
                phi_name(context, phi),
                UndefineKind::Declared,
                None,
            ),
        };

        let users = self
            .phis
            .iter()
            .filter(|(user, _)| **user != phi)
            .filter(|(user, _)| match user.get_instruction(context) {
                Some(Instruction::Phi { edges, .. }) => edges.contains(&phi),
                _ => false,
            })
            .map(|(user, block)| (*user, *block))
            .collect::<Vec<_>>();

        block.remove_phi(context, phi);
        self.phis.shift_remove(&phi);
        let package = block.get_function(context).get_package(context);
        package.replace_value(context, phi, same);
        self.replaced.insert(phi, same);

        for (user, user_block) in users {
            // A phi still collecting its operands is checked once it has them all.
            let complete = match user.get_instruction(context) {
                Some(Instruction::Phi { edges, .. }) => {
                    edges.len() == user_block.num_predecessors(context)
                }
                _ => false,
            };
            if complete && self.phis.contains_key(&user) {
                self.try_remove_trivial_phi(context, user, user_block);
            }
        }
        same
    }
}

fn phi_name(context: &Context, phi: Value) -> String {
    match phi.get_instruction(context) {
        Some(Instruction::Phi { name, .. }) => name.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::{Constant, Function, Package};

    fn setup() -> (Context, Function) {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        (context, main)
    }

    fn number(context: &mut Context, value: i64) -> Value {
        let constant = Constant::new_number(context, value);
        Value::new_constant(context, constant, None)
    }

    #[test]
    fn diamond_merges_with_a_phi() {
        let (mut context, main) = setup();
        let mut ssa = SsaState::default();
        let var = ssa.new_variable("a".to_owned(), false);

        let entry = main.get_entry_block(&context);
        ssa.seal(&mut context, entry);
        let left = main.create_block(&mut context, None);
        let right = main.create_block(&mut context, None);
        let done = main.create_block(&mut context, None);
        let cond = number(&mut context, 1);
        entry.append(&mut context).branch_if(cond, left, right);
        ssa.seal(&mut context, left);
        ssa.seal(&mut context, right);

        let one = number(&mut context, 1);
        let two = number(&mut context, 2);
        ssa.write(var, left, one);
        ssa.write(var, right, two);
        left.append(&mut context).jump(done);
        right.append(&mut context).jump(done);
        ssa.seal(&mut context, done);

        let merged = ssa.read(&mut context, var, done);
        assert!(merged.is_phi(&context));
        match merged.get_instruction(&context) {
            Some(Instruction::Phi { edges, .. }) => assert_eq!(edges, &vec![one, two]),
            other => panic!("expected a phi, found {other:?}"),
        }
    }

    #[test]
    fn loop_invariant_read_is_not_a_phi() {
        let (mut context, main) = setup();
        let mut ssa = SsaState::default();
        let var = ssa.new_variable("a".to_owned(), false);

        let entry = main.get_entry_block(&context);
        ssa.seal(&mut context, entry);
        let one = number(&mut context, 1);
        ssa.write(var, entry, one);

        let header = main.create_block(&mut context, None);
        let body = main.create_block(&mut context, None);
        entry.append(&mut context).jump(header);
        header.append(&mut context).jump(body);
        ssa.seal(&mut context, body);

        // The header is unsealed, so this read goes through an incomplete phi.
        let in_body = ssa.read(&mut context, var, body);
        assert!(in_body.is_phi(&context));

        body.append(&mut context).jump(header);
        ssa.seal(&mut context, header);
        assert_eq!(ssa.read(&mut context, var, body), one);
        assert_eq!(header.phi_iter(&context).count(), 0);
    }

    #[test]
    fn read_without_definition_is_declared_undefine() {
        let (mut context, main) = setup();
        let mut ssa = SsaState::default();
        let var = ssa.new_variable("a".to_owned(), false);
        let entry = main.get_entry_block(&context);
        ssa.seal(&mut context, entry);

        let value = ssa.read(&mut context, var, entry);
        assert!(matches!(
            value.get_instruction(&context),
            Some(Instruction::Undefine {
                kind: UndefineKind::Declared,
                ..
            })
        ));
        // Reading again reuses the placeholder.
        assert_eq!(ssa.read(&mut context, var, entry), value);
    }
}

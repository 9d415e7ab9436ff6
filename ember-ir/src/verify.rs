//! Code to validate the IR in a [`Context`].
//!
//! After building, and after any pass which rewrites the graph, the IR should be verified to be
//! in a consistent valid state, using the functions in this module.

use rustc_hash::FxHashSet;

use crate::{
    block::Block, context::Context, error::IrError, function::Function, instruction::Instruction,
    package::Package, value::Value,
};

impl Context {
    /// Verify the contents of this [`Context`] is valid.
    pub fn verify(&self) -> Result<(), IrError> {
        let mut defined = FxHashSet::default();
        for package in self.package_iter() {
            self.verify_package(package, &mut defined)?;
        }
        Ok(())
    }

    fn verify_package(
        &self,
        package: Package,
        defined: &mut FxHashSet<Value>,
    ) -> Result<(), IrError> {
        for function in package.function_iter(self) {
            self.verify_function(function, defined)?;
        }
        Ok(())
    }

    fn verify_function(
        &self,
        function: Function,
        defined: &mut FxHashSet<Value>,
    ) -> Result<(), IrError> {
        let blocks = &self.functions[function.0].blocks;
        for block in blocks {
            self.verify_block(blocks, *block, defined)?;
        }
        Ok(())
    }

    fn verify_block(
        &self,
        fn_blocks: &[Block],
        block: Block,
        defined: &mut FxHashSet<Value>,
    ) -> Result<(), IrError> {
        let content = &self.blocks[block.0];
        let label = || content.label.clone();

        for value in content.phis.iter().chain(content.instructions.iter()) {
            if !defined.insert(*value) {
                return Err(IrError::VerifyMultipleDefinition(label()));
            }
        }

        for phi in &content.phis {
            if let Some(Instruction::Phi { edges, .. }) = phi.get_instruction(self) {
                if edges.len() != content.preds.len() {
                    return Err(IrError::VerifyPhiArity(
                        label(),
                        edges.len(),
                        content.preds.len(),
                    ));
                }
            }
        }

        let (last_is_term, num_terms) =
            content
                .instructions
                .iter()
                .fold((false, 0), |(_, n), ins| {
                    if ins.is_terminator(self) {
                        (true, n + 1)
                    } else {
                        (false, n)
                    }
                });
        if !last_is_term {
            return Err(IrError::MissingTerminator(label()));
        }
        if num_terms != 1 {
            return Err(IrError::MisplacedTerminator(label()));
        }

        let succs = block
            .get_terminator(self)
            .map(Instruction::successors)
            .unwrap_or_default();
        if succs != content.succs {
            let to = succs
                .first()
                .or(content.succs.first())
                .map(|succ| self.blocks[succ.0].label.clone())
                .unwrap_or_default();
            return Err(IrError::VerifyEdgeMismatch(label(), to));
        }
        for succ in &succs {
            if !fn_blocks.contains(succ) {
                return Err(IrError::VerifyBranchToMissingBlock(
                    self.blocks[succ.0].label.clone(),
                ));
            }
            if !self.blocks[succ.0].preds.contains(&block) {
                return Err(IrError::VerifyEdgeMismatch(
                    label(),
                    self.blocks[succ.0].label.clone(),
                ));
            }
        }
        for pred in &content.preds {
            if !self.blocks[pred.0].succs.contains(&block) {
                return Err(IrError::VerifyEdgeMismatch(
                    self.blocks[pred.0].label.clone(),
                    label(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::UndefineKind;

    #[test]
    fn phi_arity_must_match_predecessors() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        let entry = main.get_entry_block(&context);
        let done = main.create_block(&mut context, Some("done".to_owned()));
        let undef = entry
            .append(&mut context)
            .undefine("a".to_owned(), UndefineKind::Declared);
        entry.append(&mut context).jump(done);
        done.append(&mut context).ret(vec![]);
        assert_eq!(context.verify(), Ok(()));

        let phi = Value::new_instruction(
            &mut context,
            Instruction::Phi {
                name: "a".to_owned(),
                edges: vec![undef, undef],
            },
            None,
        );
        done.add_phi(&mut context, phi);
        assert_eq!(
            context.verify(),
            Err(IrError::VerifyPhiArity("done".to_owned(), 2, 1))
        );
    }

    #[test]
    fn blocks_must_be_terminated() {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        Function::new(&mut context, package, "main".to_owned(), None, None);
        assert_eq!(
            context.verify(),
            Err(IrError::MissingTerminator("entry".to_owned()))
        );
    }
}

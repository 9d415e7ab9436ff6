/// These errors are for internal IR failures, not designed to be useful to a script author, but
/// more for users of the `ember-ir` crate, i.e., analysis developers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    MisplacedTerminator(String),
    MissingTerminator(String),
    ParseFailure(String, String),
    UnregisteredPass(String),

    VerifyPhiArity(String, usize, usize),
    VerifyEdgeMismatch(String, String),
    VerifyMultipleDefinition(String),
    VerifyBranchToMissingBlock(String),
}

impl std::error::Error for IrError {}

use std::fmt;

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            IrError::MisplacedTerminator(blk_str) => {
                write!(f, "Block {blk_str} has a misplaced terminator.")
            }
            IrError::MissingTerminator(blk_str) => {
                write!(f, "Block {blk_str} is missing its terminator.")
            }
            IrError::ParseFailure(expecting, found) => {
                write!(
                    f,
                    "Parse failure: expecting '{expecting}', found '{found}'."
                )
            }
            IrError::UnregisteredPass(name) => {
                write!(f, "Pass '{name}' has not been registered.")
            }
            IrError::VerifyPhiArity(blk_str, edges, preds) => write!(
                f,
                "Verification failed: phi in block {blk_str} has {edges} edges but the block has \
                {preds} predecessors."
            ),
            IrError::VerifyEdgeMismatch(from, to) => write!(
                f,
                "Verification failed: edge {from} -> {to} is not recorded on both blocks."
            ),
            IrError::VerifyMultipleDefinition(blk_str) => write!(
                f,
                "Verification failed: a value in block {blk_str} is produced more than once."
            ),
            IrError::VerifyBranchToMissingBlock(blk_str) => write!(
                f,
                "Verification failed: branch to block {blk_str} which is not in the function."
            ),
        }
    }
}

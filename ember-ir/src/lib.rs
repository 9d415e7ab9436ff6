//! Ember's SSA intermediate representation.
//!
//! Everything lives in a [`Context`]: packages, functions, blocks, values and interned types are
//! stored in arenas and referred to by small `Copy` handles.  The builder in `ember-core` fills a
//! context from a syntax tree, and the passes in [`analysis`] then recover block conditions, infer
//! types and report semantic defects.

pub mod analysis;
pub use analysis::*;
pub mod block;
pub use block::*;
pub mod constant;
pub use constant::*;
pub mod context;
pub use context::*;
pub mod error;
pub use error::*;
pub mod function;
pub use function::*;
pub mod instruction;
pub use instruction::*;
pub mod irtype;
pub use irtype::*;
pub mod optimize;
pub use optimize::*;
pub mod package;
pub use package::*;
pub mod parser;
pub use parser::*;
pub mod pass_manager;
pub use pass_manager::*;
pub mod printer;
pub use printer::*;
pub mod value;
pub use value::*;
pub mod verify;
pub use verify::*;

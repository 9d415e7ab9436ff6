//! The analysis pipeline run over every built package, in order: block conditions, type
//! inference and type check.

pub mod block_condition;
pub use block_condition::*;
pub mod type_check;
pub use type_check::*;
pub mod type_inference;
pub use type_inference::*;
pub mod users;
pub use users::*;

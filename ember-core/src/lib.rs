//! Builds syntax trees into Ember IR and runs the analyses over it.
//!
//! [`Program`] is the usual entry point.  [`compile_module`] builds a single tree into an
//! existing [`ember_ir::Context`] without running any pass.

pub mod build_config;
pub mod externs;
pub mod ir_generation;
pub mod program;
pub mod source;

pub use build_config::BuildConfig;
pub use externs::{ExternError, ExternTable, ExternType, ResolvedExterns};
pub use ir_generation::{compile_module, IncludeResolver, NoIncludes, MAIN_FUNCTION_NAME};
pub use program::Program;
pub use source::{content_hash, FsSourceLoader, SourceFile, SourceLoader};

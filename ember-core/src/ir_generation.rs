//! Lowering of a syntax tree into SSA form.
//!
//! [`compile_module`] builds one [`Package`] whose first function is the module's top level.
//! Variables are tracked per function frame and turned into SSA values on demand, inserting phis
//! at merge points as blocks are sealed.

mod assign;
mod control_flow;
mod expression;
mod function;
mod lexical_map;
mod literal;
mod scope;
mod ssa;

use ember_ast::Module;
use ember_error::handler::Handler;
use ember_ir::{Context, Function, Package};
use ember_types::{Span, Spanned};

use crate::externs::ResolvedExterns;

use function::IrBuilder;

/// Name of the function holding a module's top level statements.
pub const MAIN_FUNCTION_NAME: &str = "main";

/// Supplies the syntax trees of `include`d files.
pub trait IncludeResolver {
    /// Return the module at `path`, or `None` when it should not be built again or could not be
    /// loaded.  Load failures are reported into `handler`.
    fn resolve(&mut self, handler: &Handler, path: &str, span: &Span) -> Option<Module>;
}

/// An [`IncludeResolver`] for sources which may not include anything.
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&mut self, handler: &Handler, path: &str, span: &Span) -> Option<Module> {
        handler.emit_err(ember_error::error::CompileError::IncludeFailed {
            path: path.to_owned(),
            reason: "includes are not available here".to_owned(),
            span: span.clone(),
        });
        None
    }
}

/// Build `module` into a new package named `name`.
///
/// Building never stops at the first problem; every diagnostic found on the way is emitted into
/// `handler` and the returned package is always well formed.
pub fn compile_module(
    context: &mut Context,
    handler: &Handler,
    externs: &ResolvedExterns,
    includes: &mut dyn IncludeResolver,
    name: &str,
    module: &Module,
) -> Package {
    let package = Package::new(context, name);
    let main = Function::new(
        context,
        package,
        MAIN_FUNCTION_NAME.to_owned(),
        None,
        Some(module.span()),
    );

    let mut builder = IrBuilder::new(handler, package, externs, includes);
    builder.push_frame(context, main);
    builder.compile_statements(context, &module.statements);
    builder.finish_function(context);
    package
}

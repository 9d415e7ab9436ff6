//! Name resolution for reads and writes.
//!
//! A read is resolved, in order, against the lexical scopes of the current function, the scopes
//! of the enclosing functions (capturing the binding as a free value), and the extern symbols.
//! What is left is either a late-bound free value, inside a closure, or an unresolved name.

use ember_error::warning::{CompileWarning, Warning};
use ember_ir::{Context, UndefineKind, Value};
use ember_types::{Ident, Span, Spanned};

use super::function::IrBuilder;

impl<'eng> IrBuilder<'eng> {
    pub(super) fn read_variable(
        &mut self,
        context: &mut Context,
        name: &str,
        span: &Span,
    ) -> Value {
        if let Some(value) = self.resolve_binding(context, name, span) {
            return value;
        }

        // Only the top level is left: nothing will ever bind this name.
        let frame = self.frame();
        let var = frame.declare_function_scope(name, false);
        let entry = frame.function.get_entry_block(context);
        let undef = entry.insert_undefine(
            context,
            name.to_owned(),
            UndefineKind::Unresolved,
            Some(span.clone()),
        );
        frame.ssa.write(var, entry, undef);
        frame.read(context, var)
    }

    /// Resolve `name` the way a read does, short of giving up on it.  Returns `None` only at the
    /// top level.
    pub(super) fn resolve_binding(
        &mut self,
        context: &mut Context,
        name: &str,
        span: &Span,
    ) -> Option<Value> {
        let depth = self.frames.len() - 1;
        if let Some(value) = self.resolve_in_frame(context, depth, name) {
            return Some(value);
        }
        if let Some(value) = self.extern_value(context, name) {
            return Some(value);
        }
        if depth > 0 {
            // Bound later, by whoever calls this closure.
            let function = self.function();
            let free_value =
                function.add_free_value(context, name.to_owned(), None, Some(span.clone()));
            return Some(self.bind_free_value(context, depth, name, free_value));
        }
        None
    }

    /// The current value of `name` as seen from frame `depth`, capturing it from enclosing
    /// frames as needed.
    fn resolve_in_frame(
        &mut self,
        context: &mut Context,
        depth: usize,
        name: &str,
    ) -> Option<Value> {
        let frame = &mut self.frames[depth];
        if let Some(var) = frame.lexical_map.get(name) {
            return Some(frame.read(context, var));
        }
        if depth == 0 {
            return None;
        }
        let outer = self.resolve_in_frame(context, depth - 1, name)?;
        let function = self.frames[depth].function;
        let free_value = function.add_free_value(context, name.to_owned(), Some(outer), None);
        Some(self.bind_free_value(context, depth, name, free_value))
    }

    /// Make `free_value` the definition of `name` on entry to the function of frame `depth`.
    fn bind_free_value(
        &mut self,
        context: &mut Context,
        depth: usize,
        name: &str,
        free_value: Value,
    ) -> Value {
        let frame = &mut self.frames[depth];
        let var = frame.declare_function_scope(name, true);
        let entry = frame.function.get_entry_block(context);
        frame.ssa.write(var, entry, free_value);
        frame.read(context, var)
    }

    fn extern_value(&mut self, context: &mut Context, name: &str) -> Option<Value> {
        if let Some(value) = self.extern_values.get(name) {
            return Some(*value);
        }
        let ty = self.externs.get(name)?;
        let value = Value::new_extern(context, name.to_owned(), ty, None);
        self.extern_values.insert(name.to_owned(), value);
        Some(value)
    }

    /// Bind `value` to `ident`.
    ///
    /// With `declare` the binding is always new in the innermost scope.  Otherwise the nearest
    /// visible binding is written, which may belong to an enclosing function; failing that a new
    /// binding is made in the function scope.
    pub(super) fn assign_variable(
        &mut self,
        context: &mut Context,
        ident: &Ident,
        value: Value,
        declare: bool,
    ) {
        let name = ident.as_str();
        value.set_name(context, name.to_owned());
        if ident.is_discard() {
            return;
        }

        if declare {
            let frame = self.frame();
            let var = frame.declare(name);
            frame.write(var, value);
            return;
        }
        if self.write_visible(context, name, value) {
            return;
        }

        if self.externs.contains(name) {
            self.handler.emit_warn(CompileWarning {
                span: ident.span(),
                warning_content: Warning::AssignToExtern {
                    name: name.to_owned(),
                },
            });
        }
        let frame = self.frame();
        let var = frame.declare_function_scope(name, false);
        frame.write(var, value);
    }

    /// Write `value` to the binding `name` if one is visible from the current function, and
    /// record the write as a side effect when the binding is captured.
    pub(super) fn write_visible(
        &mut self,
        context: &mut Context,
        name: &str,
        value: Value,
    ) -> bool {
        let depth = self.frames.len() - 1;
        let var = match self.frames[depth].lexical_map.get(name) {
            Some(var) => var,
            None => {
                // Capturing the binding makes it visible here.
                if depth == 0 || self.resolve_in_frame(context, depth, name).is_none() {
                    return false;
                }
                match self.frames[depth].lexical_map.get(name) {
                    Some(var) => var,
                    None => return false,
                }
            }
        };

        let frame = &mut self.frames[depth];
        frame.write(var, value);
        if frame.ssa.variable(var).captured {
            frame
                .function
                .set_side_effect(context, name.to_owned(), value);
        }
        true
    }
}

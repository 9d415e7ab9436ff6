use crate::{
    diagnostic::{Diagnostic, ToDiagnostic},
    error::CompileError,
    warning::CompileWarning,
};

use core::cell::RefCell;

/// A handler with which you can emit diagnostics.
///
/// Errors and warnings are kept in emission order so reporting can interleave them the way they
/// were found.
#[derive(Default, Debug)]
pub struct Handler {
    inner: RefCell<HandlerInner>,
}

#[derive(Default, Debug, Clone)]
struct HandlerInner {
    errors: Vec<CompileError>,
    warnings: Vec<CompileWarning>,
    diagnostics: Vec<Diagnostic>,
}

impl Handler {
    /// Emit the error `err`.
    pub fn emit_err(&self, err: CompileError) -> ErrorEmitted {
        let mut inner = self.inner.borrow_mut();
        inner.diagnostics.push(err.to_diagnostic());
        inner.errors.push(err);
        ErrorEmitted { _priv: () }
    }

    /// Emit the warning `warn`.
    pub fn emit_warn(&self, warn: CompileWarning) {
        let mut inner = self.inner.borrow_mut();
        inner.diagnostics.push(warn.to_diagnostic());
        inner.warnings.push(warn);
    }

    pub fn has_errors(&self) -> bool {
        !self.inner.borrow().errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.inner.borrow().warnings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.inner.borrow().errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.inner.borrow().warnings.len()
    }

    pub fn errors(&self) -> Vec<CompileError> {
        self.inner.borrow().errors.clone()
    }

    pub fn warnings(&self) -> Vec<CompileWarning> {
        self.inner.borrow().warnings.clone()
    }

    /// Every error and warning emitted so far, in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.borrow().diagnostics.clone()
    }

    /// Extract all the errors and warnings from this handler.
    pub fn consume(self) -> (Vec<CompileError>, Vec<CompileWarning>) {
        let inner = self.inner.into_inner();
        (inner.errors, inner.warnings)
    }

    /// Moves everything emitted into `other` onto the end of this handler.
    pub fn append(&self, other: Handler) {
        let other = other.inner.into_inner();
        let mut inner = self.inner.borrow_mut();
        inner.errors.extend(other.errors);
        inner.warnings.extend(other.warnings);
        inner.diagnostics.extend(other.diagnostics);
    }

    /// Runs `f` with a fresh handler, then folds its diagnostics into this one, returning
    /// `Err` if `f` emitted any error.
    pub fn scope<T>(
        &self,
        f: impl FnOnce(&Handler) -> Result<T, ErrorEmitted>,
    ) -> Result<T, ErrorEmitted> {
        let scoped_handler = Handler::default();
        let closure_res = f(&scoped_handler);
        let had_errors = scoped_handler.has_errors();
        self.append(scoped_handler);
        if had_errors {
            Err(ErrorEmitted { _priv: () })
        } else {
            closure_res
        }
    }
}

/// Proof that an error was emitted through a `Handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorEmitted {
    _priv: (),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostic::Level,
        warning::{BranchKind, Warning},
    };
    use ember_types::Span;

    #[test]
    fn keeps_emission_order() {
        let handler = Handler::default();
        handler.emit_warn(CompileWarning {
            span: Span::dummy(),
            warning_content: Warning::ConditionIsConst {
                construct: BranchKind::If,
            },
        });
        handler.emit_err(CompileError::ValueUndefined {
            name: "c".to_string(),
            span: Span::dummy(),
        });
        handler.emit_warn(CompileWarning {
            span: Span::dummy(),
            warning_content: Warning::BlockUnreachable,
        });

        let levels = handler
            .diagnostics()
            .iter()
            .map(|d| d.level)
            .collect::<Vec<_>>();
        assert_eq!(levels, vec![Level::Warning, Level::Error, Level::Warning]);
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 2);
    }

    #[test]
    fn scope_reports_errors() {
        let handler = Handler::default();
        let res = handler.scope(|handler| {
            handler.emit_err(CompileError::BreakOutsideLoop {
                span: Span::dummy(),
            });
            Ok(())
        });
        assert!(res.is_err());
        assert!(handler.has_errors());
    }
}

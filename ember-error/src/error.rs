use crate::diagnostic::{Category, Diagnostic, Level, ToDiagnostic};

use ember_types::{Span, Spanned};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompileError {
    // Binding resolution.
    #[error("Value undefined: \"{name}\".")]
    ValueUndefined { name: String, span: Span },
    #[error("Closure uses \"{name}\", which is not bound in any enclosing scope.")]
    BindingNotFound { name: String, span: Span },
    #[error("Call site does not bind \"{name}\", which the called closure captures.")]
    BindingNotFoundInCall { name: String, span: Span },

    // Control flow shape.
    #[error("\"break\" is only valid inside a loop or a switch.")]
    BreakOutsideLoop { span: Span },
    #[error("\"continue\" is only valid inside a loop.")]
    ContinueOutsideLoop { span: Span },
    #[error("\"fallthrough\" is only valid as the last statement of a switch case.")]
    MisplacedFallthrough { span: Span },

    // Types.
    #[error(
        "Assignment count mismatch: {left} target{} but {right} value{}.",
        plural(*left),
        plural(*right)
    )]
    MultipleAssignFailed {
        left: usize,
        right: usize,
        span: Span,
    },
    #[error("Invalid field \"{key}\" on a value of type \"{ty}\".")]
    InvalidField { ty: String, key: String, span: Span },
    #[error(
        "{kind} \"{name}\" has no member \"{key}\"{}",
        suggestion
            .as_ref()
            .map(|s| format!(", did you mean \"{s}\"?"))
            .unwrap_or_else(|| ".".to_string())
    )]
    ExternFieldError {
        kind: String,
        name: String,
        key: String,
        suggestion: Option<String>,
        span: Span,
    },
    #[error("Iterating a channel of \"{ty}\" yields a single value, but two were requested.")]
    InvalidChanType { ty: String, span: Span },
    #[error("Argument {index} of \"{func}\" has type \"{got}\", but \"{want}\" is expected.")]
    ArgumentTypeError {
        index: usize,
        got: String,
        want: String,
        func: String,
        span: Span,
    },
    #[error("Not enough arguments in call to \"{func}\": have ({have}), want ({want}).")]
    NotEnoughArguments {
        func: String,
        have: String,
        want: String,
        span: Span,
    },
    #[error("Too many arguments in call to \"{func}\": have ({have}), want ({want}).")]
    TooManyArguments {
        func: String,
        have: String,
        want: String,
        span: Span,
    },
    #[error(
        "Assignment mismatch: {left} target{} but the call returns {right} value{} ({ty}).",
        plural(*left),
        plural(*right)
    )]
    CallAssignmentMismatch {
        left: usize,
        right: usize,
        ty: String,
        span: Span,
    },
    #[error(
        "Assignment mismatch: {left} target{} but the call returns {right} value{} ({ty}) \
         once its error is dropped.",
        plural(*left),
        plural(*right)
    )]
    CallAssignmentMismatchDropError {
        left: usize,
        right: usize,
        ty: String,
        span: Span,
    },
    #[error("Error value is never handled.")]
    ErrorUnhandled { span: Span },
    #[error("Value is null: the call returns nothing once its error is dropped.")]
    ValueIsNull { span: Span },
    #[error(
        "Generic type \"{generic}\" is bound to \"{first}\" and cannot also be \"{second}\"."
    )]
    GenericTypeMismatch {
        generic: String,
        first: String,
        second: String,
        span: Span,
    },

    // Front-end and file inclusion.
    #[error("Syntax error: {message}")]
    SyntaxError { message: String, span: Span },
    #[error("Cannot include \"{path}\": {reason}")]
    IncludeFailed {
        path: String,
        reason: String,
        span: Span,
    },
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

impl Spanned for CompileError {
    fn span(&self) -> Span {
        use CompileError::*;
        match self {
            ValueUndefined { span, .. } => span.clone(),
            BindingNotFound { span, .. } => span.clone(),
            BindingNotFoundInCall { span, .. } => span.clone(),
            BreakOutsideLoop { span } => span.clone(),
            ContinueOutsideLoop { span } => span.clone(),
            MisplacedFallthrough { span } => span.clone(),
            MultipleAssignFailed { span, .. } => span.clone(),
            InvalidField { span, .. } => span.clone(),
            ExternFieldError { span, .. } => span.clone(),
            InvalidChanType { span, .. } => span.clone(),
            ArgumentTypeError { span, .. } => span.clone(),
            NotEnoughArguments { span, .. } => span.clone(),
            TooManyArguments { span, .. } => span.clone(),
            CallAssignmentMismatch { span, .. } => span.clone(),
            CallAssignmentMismatchDropError { span, .. } => span.clone(),
            ErrorUnhandled { span } => span.clone(),
            ValueIsNull { span } => span.clone(),
            GenericTypeMismatch { span, .. } => span.clone(),
            SyntaxError { span, .. } => span.clone(),
            IncludeFailed { span, .. } => span.clone(),
        }
    }
}

impl CompileError {
    pub fn category(&self) -> Category {
        use CompileError::*;
        match self {
            ValueUndefined { .. } | BindingNotFound { .. } | BindingNotFoundInCall { .. } => {
                Category::Binding
            }
            BreakOutsideLoop { .. } | ContinueOutsideLoop { .. } | MisplacedFallthrough { .. } => {
                Category::ControlFlow
            }
            MultipleAssignFailed { .. }
            | InvalidField { .. }
            | ExternFieldError { .. }
            | InvalidChanType { .. }
            | ArgumentTypeError { .. }
            | NotEnoughArguments { .. }
            | TooManyArguments { .. }
            | CallAssignmentMismatch { .. }
            | CallAssignmentMismatchDropError { .. }
            | ErrorUnhandled { .. }
            | ValueIsNull { .. }
            | GenericTypeMismatch { .. } => Category::Type,
            SyntaxError { .. } => Category::Syntax,
            IncludeFailed { .. } => Category::Include,
        }
    }
}

impl ToDiagnostic for CompileError {
    fn to_diagnostic(&self) -> Diagnostic {
        let span = self.span();
        Diagnostic {
            level: Level::Error,
            category: self.category(),
            message: self.to_string(),
            span: (!span.is_dummy()).then_some(span),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_name_counts() {
        let err = CompileError::CallAssignmentMismatch {
            left: 1,
            right: 2,
            ty: "number, error".to_string(),
            span: Span::dummy(),
        };
        assert_eq!(
            err.to_string(),
            "Assignment mismatch: 1 target but the call returns 2 values (number, error)."
        );
    }

    #[test]
    fn extern_field_suggestion() {
        let err = CompileError::ExternFieldError {
            kind: "Library".to_string(),
            name: "str".to_string(),
            key: "Splt".to_string(),
            suggestion: Some("Split".to_string()),
            span: Span::dummy(),
        };
        assert_eq!(
            err.to_string(),
            "Library \"str\" has no member \"Splt\", did you mean \"Split\"?"
        );
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.level, Level::Error);
        assert_eq!(diagnostic.category, Category::Type);
        assert!(diagnostic.span.is_none());
    }
}

use std::fmt;

use ember_types::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

/// Which part of the analysis a diagnostic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// An identifier, free value or external symbol could not be resolved or was misused.
    Binding,
    /// `break`, `continue`, `fallthrough` or a branch condition has the wrong shape.
    ControlFlow,
    Type,
    /// Constant conditions and unreachable code.
    Advisory,
    Syntax,
    Include,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Binding => "binding",
            Category::ControlFlow => "control-flow",
            Category::Type => "type",
            Category::Advisory => "advisory",
            Category::Syntax => "syntax",
            Category::Include => "include",
        })
    }
}

/// A flattened, ordered view of an error or a warning, as handed to external reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub category: Category,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn is_warning(&self) -> bool {
        self.level == Level::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{level}[{}]: {}", self.category, self.message)?;
        if let Some(span) = &self.span {
            write!(f, " ({span})")?;
        }
        Ok(())
    }
}

pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}

use crate::diagnostic::{Category, Diagnostic, Level, ToDiagnostic};

use core::fmt;

use ember_types::{SourceId, Span, Spanned};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileWarning {
    pub span: Span,
    pub warning_content: Warning,
}

impl Spanned for CompileWarning {
    fn span(&self) -> Span {
        self.span.clone()
    }
}

impl CompileWarning {
    pub fn to_friendly_warning_string(&self) -> String {
        self.warning_content.to_string()
    }

    pub fn source_id(&self) -> Option<SourceId> {
        self.span.source_id().cloned()
    }
}

/// The kind of branch a constant condition was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    If,
    Loop,
    Switch,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BranchKind::If => "if",
            BranchKind::Loop => "loop",
            BranchKind::Switch => "switch",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Warning {
    AssignToExtern { name: String },
    MissingCondition { construct: BranchKind },
    ConditionIsConst { construct: BranchKind },
    BlockUnreachable,
}

impl Warning {
    pub fn category(&self) -> Category {
        match self {
            Warning::AssignToExtern { .. } => Category::Binding,
            Warning::MissingCondition { .. } => Category::ControlFlow,
            Warning::ConditionIsConst { .. } | Warning::BlockUnreachable => Category::Advisory,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Warning::*;
        match self {
            AssignToExtern { name } => write!(
                f,
                "\"{name}\" is provided by the host; assigning to it shadows the external symbol."
            ),
            MissingCondition { construct } => write!(
                f,
                "The \"{construct}\" condition is missing and is assumed to be true."
            ),
            ConditionIsConst { construct } => {
                write!(f, "The \"{construct}\" condition is a constant.")
            }
            BlockUnreachable => write!(f, "This code is unreachable."),
        }
    }
}

impl ToDiagnostic for CompileWarning {
    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            level: Level::Warning,
            category: self.warning_content.category(),
            message: self.to_friendly_warning_string(),
            span: (!self.span.is_dummy()).then(|| self.span.clone()),
        }
    }
}

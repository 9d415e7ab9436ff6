use crate::priv_prelude::*;

#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug)]
pub enum Statement {
    Expr(Expr),
    Assign(Assignment),
    Declare(Declaration),
    Block(CodeBlock),
    If(IfStatement),
    For(ForStatement),
    ForRange(ForRangeStatement),
    Switch(SwitchStatement),
    Try(TryStatement),
    Return { values: Vec<Expr>, span: Span },
    Break(Span),
    Continue(Span),
    Fallthrough(Span),
    /// `defer f()` or `defer { ... }`.
    Defer { expr: Expr, span: Span },
    /// `go f()`.
    Go { expr: Expr, span: Span },
    Include { path: String, span: Span },
    /// `assert cond` or `assert cond, message`.
    Assert {
        cond: Expr,
        message: Option<Expr>,
        span: Span,
    },
    /// `ch <- value`.
    Send { chan: Expr, value: Expr, span: Span },
}

#[derive(Clone, Debug)]
pub struct CodeBlock {
    pub statements: Vec<Statement>,
    pub span: Span,
}

/// `var a, b` or `var a, b = x, y`.
#[derive(Clone, Debug)]
pub struct Declaration {
    pub names: Vec<Ident>,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Assignment {
    pub kind: AssignKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum AssignKind {
    /// `a, b = x, y`, or `a, b := x, y` when `force` is set.
    Assign {
        targets: Vec<LeftValue>,
        values: Vec<Expr>,
        force: bool,
    },
    /// `a += x`
    Compound {
        target: LeftValue,
        op: BinaryOp,
        value: Expr,
    },
    /// `a++` and `a--`
    Step { target: LeftValue, increment: bool },
}

#[derive(Clone, Debug)]
pub enum LeftValue {
    Ident(Ident),
    Member {
        target: Box<Expr>,
        member: MemberKey,
        span: Span,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
}

#[derive(Clone, Debug)]
pub struct IfStatement {
    /// The `if` branch followed by every `elif` / `else if` branch.
    pub branches: Vec<IfBranch>,
    pub else_block: Option<CodeBlock>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfBranch {
    /// `None` when a front-end recovered from a missing condition.
    pub condition: Option<Expr>,
    pub body: CodeBlock,
    pub span: Span,
}

/// `for init; cond; step { }`, `for cond { }` and `for { }`.
#[derive(Clone, Debug)]
pub struct ForStatement {
    pub init: Option<Box<Statement>>,
    pub condition: Option<Expr>,
    pub step: Option<Box<Statement>>,
    pub body: CodeBlock,
    pub span: Span,
}

/// `for k, v in xs { }` (declares the loop variables) or `for k, v = range xs { }`.
#[derive(Clone, Debug)]
pub struct ForRangeStatement {
    pub key: Option<Ident>,
    pub value: Option<Ident>,
    pub declare: bool,
    pub iterable: Expr,
    pub body: CodeBlock,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SwitchStatement {
    /// A switch without a subject treats every case label as a condition.
    pub subject: Option<Expr>,
    pub cases: Vec<SwitchCase>,
    pub default: Option<CodeBlock>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub labels: Vec<Expr>,
    pub body: CodeBlock,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TryStatement {
    pub body: CodeBlock,
    pub catch_ident: Option<Ident>,
    pub catch_body: CodeBlock,
    pub finally_body: Option<CodeBlock>,
    pub span: Span,
}

impl Spanned for Statement {
    fn span(&self) -> Span {
        match self {
            Statement::Expr(expr) => expr.span(),
            Statement::Assign(assign) => assign.span.clone(),
            Statement::Declare(decl) => decl.span.clone(),
            Statement::Block(block) => block.span(),
            Statement::If(if_stmt) => if_stmt.span.clone(),
            Statement::For(for_stmt) => for_stmt.span.clone(),
            Statement::ForRange(for_range) => for_range.span.clone(),
            Statement::Switch(switch) => switch.span.clone(),
            Statement::Try(try_stmt) => try_stmt.span.clone(),
            Statement::Return { span, .. }
            | Statement::Break(span)
            | Statement::Continue(span)
            | Statement::Fallthrough(span)
            | Statement::Defer { span, .. }
            | Statement::Go { span, .. }
            | Statement::Include { span, .. }
            | Statement::Assert { span, .. }
            | Statement::Send { span, .. } => span.clone(),
        }
    }
}

impl Spanned for CodeBlock {
    fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Spanned for LeftValue {
    fn span(&self) -> Span {
        match self {
            LeftValue::Ident(ident) => ident.span(),
            LeftValue::Member { span, .. } | LeftValue::Index { span, .. } => span.clone(),
        }
    }
}

impl LeftValue {
    /// The same location read as an expression, used by compound assignment.
    pub fn to_expr(&self) -> Expr {
        let kind = match self {
            LeftValue::Ident(ident) => ExprKind::Ident(ident.clone()),
            LeftValue::Member { target, member, .. } => ExprKind::Member {
                target: target.clone(),
                member: member.clone(),
            },
            LeftValue::Index { target, index, .. } => ExprKind::Index {
                target: target.clone(),
                index: index.clone(),
            },
        };
        Expr {
            kind,
            span: self.span(),
        }
    }
}

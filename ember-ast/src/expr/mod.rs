use crate::priv_prelude::*;

pub mod op_code;

use op_code::{BinaryOp, UnaryOp};

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Ident(Ident),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a.b` or `a.$key`.
    Member {
        target: Box<Expr>,
        member: MemberKey,
    },
    /// `a[i]`.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `a[low:high]` or `a[low:high:max]`.
    Slice {
        target: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `cond ? then : otherwise`.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Panic(Box<Expr>),
    Recover,
    Call(CallExpr),
    Function(FunctionLiteral),
    /// `fn { ... }`: an anonymous function called on the spot.
    InstanceCode(CodeBlock),
    /// `make([]T, len, cap)`, `make(map[K]V)`, `make(chan T)`.
    Make {
        ty: TypeExpr,
        args: Vec<Expr>,
    },
    /// `[a, b]` or `[]T{a, b}` when `elem_ty` is given.
    SliceLiteral {
        elem_ty: Option<TypeExpr>,
        elems: Vec<Expr>,
    },
    /// `{k: v}` or `map[K]V{k: v}` when `ty` is given.
    MapLiteral {
        ty: Option<(TypeExpr, TypeExpr)>,
        pairs: Vec<(Expr, Expr)>,
    },
    /// Placeholder left by a front-end that recovered from a syntax error.
    Missing,
}

#[derive(Clone, Debug)]
pub enum MemberKey {
    Name(Ident),
    Dynamic(Box<Expr>),
}

#[derive(Clone, Debug)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<Expr>,
    /// `f(xs...)`: the last argument is spread.
    pub ellipsis: bool,
    /// `f()~`: the trailing error result is dropped.
    pub drop_error: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionLiteral {
    pub name: Option<Ident>,
    pub params: Vec<Ident>,
    /// The last parameter collects the remaining arguments.
    pub variadic: bool,
    pub body: FunctionBody,
}

#[derive(Clone, Debug)]
pub enum FunctionBody {
    Block(CodeBlock),
    /// `x => x + 1`
    Expr(Box<Expr>),
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Spanned for MemberKey {
    fn span(&self) -> Span {
        match self {
            MemberKey::Name(ident) => ident.span(),
            MemberKey::Dynamic(expr) => expr.span(),
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr { kind, span }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(ident) => Some(ident),
            _ => None,
        }
    }
}

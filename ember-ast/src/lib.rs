//! The syntax tree consumed by the IR builder.
//!
//! Every statement and expression node carries the [Span] it was parsed from, which the builder
//! stamps onto the IR values it emits. Front-ends produce a [Module] through the [FrontEnd] trait.

pub mod expr;
pub mod front_end;
pub mod literal;
pub mod module;
pub mod statement;
pub mod ty;

mod priv_prelude {
    pub use crate::{expr::op_code::*, expr::*, literal::*, statement::*, ty::*};
    pub use ember_types::{Ident, Span, Spanned};
}

pub use crate::{
    expr::{
        op_code::{BinaryOp, UnaryOp},
        CallExpr, Expr, ExprKind, FunctionBody, FunctionLiteral, MemberKey,
    },
    front_end::FrontEnd,
    literal::Literal,
    module::Module,
    statement::{
        AssignKind, Assignment, CodeBlock, Declaration, ForRangeStatement, ForStatement,
        IfBranch, IfStatement, LeftValue, Statement, SwitchCase, SwitchStatement, TryStatement,
    },
    ty::TypeExpr,
};

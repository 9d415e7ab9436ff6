use crate::priv_prelude::*;

/// A type written in source, as used by `make` and typed literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpr {
    /// A scalar or named type such as `int`, `string` or `any`.
    Named(Ident),
    Slice(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Chan(Box<TypeExpr>),
}

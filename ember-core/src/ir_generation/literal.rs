use ember_ast::{Expr, Literal, TypeExpr};
use ember_ir::{
    parse_type_desc, resolve_type_desc, Constant, ConstantValue, Context, Type, TypeDesc, Value,
};
use ember_types::Span;

use super::function::IrBuilder;

impl<'eng> IrBuilder<'eng> {
    pub(super) fn compile_literal(
        &mut self,
        context: &mut Context,
        literal: &Literal,
        span: &Span,
    ) -> Value {
        let value = match literal {
            Literal::Null => ConstantValue::Null,
            Literal::Bool(b) => ConstantValue::Bool(*b),
            Literal::Int(n) => ConstantValue::Number(*n),
            Literal::Float(f) => ConstantValue::Float(*f),
            Literal::String(s) => ConstantValue::String(s.clone()),
            Literal::Bytes(bs) => ConstantValue::Bytes(bs.clone()),
        };
        let constant = Constant::new(context, value);
        Value::new_constant(context, constant, Some(span.clone()))
    }

    /// `make(T, len, cap)`.  Arguments past the capacity are evaluated and ignored.
    pub(super) fn compile_make(
        &mut self,
        context: &mut Context,
        ty: &TypeExpr,
        args: &[Expr],
        span: &Span,
    ) -> Value {
        let ty = self.resolve_type_expr(context, ty);
        let mut hints = Vec::with_capacity(args.len());
        for arg in args {
            hints.push(self.compile_expression(context, arg));
        }
        let mut hints = hints.into_iter();
        let len = hints.next();
        let cap = hints.next();
        self.current_block()
            .append(context)
            .with_span(Some(span.clone()))
            .make(ty, len, cap, false)
    }

    /// `[a, b]` or `[]T{a, b}`: a `make` followed by one update per element.
    pub(super) fn compile_slice_literal(
        &mut self,
        context: &mut Context,
        elem_ty: Option<&TypeExpr>,
        elems: &[Expr],
        span: &Span,
    ) -> Value {
        let mut values = Vec::with_capacity(elems.len());
        for elem in elems {
            values.push(self.compile_expression(context, elem));
        }

        let elem = match elem_ty {
            Some(elem_ty) => self.resolve_type_expr(context, elem_ty),
            None => Type::get_any(context),
        };
        let ty = Type::new_slice(context, elem);
        let len = Constant::new_number(context, values.len() as i64);
        let len = Value::new_constant(context, len, None);
        let object = self
            .current_block()
            .append(context)
            .with_span(Some(span.clone()))
            .make(ty, Some(len), None, elem_ty.is_none());
        for (idx, value) in values.into_iter().enumerate() {
            let key = Constant::new_number(context, idx as i64);
            let key = Value::new_constant(context, key, None);
            let span = value.get_span(context);
            self.current_block()
                .append(context)
                .with_span(span)
                .update(object, key, value);
        }
        object
    }

    /// `{k: v}` or `map[K]V{k: v}`.
    pub(super) fn compile_map_literal(
        &mut self,
        context: &mut Context,
        ty: Option<&(TypeExpr, TypeExpr)>,
        pairs: &[(Expr, Expr)],
        span: &Span,
    ) -> Value {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = self.compile_expression(context, key);
            let value = self.compile_expression(context, value);
            entries.push((key, value));
        }

        let (key_ty, value_ty) = match ty {
            Some((key_ty, value_ty)) => (
                self.resolve_type_expr(context, key_ty),
                self.resolve_type_expr(context, value_ty),
            ),
            None => (Type::get_any(context), Type::get_any(context)),
        };
        let map_ty = Type::new_map(context, key_ty, value_ty);
        let object = self
            .current_block()
            .append(context)
            .with_span(Some(span.clone()))
            .make(map_ty, None, None, ty.is_none());
        for (key, value) in entries {
            let span = value.get_span(context);
            self.current_block()
                .append(context)
                .with_span(span)
                .update(object, key, value);
        }
        object
    }

    fn resolve_type_expr(&self, context: &mut Context, ty: &TypeExpr) -> Type {
        let desc = type_expr_to_desc(ty);
        resolve_type_desc(context, &desc, self.externs.named_types())
    }
}

fn type_expr_to_desc(ty: &TypeExpr) -> TypeDesc {
    match ty {
        TypeExpr::Named(ident) => match ident.as_str() {
            "var" => TypeDesc::Any,
            name => parse_type_desc(name).unwrap_or_else(|_| TypeDesc::Named(name.to_owned())),
        },
        TypeExpr::Slice(elem) => TypeDesc::Slice(Box::new(type_expr_to_desc(elem))),
        TypeExpr::Map(key, value) => TypeDesc::Map(
            Box::new(type_expr_to_desc(key)),
            Box::new(type_expr_to_desc(value)),
        ),
        TypeExpr::Chan(elem) => TypeDesc::Channel(Box::new(type_expr_to_desc(elem))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_types::Ident;

    fn named(name: &str) -> TypeExpr {
        TypeExpr::Named(Ident::new_no_span(name.to_owned()))
    }

    #[test]
    fn source_types_become_descriptors() {
        assert_eq!(type_expr_to_desc(&named("int")), TypeDesc::Number);
        assert_eq!(type_expr_to_desc(&named("var")), TypeDesc::Any);
        assert_eq!(
            type_expr_to_desc(&TypeExpr::Map(
                Box::new(named("string")),
                Box::new(TypeExpr::Slice(Box::new(named("Response")))),
            )),
            TypeDesc::Map(
                Box::new(TypeDesc::String),
                Box::new(TypeDesc::Slice(Box::new(TypeDesc::Named(
                    "Response".to_owned()
                )))),
            )
        );
    }
}

//! A reference front-end for the scripting language analyzed by Ember.
//!
//! The grammar covers every node kind the IR builder dispatches on. It is used by tooling and
//! tests to write programs as source text instead of constructing trees by hand.

mod grammar;
mod literal;

use std::sync::Arc;

use ember_ast::{FrontEnd, Module};
use ember_error::{
    error::CompileError,
    handler::{ErrorEmitted, Handler},
};
use ember_types::{SourceId, Span};

use crate::grammar::{script, SpanCtx};

/// Parse `src` into a [Module], emitting a syntax error into `handler` on failure.
pub fn parse_module(
    handler: &Handler,
    src: Arc<str>,
    source_id: Option<SourceId>,
) -> Result<Module, ErrorEmitted> {
    let ctx = SpanCtx {
        src: src.clone(),
        source_id,
    };
    match script::module(&src, &ctx) {
        Ok(statements) => Ok(Module {
            statements,
            span: ctx.span(0, src.len()),
        }),
        Err(err) => {
            let start = err.location.offset;
            let end = src[start..]
                .chars()
                .next()
                .map(|c| start + c.len_utf8())
                .unwrap_or(start);
            tracing::debug!(%err, "syntax error");
            Err(handler.emit_err(CompileError::SyntaxError {
                message: format!("expected {} at {}", err.expected, err.location),
                span: Span::new(src, start, end, source_id).unwrap_or_else(Span::dummy),
            }))
        }
    }
}

/// The [FrontEnd] handed to the builder for `include`d files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptFrontEnd;

impl FrontEnd for ScriptFrontEnd {
    fn parse(
        &self,
        handler: &Handler,
        src: Arc<str>,
        source_id: Option<SourceId>,
    ) -> Result<Module, ErrorEmitted> {
        parse_module(handler, src, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{
        AssignKind, BinaryOp, ExprKind, FunctionBody, LeftValue, Literal, MemberKey, Statement,
        UnaryOp,
    };
    use ember_types::Spanned;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Module {
        let handler = Handler::default();
        let module = parse_module(&handler, Arc::from(src), None);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        module.unwrap()
    }

    #[test]
    fn assignments() {
        let module = parse("a = 1\nb, c := 2, 3; d += a\ne++\nx.y = 1\nx[0] = 2");
        assert_eq!(module.statements.len(), 6);
        let Statement::Assign(assign) = &module.statements[1] else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign {
            targets,
            values,
            force,
        } = &assign.kind
        else {
            panic!("expected a plain assignment");
        };
        assert_eq!(targets.len(), 2);
        assert_eq!(values.len(), 2);
        assert!(*force);
        assert!(matches!(
            &module.statements[2],
            Statement::Assign(a) if matches!(a.kind, AssignKind::Compound { op: BinaryOp::Add, .. })
        ));
        assert!(matches!(
            &module.statements[3],
            Statement::Assign(a) if matches!(a.kind, AssignKind::Step { increment: true, .. })
        ));
        let Statement::Assign(member) = &module.statements[4] else {
            panic!("expected an assignment");
        };
        assert!(matches!(
            &member.kind,
            AssignKind::Assign { targets, .. } if matches!(
                &targets[0],
                LeftValue::Member { member: MemberKey::Name(n), .. } if n.as_str() == "y"
            )
        ));
    }

    #[test]
    fn spans_cover_source() {
        let module = parse("a = 1\nprintln(a)");
        let span = module.statements[1].span();
        assert_eq!(span.as_str(), "println(a)");
        assert_eq!(span.start_line_col().line, 2);
        assert_eq!(span.start_line_col().col, 1);
    }

    #[test]
    fn control_flow() {
        let module = parse(
            r#"
for i = 0; i < 10; i++ {
    if i > 5 {
        break
    } elif i == 2 {
        continue
    } else if i == 3 {
        a = 1
    } else {
        a = 2
    }
}
for k, v in [1, 2] { println(k, v) }
for { break }
switch x {
case 1, 2:
    a = 1
    fallthrough
default:
    a = 3
}
try {
    a = 1
} catch err {
    println(err)
} finally {
    a = 0
}
"#,
        );
        assert_eq!(module.statements.len(), 5);
        let Statement::For(for_stmt) = &module.statements[0] else {
            panic!("expected a for loop");
        };
        assert!(for_stmt.init.is_some() && for_stmt.step.is_some());
        let Statement::If(if_stmt) = &for_stmt.body.statements[0] else {
            panic!("expected an if");
        };
        assert_eq!(if_stmt.branches.len(), 3);
        assert!(if_stmt.else_block.is_some());
        assert!(matches!(
            &module.statements[1],
            Statement::ForRange(r) if r.declare && r.value.is_some()
        ));
        let Statement::Switch(switch) = &module.statements[3] else {
            panic!("expected a switch");
        };
        assert_eq!(switch.cases.len(), 1);
        assert_eq!(switch.cases[0].labels.len(), 2);
        assert!(matches!(
            switch.cases[0].body.statements.last(),
            Some(Statement::Fallthrough(_))
        ));
        assert!(switch.default.is_some());
        assert!(matches!(&module.statements[4], Statement::Try(t) if t.finally_body.is_some()));
    }

    #[test]
    fn functions_and_calls() {
        let module = parse(
            r#"
f = (a, b...) => { return a }
g = x => x + 1
func h(a) { return a }
fn { b = 1 }
a = getError()~
print(xs...)
m = make([]int, 0, 10)
"#,
        );
        let Statement::Assign(assign) = &module.statements[0] else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign { values, .. } = &assign.kind else {
            panic!("expected a plain assignment");
        };
        let ExprKind::Function(f) = &values[0].kind else {
            panic!("expected a function literal");
        };
        assert_eq!(f.params.len(), 2);
        assert!(f.variadic);
        let Statement::Assign(assign) = &module.statements[1] else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign { values, .. } = &assign.kind else {
            panic!("expected a plain assignment");
        };
        assert!(matches!(
            &values[0].kind,
            ExprKind::Function(f) if matches!(f.body, FunctionBody::Expr(_))
        ));
        assert!(matches!(
            &module.statements[2],
            Statement::Expr(e) if matches!(&e.kind, ExprKind::Function(f) if f.name.is_some())
        ));
        assert!(matches!(
            &module.statements[3],
            Statement::Expr(e) if matches!(e.kind, ExprKind::InstanceCode(_))
        ));
        let Statement::Assign(assign) = &module.statements[4] else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign { values, .. } = &assign.kind else {
            panic!("expected a plain assignment");
        };
        assert!(matches!(&values[0].kind, ExprKind::Call(c) if c.drop_error));
        assert!(matches!(
            &module.statements[5],
            Statement::Expr(e) if matches!(&e.kind, ExprKind::Call(c) if c.ellipsis)
        ));
    }

    #[test]
    fn literals() {
        let module = parse(r#"a = [1, 2.5, "s", b"x", true, nil, {"k": 'v'}, []string{"a"}]"#);
        let Statement::Assign(assign) = &module.statements[0] else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign { values, .. } = &assign.kind else {
            panic!("expected a plain assignment");
        };
        let ExprKind::SliceLiteral { elems, elem_ty } = &values[0].kind else {
            panic!("expected a slice literal");
        };
        assert!(elem_ty.is_none());
        let lits = elems
            .iter()
            .filter_map(|e| match &e.kind {
                ExprKind::Literal(l) => Some(l.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            lits,
            vec![
                Literal::Int(1),
                Literal::Float(2.5),
                Literal::String("s".to_string()),
                Literal::Bytes(b"x".to_vec()),
                Literal::Bool(true),
                Literal::Null,
            ]
        );
        assert!(matches!(
            &elems[6].kind,
            ExprKind::MapLiteral { ty: None, pairs } if pairs.len() == 1
        ));
        assert!(matches!(&elems[7].kind, ExprKind::SliceLiteral { elem_ty: Some(_), .. }));
    }

    fn assigned_value(stmt: &Statement) -> &ExprKind {
        let Statement::Assign(assign) = stmt else {
            panic!("expected an assignment");
        };
        let AssignKind::Assign { values, .. } = &assign.kind else {
            panic!("expected a plain assignment");
        };
        &values[0].kind
    }

    #[test]
    fn operators_and_statements() {
        let module = parse(
            r#"
a = ok ? 1 : x ? 2 : 3
b = k in m
c = k not in m
d = xs[1:n]
e = xs[:2:4]
ch <- a + 1
assert a > 0, "positive"
assert b
panic(err)
r = recover()
"#,
        );
        assert_eq!(module.statements.len(), 10);
        let ExprKind::Ternary { otherwise, .. } = assigned_value(&module.statements[0]) else {
            panic!("expected a ternary");
        };
        assert!(matches!(otherwise.kind, ExprKind::Ternary { .. }));
        assert!(matches!(
            assigned_value(&module.statements[1]),
            ExprKind::Binary { op: BinaryOp::In, .. }
        ));
        let ExprKind::Unary { op, expr } = assigned_value(&module.statements[2]) else {
            panic!("expected a negated membership test");
        };
        assert_eq!(*op, UnaryOp::Not);
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::In, .. }));
        assert!(matches!(
            assigned_value(&module.statements[3]),
            ExprKind::Slice { low: Some(_), high: Some(_), max: None, .. }
        ));
        assert!(matches!(
            assigned_value(&module.statements[4]),
            ExprKind::Slice { low: None, high: Some(_), max: Some(_), .. }
        ));
        let Statement::Send { value, .. } = &module.statements[5] else {
            panic!("expected a channel send");
        };
        assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(
            &module.statements[6],
            Statement::Assert { message: Some(_), .. }
        ));
        assert!(matches!(
            &module.statements[7],
            Statement::Assert { message: None, .. }
        ));
        assert!(matches!(
            &module.statements[8],
            Statement::Expr(e) if matches!(e.kind, ExprKind::Panic(_))
        ));
        assert!(matches!(
            assigned_value(&module.statements[9]),
            ExprKind::Recover
        ));
    }

    #[test]
    fn less_than_negative_is_not_a_send() {
        let module = parse("ok = a < -1");
        assert!(matches!(
            assigned_value(&module.statements[0]),
            ExprKind::Binary { op: BinaryOp::Lt, .. }
        ));
    }

    #[test]
    fn syntax_error_is_reported() {
        let handler = Handler::default();
        let res = parse_module(&handler, Arc::from("a = (1"), None);
        assert!(res.is_err());
        let diagnostics = handler.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.starts_with("Syntax error"));
    }
}

use std::sync::Arc;

use ember_ast::{
    AssignKind, Assignment, BinaryOp, CallExpr, CodeBlock, Declaration, Expr, ExprKind,
    ForRangeStatement, ForStatement, FunctionBody, FunctionLiteral, IfBranch, IfStatement,
    LeftValue, Literal, MemberKey, Statement, SwitchCase, SwitchStatement, TryStatement, TypeExpr,
    UnaryOp,
};
use ember_types::{Ident, SourceId, Span, Spanned};
use peg::ParseLiteral;

use crate::literal::{parse_int, unescape};

/// Turns byte offsets reported by the grammar into [Span]s over the shared source.
pub(crate) struct SpanCtx {
    pub(crate) src: Arc<str>,
    pub(crate) source_id: Option<SourceId>,
}

impl SpanCtx {
    pub(crate) fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.src.clone(), start, end, self.source_id).unwrap_or_else(Span::dummy)
    }
}

enum PostfixOp {
    Call {
        args: Vec<Expr>,
        ellipsis: bool,
        drop_error: bool,
        end: usize,
    },
    Member {
        member: MemberKey,
        end: usize,
    },
    Index {
        index: Expr,
        end: usize,
    },
    Slice {
        low: Option<Expr>,
        high: Option<Expr>,
        max: Option<Expr>,
        end: usize,
    },
}

enum SwitchItem {
    Case(SwitchCase),
    Default(CodeBlock),
}

peg::parser! {
    pub(crate) grammar script(ctx: &SpanCtx) for str {
        pub(crate) rule module() -> Vec<Statement>
            = stmts:statements() eoi() {
                stmts
            }

        // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
        // Statements

        rule statements() -> Vec<Statement>
            = stmts:(_ st:statement() __ ";"? { st })* _ {
                stmts
            }

        rule statement() -> Statement
            = if_stmt()
            / for_stmt()
            / switch_stmt()
            / try_stmt()
            / return_stmt()
            / s:position!() kw("break") e:position!() {
                Statement::Break(ctx.span(s, e))
            }
            / s:position!() kw("continue") e:position!() {
                Statement::Continue(ctx.span(s, e))
            }
            / s:position!() kw("fallthrough") e:position!() {
                Statement::Fallthrough(ctx.span(s, e))
            }
            / s:position!() kw("defer") __ expr:defer_target() e:position!() {
                Statement::Defer { expr, span: ctx.span(s, e) }
            }
            / s:position!() kw("go") __ expr:expr() e:position!() {
                Statement::Go { expr, span: ctx.span(s, e) }
            }
            / s:position!() kw("include") __ path:string_text() e:position!() {
                Statement::Include { path, span: ctx.span(s, e) }
            }
            / s:position!() kw("assert") __ cond:expr() message:(comma() m:expr() { m })?
              e:position!() {
                Statement::Assert { cond, message, span: ctx.span(s, e) }
            }
            / declaration()
            / simple_stmt()
            / block:code_block() {
                Statement::Block(block)
            }

        rule simple_stmt() -> Statement
            = assignment()
            / s:position!() chan:expr() __ "<-" _ value:expr() e:position!() {
                Statement::Send { chan, value, span: ctx.span(s, e) }
            }
            / expr:expr() {
                Statement::Expr(expr)
            }

        rule defer_target() -> Expr
            = block:code_block() {
                let span = block.span.clone();
                Expr::new(ExprKind::InstanceCode(block), span)
            }
            / expr()

        rule return_stmt() -> Statement
            = s:position!() kw("return") values:(__ vs:(expr() ++ comma()) { vs })? e:position!() {
                Statement::Return { values: values.unwrap_or_default(), span: ctx.span(s, e) }
            }

        rule declaration() -> Statement
            = s:position!() kw("var") __ names:(ident() ++ comma())
              values:(__ "=" !"=" _ vs:(expr() ++ comma()) { vs })? e:position!() {
                Statement::Declare(Declaration {
                    names,
                    values: values.unwrap_or_default(),
                    span: ctx.span(s, e),
                })
            }

        rule assignment() -> Statement
            = s:position!() targets:(left_value() ++ comma()) __ force:assign_op() _
              values:(expr() ++ comma()) e:position!() {
                Statement::Assign(Assignment {
                    kind: AssignKind::Assign { targets, values, force },
                    span: ctx.span(s, e),
                })
            }
            / s:position!() target:left_value() __ op:compound_op() _ value:expr() e:position!() {
                Statement::Assign(Assignment {
                    kind: AssignKind::Compound { target, op, value },
                    span: ctx.span(s, e),
                })
            }
            / s:position!() target:left_value() __ increment:step_op() e:position!() {
                Statement::Assign(Assignment {
                    kind: AssignKind::Step { target, increment },
                    span: ctx.span(s, e),
                })
            }

        rule assign_op() -> bool
            = ":=" { true }
            / "=" !"=" { false }

        rule step_op() -> bool
            = "++" { true }
            / "--" { false }

        rule compound_op() -> BinaryOp
            = "+=" { BinaryOp::Add }
            / "-=" { BinaryOp::Sub }
            / "*=" { BinaryOp::Mul }
            / "/=" { BinaryOp::Div }
            / "%=" { BinaryOp::Mod }
            / "&^=" { BinaryOp::AndNot }
            / "&=" { BinaryOp::BitAnd }
            / "|=" { BinaryOp::BitOr }
            / "^=" { BinaryOp::BitXor }
            / "<<=" { BinaryOp::Shl }
            / ">>=" { BinaryOp::Shr }

        rule left_value() -> LeftValue
            = expr:postfix() {?
                to_left_value(expr)
            }

        #[cache]
        rule code_block() -> CodeBlock
            = s:position!() "{" statements:statements() "}" e:position!() {
                CodeBlock { statements, span: ctx.span(s, e) }
            }

        rule if_stmt() -> Statement
            = s:position!() first:if_branch("if")
              rest:(_ b:(if_branch("elif") / else_if_branch()) { b })*
              else_block:(_ kw("else") _ b:code_block() { b })? e:position!() {
                let mut branches = vec![first];
                branches.extend(rest);
                Statement::If(IfStatement { branches, else_block, span: ctx.span(s, e) })
            }

        rule if_branch(keyword: &'static str) -> IfBranch
            = s:position!() kw(keyword) _ condition:expr() _ body:code_block() e:position!() {
                IfBranch { condition: Some(condition), body, span: ctx.span(s, e) }
            }

        rule else_if_branch() -> IfBranch
            = s:position!() kw("else") _ branch:if_branch("if") e:position!() {
                IfBranch { span: ctx.span(s, e), ..branch }
            }

        rule for_stmt() -> Statement
            = s:position!() kw("for") __ key:ident() value:(comma() v:ident() { v })? __ kw("in") _
              iterable:expr() _ body:code_block() e:position!() {
                Statement::ForRange(ForRangeStatement {
                    key: Some(key),
                    value,
                    declare: true,
                    iterable,
                    body,
                    span: ctx.span(s, e),
                })
            }
            / s:position!() kw("for") __ key:ident() value:(comma() v:ident() { v })? __
              declare:assign_op() _ kw("range") _ iterable:expr() _ body:code_block()
              e:position!() {
                Statement::ForRange(ForRangeStatement {
                    key: Some(key),
                    value,
                    declare,
                    iterable,
                    body,
                    span: ctx.span(s, e),
                })
            }
            / s:position!() kw("for") __ kw("range") _ iterable:expr() _ body:code_block()
              e:position!() {
                Statement::ForRange(ForRangeStatement {
                    key: None,
                    value: None,
                    declare: true,
                    iterable,
                    body,
                    span: ctx.span(s, e),
                })
            }
            / s:position!() kw("for") __ init:simple_stmt()? __ ";" _ condition:expr()? _ ";" _
              step:simple_stmt()? _ body:code_block() e:position!() {
                Statement::For(ForStatement {
                    init: init.map(Box::new),
                    condition,
                    step: step.map(Box::new),
                    body,
                    span: ctx.span(s, e),
                })
            }
            / s:position!() kw("for") _ body:code_block() e:position!() {
                Statement::For(ForStatement {
                    init: None,
                    condition: None,
                    step: None,
                    body,
                    span: ctx.span(s, e),
                })
            }
            / s:position!() kw("for") __ condition:expr() _ body:code_block() e:position!() {
                Statement::For(ForStatement {
                    init: None,
                    condition: Some(condition),
                    step: None,
                    body,
                    span: ctx.span(s, e),
                })
            }

        rule switch_stmt() -> Statement
            = s:position!() kw("switch") __ subject:expr()? _ "{"
              items:(_ i:switch_item() { i })* _ "}"
              e:position!() {
                let mut cases = Vec::new();
                let mut default = None;
                for item in items {
                    match item {
                        SwitchItem::Case(case) => cases.push(case),
                        SwitchItem::Default(block) => default = Some(block),
                    }
                }
                Statement::Switch(SwitchStatement { subject, cases, default, span: ctx.span(s, e) })
            }

        rule switch_item() -> SwitchItem
            = s:position!() kw("case") _ labels:(expr() ++ comma()) __ ":" bs:position!()
              statements:statements() e:position!() {
                SwitchItem::Case(SwitchCase {
                    labels,
                    body: CodeBlock { statements, span: ctx.span(bs, e) },
                    span: ctx.span(s, e),
                })
            }
            / kw("default") __ ":" bs:position!() statements:statements() e:position!() {
                SwitchItem::Default(CodeBlock { statements, span: ctx.span(bs, e) })
            }

        rule try_stmt() -> Statement
            = s:position!() kw("try") _ body:code_block() _ kw("catch") __ catch_ident:ident()? _
              catch_body:code_block() finally_body:(_ kw("finally") _ b:code_block() { b })?
              e:position!() {
                Statement::Try(TryStatement {
                    body,
                    catch_ident,
                    catch_body,
                    finally_body,
                    span: ctx.span(s, e),
                })
            }

        // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
        // Expressions

        pub(crate) rule expr() -> Expr = precedence!{
            cond:@ __ "?" _ then:expr() _ ":" _ otherwise:(@) { ternary(cond, then, otherwise) }
            --
            x:(@) __ "||" _ y:@ { binary(BinaryOp::LogicalOr, x, y) }
            --
            x:(@) __ "&&" _ y:@ { binary(BinaryOp::LogicalAnd, x, y) }
            --
            x:(@) __ "==" _ y:@ { binary(BinaryOp::Eq, x, y) }
            x:(@) __ "!=" _ y:@ { binary(BinaryOp::Ne, x, y) }
            x:(@) __ "<=" _ y:@ { binary(BinaryOp::Le, x, y) }
            x:(@) __ ">=" _ y:@ { binary(BinaryOp::Ge, x, y) }
            x:(@) __ "<" !['<' | '-' | '='] _ y:@ { binary(BinaryOp::Lt, x, y) }
            x:(@) __ ">" !['>' | '='] _ y:@ { binary(BinaryOp::Gt, x, y) }
            x:(@) __ kw("in") _ y:@ { binary(BinaryOp::In, x, y) }
            x:(@) __ "not" ___ kw("in") _ y:@ { not_in(x, y) }
            --
            x:(@) __ "+" !['+' | '='] _ y:@ { binary(BinaryOp::Add, x, y) }
            x:(@) __ "-" !['-' | '='] _ y:@ { binary(BinaryOp::Sub, x, y) }
            x:(@) __ "|" !['|' | '='] _ y:@ { binary(BinaryOp::BitOr, x, y) }
            x:(@) __ "^" !['='] _ y:@ { binary(BinaryOp::BitXor, x, y) }
            --
            x:(@) __ "*" !['='] _ y:@ { binary(BinaryOp::Mul, x, y) }
            x:(@) __ "/" !['=' | '/' | '*'] _ y:@ { binary(BinaryOp::Div, x, y) }
            x:(@) __ "%" !['='] _ y:@ { binary(BinaryOp::Mod, x, y) }
            x:(@) __ "<<" !['='] _ y:@ { binary(BinaryOp::Shl, x, y) }
            x:(@) __ ">>" !['='] _ y:@ { binary(BinaryOp::Shr, x, y) }
            x:(@) __ "&^" !['='] _ y:@ { binary(BinaryOp::AndNot, x, y) }
            x:(@) __ "&" !['&' | '=' | '^'] _ y:@ { binary(BinaryOp::BitAnd, x, y) }
            --
            s:position!() "!" _ x:@ { unary(ctx, s, UnaryOp::Not, x) }
            s:position!() "-" !['-'] _ x:@ { unary(ctx, s, UnaryOp::Neg, x) }
            s:position!() "+" !['+'] _ x:@ { unary(ctx, s, UnaryOp::Plus, x) }
            s:position!() "^" _ x:@ { unary(ctx, s, UnaryOp::BitNot, x) }
            --
            x:postfix() { x }
        }

        #[cache]
        rule postfix() -> Expr
            = s:position!() base:primary() ops:postfix_op()* {
                ops.into_iter().fold(base, |target, op| apply_postfix(ctx, s, target, op))
            }

        rule postfix_op() -> PostfixOp
            = __ "(" _ args:(expr() ** comma()) ellipsis:(__ "...")? (comma())? _ ")"
              drop_error:(__ "~")? e:position!() {
                PostfixOp::Call {
                    args,
                    ellipsis: ellipsis.is_some(),
                    drop_error: drop_error.is_some(),
                    end: e,
                }
            }
            / __ "." !"." __ "$" key:primary() e:position!() {
                PostfixOp::Member { member: MemberKey::Dynamic(Box::new(key)), end: e }
            }
            / __ "." !"." __ name:member_name() e:position!() {
                PostfixOp::Member { member: MemberKey::Name(name), end: e }
            }
            / __ "[" _ index:expr() _ "]" e:position!() {
                PostfixOp::Index { index, end: e }
            }
            / __ "[" _ low:expr()? _ ":" _ high:expr()? max:(_ ":" _ m:expr()? { m })? _ "]"
              e:position!() {
                PostfixOp::Slice { low, high, max: max.flatten(), end: e }
            }

        rule primary() -> Expr
            = literal()
            / s:position!() kw("panic") _ "(" _ value:expr() _ ")" e:position!() {
                Expr::new(ExprKind::Panic(Box::new(value)), ctx.span(s, e))
            }
            / s:position!() kw("recover") _ "(" _ ")" e:position!() {
                Expr::new(ExprKind::Recover, ctx.span(s, e))
            }
            / s:position!() kw("fn") _ block:code_block() e:position!() {
                Expr::new(ExprKind::InstanceCode(block), ctx.span(s, e))
            }
            / function_literal()
            / arrow_function()
            / make_expr()
            / s:position!() "[" "]" elem_ty:type_expr() _ "{" _ elems:(expr() ** comma()) (comma())?
              _ "}" e:position!() {
                Expr::new(ExprKind::SliceLiteral { elem_ty: Some(elem_ty), elems }, ctx.span(s, e))
            }
            / s:position!() "map" __ "[" _ key_ty:type_expr() _ "]" value_ty:type_expr() _ "{" _
              pairs:(map_pair() ** comma()) (comma())? _ "}" e:position!() {
                let ty = Some((key_ty, value_ty));
                Expr::new(ExprKind::MapLiteral { ty, pairs }, ctx.span(s, e))
            }
            / s:position!() "[" _ elems:(expr() ** comma()) (comma())? _ "]" e:position!() {
                Expr::new(ExprKind::SliceLiteral { elem_ty: None, elems }, ctx.span(s, e))
            }
            / s:position!() "{" _ pairs:(map_pair() ** comma()) (comma())? _ "}" e:position!() {
                Expr::new(ExprKind::MapLiteral { ty: None, pairs }, ctx.span(s, e))
            }
            / ident:ident() {
                let span = ident.span();
                Expr::new(ExprKind::Ident(ident), span)
            }
            / s:position!() "(" _ inner:expr() _ ")" e:position!() {
                Expr { span: ctx.span(s, e), ..inner }
            }

        rule map_pair() -> (Expr, Expr)
            = key:expr() _ ":" _ value:expr() {
                (key, value)
            }

        rule function_literal() -> Expr
            = s:position!() (kw("func") / kw("fn") / kw("def")) __ name:ident()? __ "(" _
              params:(ident() ** comma()) variadic:(__ "...")? _ ")" _ block:code_block()
              e:position!() {
                Expr::new(
                    ExprKind::Function(FunctionLiteral {
                        name,
                        params,
                        variadic: variadic.is_some(),
                        body: FunctionBody::Block(block),
                    }),
                    ctx.span(s, e),
                )
            }

        rule arrow_function() -> Expr
            = s:position!() "(" _ params:(ident() ** comma()) variadic:(__ "...")? _ ")" _ "=>" _
              body:arrow_body() e:position!() {
                Expr::new(
                    ExprKind::Function(FunctionLiteral {
                        name: None,
                        params,
                        variadic: variadic.is_some(),
                        body,
                    }),
                    ctx.span(s, e),
                )
            }
            / s:position!() param:ident() _ "=>" _ body:arrow_body() e:position!() {
                Expr::new(
                    ExprKind::Function(FunctionLiteral {
                        name: None,
                        params: vec![param],
                        variadic: false,
                        body,
                    }),
                    ctx.span(s, e),
                )
            }

        rule arrow_body() -> FunctionBody
            = block:code_block() {
                FunctionBody::Block(block)
            }
            / expr:expr() {
                FunctionBody::Expr(Box::new(expr))
            }

        rule make_expr() -> Expr
            = s:position!() "make" __ "(" _ ty:type_expr() args:(comma() a:expr() { a })*
              (comma())? _ ")"
              e:position!() {
                Expr::new(ExprKind::Make { ty, args }, ctx.span(s, e))
            }

        rule type_expr() -> TypeExpr
            = "[" _ "]" _ elem:type_expr() {
                TypeExpr::Slice(Box::new(elem))
            }
            / "map" __ "[" _ key:type_expr() _ "]" _ value:type_expr() {
                TypeExpr::Map(Box::new(key), Box::new(value))
            }
            / "chan" ___ elem:type_expr() {
                TypeExpr::Chan(Box::new(elem))
            }
            / name:ident() {
                TypeExpr::Named(name)
            }
            / s:position!() kw("var") e:position!() {
                TypeExpr::Named(Ident::new(ctx.span(s, e)))
            }

        // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
        // Literals

        rule literal() -> Expr
            = s:position!() lit:literal_value() e:position!() {
                Expr::new(ExprKind::Literal(lit), ctx.span(s, e))
            }

        rule literal_value() -> Literal
            = kw("true") { Literal::Bool(true) }
            / kw("false") { Literal::Bool(false) }
            / (kw("nil") / kw("undefined")) { Literal::Null }
            / n:$(['0'..='9']+ "." ['0'..='9']+ (['e' | 'E'] ['+' | '-']? ['0'..='9']+)?) {?
                n.parse::<f64>().map(Literal::Float).or(Err("float literal"))
            }
            / n:$("0" ['x' | 'X' | 'b' | 'B' | 'o' | 'O']
                  ['0'..='9' | 'a'..='f' | 'A'..='F' | '_']+) {?
                parse_int(n).map(Literal::Int).ok_or("integer literal")
            }
            / n:$(['0'..='9'] ['0'..='9' | '_']*) !id_char() {?
                parse_int(n).map(Literal::Int).ok_or("integer literal")
            }
            / "b" text:string_text() {
                Literal::Bytes(text.into_bytes())
            }
            / text:string_text() {
                Literal::String(text)
            }

        rule string_text() -> String
            = "\"" raw:$(("\\" [_] / !['"' | '\\' | '\n'] [_])*) "\"" {?
                unescape(raw).ok_or("string escape")
            }
            / "'" raw:$(("\\" [_] / !['\'' | '\\' | '\n'] [_])*) "'" {?
                unescape(raw).ok_or("string escape")
            }
            / "`" raw:$((!['`'] [_])*) "`" {
                raw.to_string()
            }

        // - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
        // Lexical

        rule ident() -> Ident
            = quiet!{ s:position!() !keyword() id_char0() id_char()* e:position!() {
                Ident::new(ctx.span(s, e))
            } }
            / expected!("identifier")

        // Member names may be keywords, as in `x.default`.
        rule member_name() -> Ident
            = s:position!() id_char0() id_char()* e:position!() {
                Ident::new(ctx.span(s, e))
            }

        rule keyword()
            = ("if" / "elif" / "else" / "for" / "in" / "range" / "switch" / "case" / "default"
              / "fallthrough" / "try" / "catch" / "finally" / "return" / "break" / "continue"
              / "defer" / "go" / "include" / "var" / "func" / "fn" / "def" / "true" / "false"
              / "nil" / "undefined" / "assert" / "panic" / "recover") !id_char()

        rule kw(word: &'static str)
            = ##parse_string_literal(word) !id_char()

        rule id_char0()
            = quiet!{ ['A'..='Z' | 'a'..='z' | '_'] }

        rule id_char()
            = quiet!{ id_char0() / ['0'..='9'] }

        rule comma()
            = quiet!{ __ "," _ }

        rule _()
            = quiet!{ (space() / nl() / comment())* }

        rule __()
            = quiet!{ (space() / block_comment())* }

        rule ___()
            = quiet!{ (space() / nl())+ }

        rule space()
            = [' ' | '\t']

        rule nl()
            = ['\n' | '\r']

        rule comment()
            = ("//" / "#") (!nl() [_])*
            / block_comment()

        rule block_comment()
            = "/*" (!"*/" [_])* "*/"

        rule eoi()
            = ![_] / expected!("end of input")
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = Span::join(lhs.span.clone(), &rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn ternary(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    let span = Span::join(cond.span.clone(), &otherwise.span);
    Expr::new(
        ExprKind::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        span,
    )
}

/// `x not in y` reads as `!(x in y)`.
fn not_in(lhs: Expr, rhs: Expr) -> Expr {
    let membership = binary(BinaryOp::In, lhs, rhs);
    let span = membership.span.clone();
    Expr::new(
        ExprKind::Unary {
            op: UnaryOp::Not,
            expr: Box::new(membership),
        },
        span,
    )
}

fn unary(ctx: &SpanCtx, start: usize, op: UnaryOp, expr: Expr) -> Expr {
    let span = ctx.span(start, expr.span.end());
    Expr::new(
        ExprKind::Unary {
            op,
            expr: Box::new(expr),
        },
        span,
    )
}

fn apply_postfix(ctx: &SpanCtx, start: usize, target: Expr, op: PostfixOp) -> Expr {
    match op {
        PostfixOp::Call {
            args,
            ellipsis,
            drop_error,
            end,
        } => Expr::new(
            ExprKind::Call(CallExpr {
                callee: Box::new(target),
                args,
                ellipsis,
                drop_error,
            }),
            ctx.span(start, end),
        ),
        PostfixOp::Member { member, end } => Expr::new(
            ExprKind::Member {
                target: Box::new(target),
                member,
            },
            ctx.span(start, end),
        ),
        PostfixOp::Index { index, end } => Expr::new(
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
            ctx.span(start, end),
        ),
        PostfixOp::Slice {
            low,
            high,
            max,
            end,
        } => Expr::new(
            ExprKind::Slice {
                target: Box::new(target),
                low: low.map(Box::new),
                high: high.map(Box::new),
                max: max.map(Box::new),
            },
            ctx.span(start, end),
        ),
    }
}

fn to_left_value(expr: Expr) -> Result<LeftValue, &'static str> {
    let span = expr.span;
    match expr.kind {
        ExprKind::Ident(ident) => Ok(LeftValue::Ident(ident)),
        ExprKind::Member { target, member } => Ok(LeftValue::Member {
            target,
            member,
            span,
        }),
        ExprKind::Index { target, index } => Ok(LeftValue::Index {
            target,
            index,
            span,
        }),
        _ => Err("assignable expression"),
    }
}

//! Lowering of structured control flow.
//!
//! Each construct has a small builder which is given callbacks for its condition and bodies.  The
//! builder owns the block layout: it creates the blocks, invokes each callback with the right
//! block current, wires the edges and seals every block once its predecessors are final, which is
//! what places the phis at the merge points.

use ember_ast::{
    BinaryOp, CodeBlock, Expr, ExprKind, ForRangeStatement, ForStatement, IfStatement, Statement,
    SwitchStatement, TryStatement,
};
use ember_error::warning::{BranchKind, CompileWarning, Warning};
use ember_ir::{
    analysis::{NEXT_FIELD, NEXT_KEY, NEXT_OK},
    Block, Constant, Context, Instruction, UnaryOpKind, Value,
};
use ember_types::{Ident, Span};

use super::function::{IrBuilder, JumpTarget};

type CondFn<'a, 'eng> = Box<dyn FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Option<Value> + 'a>;
type BodyFn<'a, 'eng> = Box<dyn FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a>;
type LabelsFn<'a, 'eng> = Box<dyn FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Vec<Value> + 'a>;
type CatchFn<'a, 'eng> = Box<dyn FnOnce(&mut IrBuilder<'eng>, &mut Context, Value) + 'a>;

/// A condition standing in for a missing one.  It has no span, so it is not reported as a
/// constant condition.
fn placeholder_true(context: &mut Context) -> Value {
    let constant = Constant::new_bool(context, true);
    Value::new_constant(context, constant, None)
}

fn const_string(context: &mut Context, value: &str) -> Value {
    let constant = Constant::new_string(context, value.to_owned());
    Value::new_constant(context, constant, None)
}

struct IfArm<'a, 'eng> {
    span: Span,
    cond: CondFn<'a, 'eng>,
    body: BodyFn<'a, 'eng>,
}

/// `if` with any number of `else if` arms and an optional `else`.
pub(super) struct IfBuilder<'a, 'eng> {
    arms: Vec<IfArm<'a, 'eng>>,
    otherwise: Option<BodyFn<'a, 'eng>>,
}

impl<'a, 'eng> IfBuilder<'a, 'eng> {
    pub(super) fn new() -> Self {
        IfBuilder {
            arms: Vec::new(),
            otherwise: None,
        }
    }

    /// Add an arm.  A `cond` returning `None` is a missing condition.
    pub(super) fn arm(
        mut self,
        span: Span,
        cond: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Option<Value> + 'a,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.arms.push(IfArm {
            span,
            cond: Box::new(cond),
            body: Box::new(body),
        });
        self
    }

    pub(super) fn otherwise(
        mut self,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.otherwise = Some(Box::new(body));
        self
    }

    pub(super) fn build(self, builder: &mut IrBuilder<'eng>, context: &mut Context) {
        let function = builder.function();
        let mut open_ends = Vec::new();
        for arm in self.arms {
            let cond = match (arm.cond)(builder, context) {
                Some(cond) => cond,
                None => {
                    builder.handler.emit_warn(CompileWarning {
                        span: arm.span.clone(),
                        warning_content: Warning::MissingCondition {
                            construct: BranchKind::If,
                        },
                    });
                    placeholder_true(context)
                }
            };
            let true_block = function.create_block(context, Some("if.true".to_owned()));
            let false_block = function.create_block(context, Some("if.false".to_owned()));
            builder
                .current_block()
                .append(context)
                .with_span(Some(arm.span))
                .branch_if(cond, true_block, false_block);

            builder.seal_block(context, true_block);
            builder.set_current_block(true_block);
            builder.compile_with_new_scope(context, arm.body);
            if !builder.is_terminated(context) {
                open_ends.push(builder.current_block());
            }

            // The next arm's condition, or the else body, goes here.
            builder.seal_block(context, false_block);
            builder.set_current_block(false_block);
        }
        if let Some(otherwise) = self.otherwise {
            builder.compile_with_new_scope(context, otherwise);
        }
        if !builder.is_terminated(context) {
            open_ends.push(builder.current_block());
        }

        // Every arm returned or jumped away, so nothing follows.
        if open_ends.is_empty() {
            return;
        }
        let done = function.create_block(context, Some("if.done".to_owned()));
        for end in open_ends {
            end.append(context).jump(done);
        }
        builder.seal_block(context, done);
        builder.set_current_block(done);
    }
}

/// Every loop form: a header testing the condition, the body, a latch running the step and
/// jumping back, and the exit.
pub(super) struct LoopBuilder<'a, 'eng> {
    span: Span,
    init: Option<BodyFn<'a, 'eng>>,
    cond: Option<CondFn<'a, 'eng>>,
    body: Option<BodyFn<'a, 'eng>>,
    step: Option<BodyFn<'a, 'eng>>,
}

impl<'a, 'eng> LoopBuilder<'a, 'eng> {
    pub(super) fn new(span: Span) -> Self {
        LoopBuilder {
            span,
            init: None,
            cond: None,
            body: None,
            step: None,
        }
    }

    pub(super) fn init(
        mut self,
        init: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.init = Some(Box::new(init));
        self
    }

    /// The condition is built in the header.  Without one, or when it returns `None`, the loop
    /// only ends through `break` or `return`.
    pub(super) fn cond(
        mut self,
        cond: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Option<Value> + 'a,
    ) -> Self {
        self.cond = Some(Box::new(cond));
        self
    }

    pub(super) fn body(
        mut self,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub(super) fn step(
        mut self,
        step: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.step = Some(Box::new(step));
        self
    }

    pub(super) fn build(self, builder: &mut IrBuilder<'eng>, context: &mut Context) {
        let LoopBuilder {
            span,
            init,
            cond,
            body,
            step,
        } = self;
        builder.compile_with_new_scope(context, move |builder, context| {
            if let Some(init) = init {
                init(builder, context);
            }
            let function = builder.function();
            let enter = builder.current_block();
            let header = function.create_block(context, Some("loop.header".to_owned()));
            enter.append(context).jump(header);

            builder.set_current_block(header);
            let cond = cond
                .and_then(|cond| cond(builder, context))
                .unwrap_or_else(|| placeholder_true(context));
            let body_block = function.create_block(context, Some("loop.body".to_owned()));
            let latch = function.create_block(context, Some("loop.latch".to_owned()));
            let exit = function.create_block(context, Some("loop.exit".to_owned()));
            let branch = builder
                .current_block()
                .append(context)
                .with_span(Some(span))
                .loop_branch(cond, body_block, exit, latch);

            builder.seal_block(context, body_block);
            builder.set_current_block(body_block);
            builder.push_jump_target(JumpTarget::Loop {
                break_to: exit,
                continue_to: latch,
            });
            if let Some(body) = body {
                builder.compile_with_new_scope(context, body);
            }
            builder.pop_jump_target();
            if !builder.is_terminated(context) {
                builder.current_block().append(context).jump(latch);
            }

            builder.seal_block(context, latch);
            builder.set_current_block(latch);
            if let Some(step) = step {
                step(builder, context);
            }
            if !builder.is_terminated(context) {
                builder.current_block().append(context).jump(header);
            }

            builder.seal_block(context, header);
            record_loop_key(context, branch, header, enter);
            builder.seal_block(context, exit);
            builder.set_current_block(exit);
        })
    }
}

/// When the condition compares a header phi, remember the phi and its value on loop entry.
fn record_loop_key(context: &mut Context, branch: Value, header: Block, enter: Block) {
    let Some(Instruction::Loop { cond, .. }) = branch.get_instruction(context) else {
        return;
    };
    let (arg1, arg2) = match cond.get_instruction(context) {
        Some(Instruction::BinaryOp { op, arg1, arg2 }) if op.is_comparison() => (*arg1, *arg2),
        _ => return,
    };
    let phis = header.phi_iter(context).collect::<Vec<_>>();
    let Some(key) = [arg1, arg2].into_iter().find(|arg| phis.contains(arg)) else {
        return;
    };
    let Some(enter_idx) = header.pred_iter(context).position(|pred| *pred == enter) else {
        return;
    };
    let init_val = match key.get_instruction(context) {
        Some(Instruction::Phi { edges, .. }) => edges.get(enter_idx).copied(),
        _ => None,
    };
    if let Some(Instruction::Loop { key: loop_key, init, .. }) = branch.get_instruction_mut(context)
    {
        *loop_key = Some(key);
        *init = init_val;
    }
}

struct SwitchArm<'a, 'eng> {
    labels: LabelsFn<'a, 'eng>,
    body: BodyFn<'a, 'eng>,
    falls_through: bool,
}

/// `switch`: the labels of every case are evaluated up front, then each case body runs in its
/// own block.  Unmatched values go to the default block.
pub(super) struct SwitchBuilder<'a, 'eng> {
    span: Span,
    subject: Option<CondFn<'a, 'eng>>,
    arms: Vec<SwitchArm<'a, 'eng>>,
    default: Option<BodyFn<'a, 'eng>>,
}

impl<'a, 'eng> SwitchBuilder<'a, 'eng> {
    pub(super) fn new(span: Span) -> Self {
        SwitchBuilder {
            span,
            subject: None,
            arms: Vec::new(),
            default: None,
        }
    }

    pub(super) fn subject(
        mut self,
        subject: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Option<Value> + 'a,
    ) -> Self {
        self.subject = Some(Box::new(subject));
        self
    }

    /// Add a case.  With `falls_through` an open end of the body continues into the next case.
    pub(super) fn case(
        mut self,
        labels: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) -> Vec<Value> + 'a,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
        falls_through: bool,
    ) -> Self {
        self.arms.push(SwitchArm {
            labels: Box::new(labels),
            body: Box::new(body),
            falls_through,
        });
        self
    }

    pub(super) fn default(
        mut self,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.default = Some(Box::new(body));
        self
    }

    pub(super) fn build(self, builder: &mut IrBuilder<'eng>, context: &mut Context) {
        let function = builder.function();
        let subject = self
            .subject
            .and_then(|subject| subject(builder, context));

        let mut case_blocks = Vec::with_capacity(self.arms.len());
        let mut labels = Vec::new();
        let mut bodies = Vec::with_capacity(self.arms.len());
        for arm in self.arms {
            let block = function.create_block(context, Some("switch.case".to_owned()));
            for label in (arm.labels)(builder, context) {
                labels.push((label, block));
            }
            case_blocks.push(block);
            bodies.push((arm.body, arm.falls_through));
        }
        let default_block = function.create_block(context, Some("switch.default".to_owned()));
        let done = function.create_block(context, Some("switch.done".to_owned()));
        builder
            .current_block()
            .append(context)
            .with_span(Some(self.span))
            .switch(subject, default_block, labels);

        builder.push_jump_target(JumpTarget::Switch { break_to: done });
        for (idx, (body, falls_through)) in bodies.into_iter().enumerate() {
            // Sealed only now, as the previous case may fall through into it.
            let block = case_blocks[idx];
            builder.seal_block(context, block);
            builder.set_current_block(block);
            builder.compile_with_new_scope(context, body);
            if !builder.is_terminated(context) {
                let next = if falls_through {
                    case_blocks.get(idx + 1).copied().unwrap_or(default_block)
                } else {
                    done
                };
                builder.current_block().append(context).jump(next);
            }
        }
        builder.seal_block(context, default_block);
        builder.set_current_block(default_block);
        if let Some(default) = self.default {
            builder.compile_with_new_scope(context, default);
        }
        if !builder.is_terminated(context) {
            builder.current_block().append(context).jump(done);
        }
        builder.pop_jump_target();

        if done.num_predecessors(context) == 0 {
            function.remove_block(context, done);
            return;
        }
        builder.seal_block(context, done);
        builder.set_current_block(done);
    }
}

/// `try`/`catch` with an optional `finally`.
pub(super) struct TryBuilder<'a, 'eng> {
    span: Span,
    body: BodyFn<'a, 'eng>,
    catch: CatchFn<'a, 'eng>,
    finally: Option<BodyFn<'a, 'eng>>,
}

impl<'a, 'eng> TryBuilder<'a, 'eng> {
    /// `catch` is given the caught error.
    pub(super) fn new(
        span: Span,
        body: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
        catch: impl FnOnce(&mut IrBuilder<'eng>, &mut Context, Value) + 'a,
    ) -> Self {
        TryBuilder {
            span,
            body: Box::new(body),
            catch: Box::new(catch),
            finally: None,
        }
    }

    pub(super) fn finally(
        mut self,
        finally: impl FnOnce(&mut IrBuilder<'eng>, &mut Context) + 'a,
    ) -> Self {
        self.finally = Some(Box::new(finally));
        self
    }

    pub(super) fn build(self, builder: &mut IrBuilder<'eng>, context: &mut Context) {
        let function = builder.function();
        let try_block = function.create_block(context, Some("try.body".to_owned()));
        let catch_block = function.create_block(context, Some("try.catch".to_owned()));
        builder
            .current_block()
            .append(context)
            .with_span(Some(self.span.clone()))
            .error_handler(try_block, catch_block);

        let mut open_ends = Vec::new();
        builder.seal_block(context, try_block);
        builder.set_current_block(try_block);
        builder.compile_with_new_scope(context, self.body);
        if !builder.is_terminated(context) {
            open_ends.push(builder.current_block());
        }

        builder.seal_block(context, catch_block);
        builder.set_current_block(catch_block);
        let caught = catch_block
            .append(context)
            .with_span(Some(self.span))
            .error_catch(try_block);
        let catch = self.catch;
        builder.compile_with_new_scope(context, |builder, context| catch(builder, context, caught));
        if !builder.is_terminated(context) {
            open_ends.push(builder.current_block());
        }

        if open_ends.is_empty() {
            return;
        }
        if let Some(finally) = self.finally {
            let finally_block = function.create_block(context, Some("try.finally".to_owned()));
            for end in open_ends.drain(..) {
                end.append(context).jump(finally_block);
            }
            builder.seal_block(context, finally_block);
            builder.set_current_block(finally_block);
            builder.compile_with_new_scope(context, finally);
            if builder.is_terminated(context) {
                return;
            }
            open_ends.push(builder.current_block());
        }
        let done = function.create_block(context, Some("try.done".to_owned()));
        for end in open_ends {
            end.append(context).jump(done);
        }
        builder.seal_block(context, done);
        builder.set_current_block(done);
    }
}

fn present(expr: &Expr) -> bool {
    !matches!(expr.kind, ExprKind::Missing)
}

impl<'eng> IrBuilder<'eng> {
    pub(super) fn compile_if(&mut self, context: &mut Context, if_stmt: &IfStatement) {
        let mut if_builder = IfBuilder::new();
        for branch in &if_stmt.branches {
            if_builder = if_builder.arm(
                branch.span.clone(),
                move |builder, context| {
                    branch
                        .condition
                        .as_ref()
                        .filter(|cond| present(cond))
                        .map(|cond| builder.compile_expression(context, cond))
                },
                move |builder, context| {
                    builder.compile_statements(context, &branch.body.statements)
                },
            );
        }
        if let Some(else_block) = &if_stmt.else_block {
            if_builder = if_builder.otherwise(move |builder, context| {
                builder.compile_statements(context, &else_block.statements)
            });
        }
        if_builder.build(self, context);
    }

    /// `a && b` only evaluates `b` when `a` holds, `a || b` when it does not.  The result is a
    /// phi of whichever operand was evaluated last.
    pub(super) fn compile_short_circuit(
        &mut self,
        context: &mut Context,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: &Span,
    ) -> Value {
        let merged = self.frame().ssa.new_variable(op.as_str().to_owned(), false);
        IfBuilder::new()
            .arm(
                span.clone(),
                move |builder, context| {
                    let lhs_val = builder.compile_expression(context, lhs);
                    builder.frame().write(merged, lhs_val);
                    if op == BinaryOp::LogicalOr {
                        Some(
                            builder
                                .current_block()
                                .append(context)
                                .with_span(Some(lhs.span.clone()))
                                .unary_op(UnaryOpKind::Not, lhs_val),
                        )
                    } else {
                        Some(lhs_val)
                    }
                },
                move |builder, context| {
                    let rhs_val = builder.compile_expression(context, rhs);
                    builder.frame().write(merged, rhs_val);
                },
            )
            .build(self, context);
        self.frame().read(context, merged)
    }

    /// `cond ? then : otherwise`, merging the two arms in a phi.
    pub(super) fn compile_ternary(
        &mut self,
        context: &mut Context,
        cond: &Expr,
        then: &Expr,
        otherwise: &Expr,
        span: &Span,
    ) -> Value {
        let merged = self.frame().ssa.new_variable("?:".to_owned(), false);
        IfBuilder::new()
            .arm(
                span.clone(),
                move |builder, context| Some(builder.compile_expression(context, cond)),
                move |builder, context| {
                    let value = builder.compile_expression(context, then);
                    builder.frame().write(merged, value);
                },
            )
            .otherwise(move |builder, context| {
                let value = builder.compile_expression(context, otherwise);
                builder.frame().write(merged, value);
            })
            .build(self, context);
        self.frame().read(context, merged)
    }

    pub(super) fn compile_for(&mut self, context: &mut Context, for_stmt: &ForStatement) {
        let mut loop_builder = LoopBuilder::new(for_stmt.span.clone())
            .cond(move |builder, context| {
                for_stmt
                    .condition
                    .as_ref()
                    .filter(|cond| present(cond))
                    .map(|cond| builder.compile_expression(context, cond))
            })
            .body(move |builder, context| {
                builder.compile_statements(context, &for_stmt.body.statements)
            });
        if let Some(init) = &for_stmt.init {
            loop_builder = loop_builder.init(move |builder, context| {
                builder.compile_statements(context, std::slice::from_ref(&**init))
            });
        }
        if let Some(step) = &for_stmt.step {
            loop_builder = loop_builder.step(move |builder, context| {
                builder.compile_statements(context, std::slice::from_ref(&**step))
            });
        }
        loop_builder.build(self, context);
    }

    /// `for k, v in xs`: the header steps the iterator with `next` and loops while `ok`.
    pub(super) fn compile_for_range(
        &mut self,
        context: &mut Context,
        for_range: &ForRangeStatement,
    ) {
        let iterable = self.compile_expression(context, &for_range.iterable);
        let span = for_range.span.clone();
        LoopBuilder::new(for_range.span.clone())
            .cond(move |builder, context| {
                let next = builder
                    .current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .next(iterable);
                let bind = |builder: &mut IrBuilder<'eng>,
                            context: &mut Context,
                            ident: &Ident,
                            member: &str| {
                    let key = const_string(context, member);
                    let value = builder
                        .current_block()
                        .append(context)
                        .with_span(Some(span.clone()))
                        .field(next, key, false);
                    builder.assign_variable(context, ident, value, for_range.declare);
                };
                if let Some(key) = for_range.key.as_ref().filter(|key| !key.is_discard()) {
                    bind(builder, context, key, NEXT_KEY);
                }
                if let Some(value) = for_range.value.as_ref().filter(|value| !value.is_discard()) {
                    bind(builder, context, value, NEXT_FIELD);
                }
                let ok = const_string(context, NEXT_OK);
                Some(
                    builder
                        .current_block()
                        .append(context)
                        .with_span(Some(span.clone()))
                        .field(next, ok, false),
                )
            })
            .body(move |builder, context| {
                builder.compile_statements(context, &for_range.body.statements)
            })
            .build(self, context);
    }

    pub(super) fn compile_switch(&mut self, context: &mut Context, switch: &SwitchStatement) {
        let mut switch_builder = SwitchBuilder::new(switch.span.clone());
        if let Some(subject) = &switch.subject {
            switch_builder = switch_builder.subject(move |builder, context| {
                Some(builder.compile_expression(context, subject))
            });
        }
        for case in &switch.cases {
            let (statements, falls_through) = split_fallthrough(&case.body);
            switch_builder = switch_builder.case(
                move |builder, context| {
                    case.labels
                        .iter()
                        .map(|label| builder.compile_expression(context, label))
                        .collect()
                },
                move |builder, context| builder.compile_statements(context, statements),
                falls_through,
            );
        }
        if let Some(default) = &switch.default {
            switch_builder = switch_builder.default(move |builder, context| {
                builder.compile_statements(context, &default.statements)
            });
        }
        switch_builder.build(self, context);
    }

    pub(super) fn compile_try(&mut self, context: &mut Context, try_stmt: &TryStatement) {
        let mut try_builder = TryBuilder::new(
            try_stmt.span.clone(),
            move |builder, context| builder.compile_statements(context, &try_stmt.body.statements),
            move |builder, context, caught| {
                if let Some(ident) = &try_stmt.catch_ident {
                    builder.assign_variable(context, ident, caught, true);
                }
                builder.compile_statements(context, &try_stmt.catch_body.statements)
            },
        );
        if let Some(finally) = &try_stmt.finally_body {
            try_builder = try_builder.finally(move |builder, context| {
                builder.compile_statements(context, &finally.statements)
            });
        }
        try_builder.build(self, context);
    }
}

/// A case body without its trailing `fallthrough`, and whether it had one.
fn split_fallthrough(body: &CodeBlock) -> (&[Statement], bool) {
    match body.statements.split_last() {
        Some((Statement::Fallthrough(_), rest)) => (rest, true),
        _ => (&body.statements, false),
    }
}

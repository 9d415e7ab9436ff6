use ember_ast::{CodeBlock, Expr, ExprKind, Statement};
use ember_error::{error::CompileError, handler::Handler};
use ember_ir::{Block, Context, Function, Instruction, Package, Value};
use ember_types::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::externs::ResolvedExterns;

use super::{
    lexical_map::{LexicalMap, VarId},
    ssa::SsaState,
    IncludeResolver,
};

/// Where `break` and `continue` go from inside a construct.
#[derive(Clone, Copy, Debug)]
pub(super) enum JumpTarget {
    Loop { break_to: Block, continue_to: Block },
    Switch { break_to: Block },
}

/// The state of one function being built.
pub(super) struct FnCompiler {
    pub(super) function: Function,
    pub(super) current_block: Block,
    pub(super) lexical_map: LexicalMap,
    pub(super) ssa: SsaState,
    jump_targets: Vec<JumpTarget>,
}

impl FnCompiler {
    fn new(context: &mut Context, function: Function) -> Self {
        let entry = function.get_entry_block(context);
        let mut ssa = SsaState::default();
        ssa.seal(context, entry);
        FnCompiler {
            function,
            current_block: entry,
            lexical_map: LexicalMap::new(),
            ssa,
            jump_targets: Vec::new(),
        }
    }

    /// A new variable visible from the innermost scope on.
    pub(super) fn declare(&mut self, name: &str) -> VarId {
        let var = self.ssa.new_variable(name.to_owned(), false);
        self.lexical_map.insert(name.to_owned(), var);
        var
    }

    /// A new variable visible everywhere in the function.
    pub(super) fn declare_function_scope(&mut self, name: &str, captured: bool) -> VarId {
        let var = self.ssa.new_variable(name.to_owned(), captured);
        self.lexical_map.insert_function_scope(name.to_owned(), var);
        var
    }

    pub(super) fn read(&mut self, context: &mut Context, var: VarId) -> Value {
        self.ssa.read(context, var, self.current_block)
    }

    pub(super) fn write(&mut self, var: VarId, value: Value) {
        self.ssa.write(var, self.current_block, value);
    }
}

/// Builds the functions of one package.
///
/// Closures nest: building a function literal pushes a frame, and the frames below it are the
/// enclosing functions a read may capture from.
pub(crate) struct IrBuilder<'eng> {
    pub(super) handler: &'eng Handler,
    pub(super) package: Package,
    pub(super) externs: &'eng ResolvedExterns,
    includes: &'eng mut dyn IncludeResolver,
    pub(super) frames: Vec<FnCompiler>,
    pub(super) extern_values: FxHashMap<String, Value>,
    // Functions called from the code built so far.
    pub(super) called: FxHashSet<Function>,
    // Unbound free values already reported.
    pub(super) reported_unbound: FxHashSet<Value>,
}

impl<'eng> IrBuilder<'eng> {
    pub(super) fn new(
        handler: &'eng Handler,
        package: Package,
        externs: &'eng ResolvedExterns,
        includes: &'eng mut dyn IncludeResolver,
    ) -> Self {
        IrBuilder {
            handler,
            package,
            externs,
            includes,
            frames: Vec::new(),
            extern_values: FxHashMap::default(),
            called: FxHashSet::default(),
            reported_unbound: FxHashSet::default(),
        }
    }

    pub(super) fn frame(&mut self) -> &mut FnCompiler {
        self.frames
            .last_mut()
            .expect("the builder always has a function frame")
    }

    pub(super) fn function(&self) -> Function {
        self.frames
            .last()
            .expect("the builder always has a function frame")
            .function
    }

    pub(super) fn current_block(&self) -> Block {
        self.frames
            .last()
            .expect("the builder always has a function frame")
            .current_block
    }

    pub(super) fn set_current_block(&mut self, block: Block) {
        self.frame().current_block = block;
    }

    pub(super) fn is_terminated(&self, context: &Context) -> bool {
        self.current_block().is_terminated(context)
    }

    pub(super) fn seal_block(&mut self, context: &mut Context, block: Block) {
        self.frame().ssa.seal(context, block);
    }

    pub(super) fn push_jump_target(&mut self, target: JumpTarget) {
        self.frame().jump_targets.push(target);
    }

    pub(super) fn pop_jump_target(&mut self) {
        self.frame().jump_targets.pop();
    }

    pub(super) fn compile_with_new_scope<T>(
        &mut self,
        context: &mut Context,
        inner: impl FnOnce(&mut Self, &mut Context) -> T,
    ) -> T {
        self.frame().lexical_map.enter_scope();
        let result = inner(self, context);
        self.frame().lexical_map.leave_scope();
        result
    }

    pub(super) fn push_frame(&mut self, context: &mut Context, function: Function) {
        trace!(function = function.get_name(context), "building function");
        let frame = FnCompiler::new(context, function);
        self.frames.push(frame);
    }

    /// Close off the innermost function and pop its frame.
    pub(super) fn finish_function(&mut self, context: &mut Context) {
        let function = self.function();
        if !self.is_terminated(context) {
            self.current_block().append(context).ret(Vec::new());
        }
        for block in function.block_iter(context) {
            self.seal_block(context, block);
            if !block.is_terminated(context) {
                block.append(context).ret(Vec::new());
            }
        }

        // A closure which is never called cannot have its late-bound free values bound.
        let fn_span = function.get_span(context).unwrap_or_else(Span::dummy);
        for child in function.get_children(context) {
            if self.called.contains(&child) {
                continue;
            }
            for (name, free_value) in child.unbound_free_values(context) {
                if self.reported_unbound.insert(free_value) {
                    let span = free_value
                        .get_span(context)
                        .unwrap_or_else(|| fn_span.clone());
                    self.handler
                        .emit_err(CompileError::BindingNotFound { name, span });
                }
            }
        }

        self.frames.pop();
        trace!(
            function = function.get_name(context),
            blocks = function.num_blocks(context),
            "finished function"
        );
    }

    pub(super) fn compile_statements(&mut self, context: &mut Context, statements: &[Statement]) {
        for statement in statements {
            if self.is_terminated(context) {
                break;
            }
            self.compile_statement(context, statement);
        }
    }

    pub(super) fn compile_code_block(&mut self, context: &mut Context, block: &CodeBlock) {
        self.compile_with_new_scope(context, |builder, context| {
            builder.compile_statements(context, &block.statements)
        })
    }

    fn compile_statement(&mut self, context: &mut Context, statement: &Statement) {
        match statement {
            Statement::Expr(expr) => {
                self.compile_expression(context, expr);
            }
            Statement::Assign(assignment) => self.compile_assignment(context, assignment),
            Statement::Declare(declaration) => self.compile_declaration(context, declaration),
            Statement::Block(block) => self.compile_code_block(context, block),
            Statement::If(if_stmt) => self.compile_if(context, if_stmt),
            Statement::For(for_stmt) => self.compile_for(context, for_stmt),
            Statement::ForRange(for_range) => self.compile_for_range(context, for_range),
            Statement::Switch(switch) => self.compile_switch(context, switch),
            Statement::Try(try_stmt) => self.compile_try(context, try_stmt),
            Statement::Return { values, span } => {
                let mut ret_vals = Vec::with_capacity(values.len());
                for value in values {
                    ret_vals.push(self.compile_expression(context, value));
                }
                self.current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .ret(ret_vals);
            }
            Statement::Break(span) => self.compile_break(context, span),
            Statement::Continue(span) => self.compile_continue(context, span),
            Statement::Fallthrough(span) => {
                // A legal fallthrough is consumed by the switch it ends.
                self.handler
                    .emit_err(CompileError::MisplacedFallthrough { span: span.clone() });
            }
            Statement::Defer { expr, span } => self.compile_defer(context, expr, span),
            Statement::Go { expr, span } => self.compile_go(context, expr, span),
            Statement::Include { path, span } => {
                let Some(module) = self.includes.resolve(self.handler, path, span) else {
                    debug!(path, "include not built");
                    return;
                };
                self.compile_statements(context, &module.statements);
            }
            Statement::Assert {
                cond,
                message,
                span,
            } => {
                let cond = self.compile_expression(context, cond);
                let message = message
                    .as_ref()
                    .map(|message| self.compile_expression(context, message));
                self.current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .assert(cond, message);
            }
            Statement::Send { chan, value, span } => {
                let chan = self.compile_expression(context, chan);
                let value = self.compile_expression(context, value);
                self.current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .send(chan, value);
            }
        }
    }

    fn compile_break(&mut self, context: &mut Context, span: &Span) {
        let target = self.frame().jump_targets.last().map(|target| match target {
            JumpTarget::Loop { break_to, .. } | JumpTarget::Switch { break_to } => *break_to,
        });
        match target {
            Some(break_to) => {
                self.current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .jump(break_to);
            }
            None => {
                self.handler
                    .emit_err(CompileError::BreakOutsideLoop { span: span.clone() });
            }
        }
    }

    fn compile_continue(&mut self, context: &mut Context, span: &Span) {
        let target = self
            .frame()
            .jump_targets
            .iter()
            .rev()
            .find_map(|target| match target {
                JumpTarget::Loop { continue_to, .. } => Some(*continue_to),
                JumpTarget::Switch { .. } => None,
            });
        match target {
            Some(continue_to) => {
                self.current_block()
                    .append(context)
                    .with_span(Some(span.clone()))
                    .jump(continue_to);
            }
            None => {
                self.handler
                    .emit_err(CompileError::ContinueOutsideLoop { span: span.clone() });
            }
        }
    }

    /// `defer f(x)` evaluates `f` and `x` now and calls at function exit.
    fn compile_defer(&mut self, context: &mut Context, expr: &Expr, span: &Span) {
        let defer_block = self.defer_block(context);
        let callee = match &expr.kind {
            ExprKind::Call(call) => {
                self.compile_call_into(context, call, &expr.span, Some(defer_block));
                return;
            }
            ExprKind::InstanceCode(body) => self.compile_closure(context, body, &expr.span),
            _ => self.compile_expression(context, expr),
        };
        let call = defer_block
            .append(context)
            .with_span(Some(span.clone()))
            .call(callee, Vec::new());
        if let Some(function) = callee.get_function_ref(context) {
            self.bind_call(context, call, function, span);
        }
    }

    fn compile_go(&mut self, context: &mut Context, expr: &Expr, span: &Span) {
        let mut value = self.compile_expression(context, expr);
        if !matches!(value.get_instruction(context), Some(Instruction::Call { .. })) {
            value = self
                .current_block()
                .append(context)
                .with_span(Some(span.clone()))
                .call(value, Vec::new());
        }
        if let Some(Instruction::Call { is_async, .. }) = value.get_instruction_mut(context) {
            *is_async = true;
        }
    }

    fn defer_block(&mut self, context: &mut Context) -> Block {
        let function = self.function();
        let created = function.get_defer_block(context).is_none();
        let block = function.get_or_create_defer_block(context);
        if created {
            self.seal_block(context, block);
        }
        block
    }
}

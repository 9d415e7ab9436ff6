use ember_ast::{
    BinaryOp, CallExpr, CodeBlock, Expr, ExprKind, FunctionBody, FunctionLiteral, MemberKey,
    UnaryOp,
};
use ember_error::error::CompileError;
use ember_ir::{
    BinaryOpKind, Block, Constant, Context, Function, Instruction, UnaryOpKind, Value,
};
use ember_types::{FxIndexMap, Span, Spanned};

use super::function::IrBuilder;

impl<'eng> IrBuilder<'eng> {
    pub(super) fn compile_expression(&mut self, context: &mut Context, expr: &Expr) -> Value {
        let span = Some(expr.span.clone());
        match &expr.kind {
            ExprKind::Literal(literal) => self.compile_literal(context, literal, &expr.span),
            ExprKind::Ident(ident) => self.read_variable(context, ident.as_str(), &ident.span()),
            ExprKind::Unary { op, expr: arg } => {
                let arg = self.compile_expression(context, arg);
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .unary_op(convert_unary_op(*op), arg)
            }
            ExprKind::Binary { op, lhs, rhs }
                if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) =>
            {
                self.compile_short_circuit(context, *op, lhs, rhs, &expr.span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.compile_expression(context, lhs);
                let rhs = self.compile_expression(context, rhs);
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .binary_op(convert_binary_op(*op), lhs, rhs)
            }
            ExprKind::Member { target, member } => {
                let object = self.compile_expression(context, target);
                let key = self.compile_member_key(context, member);
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .field(object, key, false)
            }
            ExprKind::Index { target, index } => {
                let object = self.compile_expression(context, target);
                let key = self.compile_expression(context, index);
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .field(object, key, false)
            }
            ExprKind::Slice {
                target,
                low,
                high,
                max,
            } => {
                let object = self.compile_expression(context, target);
                let low = low.as_ref().map(|low| self.compile_expression(context, low));
                let high = high
                    .as_ref()
                    .map(|high| self.compile_expression(context, high));
                let max = max.as_ref().map(|max| self.compile_expression(context, max));
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .slice(object, low, high, max)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.compile_ternary(context, cond, then, otherwise, &expr.span),
            ExprKind::Panic(value) => {
                let value = self.compile_expression(context, value);
                self.current_block()
                    .append(context)
                    .with_span(span)
                    .panic(value)
            }
            ExprKind::Recover => self.current_block().append(context).with_span(span).recover(),
            ExprKind::Call(call) => self.compile_call_into(context, call, &expr.span, None),
            ExprKind::Function(literal) => {
                self.compile_function_literal(context, literal, &expr.span)
            }
            ExprKind::InstanceCode(body) => {
                let callee = self.compile_closure(context, body, &expr.span);
                let call = self
                    .current_block()
                    .append(context)
                    .with_span(span)
                    .call(callee, Vec::new());
                if let Some(function) = callee.get_function_ref(context) {
                    self.bind_call(context, call, function, &expr.span);
                    self.apply_side_effects(context, call, function);
                }
                call
            }
            ExprKind::Make { ty, args } => self.compile_make(context, ty, args, &expr.span),
            ExprKind::SliceLiteral { elem_ty, elems } => {
                self.compile_slice_literal(context, elem_ty.as_ref(), elems, &expr.span)
            }
            ExprKind::MapLiteral { ty, pairs } => {
                self.compile_map_literal(context, ty.as_ref(), pairs, &expr.span)
            }
            ExprKind::Missing => {
                let null = Constant::new_null(context);
                Value::new_constant(context, null, span)
            }
        }
    }

    pub(super) fn compile_member_key(
        &mut self,
        context: &mut Context,
        member: &MemberKey,
    ) -> Value {
        match member {
            MemberKey::Name(ident) => {
                let key = Constant::new_string(context, ident.as_str().to_owned());
                Value::new_constant(context, key, Some(ident.span()))
            }
            MemberKey::Dynamic(expr) => self.compile_expression(context, expr),
        }
    }

    /// Compile a call, appending it to `into` or else the current block.  A call appended
    /// elsewhere runs later, so the callee's side effects are not applied here.
    pub(super) fn compile_call_into(
        &mut self,
        context: &mut Context,
        call: &CallExpr,
        span: &Span,
        into: Option<Block>,
    ) -> Value {
        let callee = match &call.callee.kind {
            ExprKind::Member { target, member } => {
                let object = self.compile_expression(context, target);
                let key = self.compile_member_key(context, member);
                self.current_block()
                    .append(context)
                    .with_span(Some(call.callee.span.clone()))
                    .field(object, key, true)
            }
            _ => self.compile_expression(context, &call.callee),
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.compile_expression(context, arg));
        }

        let block = into.unwrap_or_else(|| self.current_block());
        let call_val = block
            .append(context)
            .with_span(Some(span.clone()))
            .call(callee, args);
        if let Some(Instruction::Call {
            ellipsis,
            drop_error,
            ..
        }) = call_val.get_instruction_mut(context)
        {
            *ellipsis = call.ellipsis;
            *drop_error = call.drop_error;
        }

        if let Some(function) = callee.get_function_ref(context) {
            self.bind_call(context, call_val, function, span);
            if into.is_none() {
                self.apply_side_effects(context, call_val, function);
            }
        }
        call_val
    }

    /// Bind the late-bound free values of `function` from the scope of the call.
    pub(super) fn bind_call(
        &mut self,
        context: &mut Context,
        call: Value,
        function: Function,
        span: &Span,
    ) {
        self.called.insert(function);
        let mut binding = FxIndexMap::default();
        for (name, free_value) in function.unbound_free_values(context) {
            match self.resolve_binding(context, &name, span) {
                Some(value) => {
                    binding.insert(name, value);
                }
                None => {
                    if self.reported_unbound.insert(free_value) {
                        self.handler.emit_err(CompileError::BindingNotFound {
                            name: name.clone(),
                            span: free_value
                                .get_span(context)
                                .unwrap_or_else(|| span.clone()),
                        });
                    }
                    self.handler.emit_err(CompileError::BindingNotFoundInCall {
                        name,
                        span: span.clone(),
                    });
                }
            }
        }
        if let Some(Instruction::Call {
            binding: call_binding,
            ..
        }) = call.get_instruction_mut(context)
        {
            *call_binding = binding;
        }
    }

    /// Redefine the caller's bindings which the called closure writes.
    pub(super) fn apply_side_effects(
        &mut self,
        context: &mut Context,
        call: Value,
        function: Function,
    ) {
        for (name, value) in function.side_effects_iter(context) {
            let block = self.current_block();
            let span = call.get_span(context);
            let effect = block
                .append(context)
                .with_span(span)
                .side_effect(name.clone(), call, value);
            effect.set_name(context, name.clone());
            if !self.write_visible(context, &name, effect) {
                block.remove_instruction(context, effect);
            }
        }
    }

    pub(super) fn compile_function_literal(
        &mut self,
        context: &mut Context,
        literal: &FunctionLiteral,
        span: &Span,
    ) -> Value {
        let name = match &literal.name {
            Some(name) => name.as_str().to_owned(),
            None => context.get_unique_name(),
        };
        let parent = self.function();
        let function = Function::new(context, self.package, name, Some(parent), Some(span.clone()));
        let fn_ref = Value::new_function_ref(context, function, Some(span.clone()));
        if let Some(name) = &literal.name {
            // Visible to its own body, for recursion.
            self.assign_variable(context, name, fn_ref, true);
        }

        self.push_frame(context, function);
        for param in &literal.params {
            let value = function.add_param(context, param.as_str().to_owned(), Some(param.span()));
            self.assign_variable(context, param, value, true);
        }
        function.set_variadic(context, literal.variadic);
        match &literal.body {
            FunctionBody::Block(body) => self.compile_statements(context, &body.statements),
            FunctionBody::Expr(expr) => {
                let value = self.compile_expression(context, expr);
                self.current_block()
                    .append(context)
                    .with_span(Some(expr.span()))
                    .ret(vec![value]);
            }
        }
        self.finish_function(context);
        fn_ref
    }

    /// An anonymous function without parameters running `body`.
    pub(super) fn compile_closure(
        &mut self,
        context: &mut Context,
        body: &CodeBlock,
        span: &Span,
    ) -> Value {
        let literal = FunctionLiteral {
            name: None,
            params: Vec::new(),
            variadic: false,
            body: FunctionBody::Block(body.clone()),
        };
        self.compile_function_literal(context, &literal, span)
    }
}

pub(super) fn convert_binary_op(op: BinaryOp) -> BinaryOpKind {
    match op {
        BinaryOp::Add => BinaryOpKind::Add,
        BinaryOp::Sub => BinaryOpKind::Sub,
        BinaryOp::Mul => BinaryOpKind::Mul,
        BinaryOp::Div => BinaryOpKind::Div,
        BinaryOp::Mod => BinaryOpKind::Mod,
        BinaryOp::BitAnd => BinaryOpKind::And,
        BinaryOp::BitOr => BinaryOpKind::Or,
        BinaryOp::BitXor => BinaryOpKind::Xor,
        BinaryOp::Shl => BinaryOpKind::Shl,
        BinaryOp::Shr => BinaryOpKind::Shr,
        BinaryOp::AndNot => BinaryOpKind::AndNot,
        BinaryOp::Eq => BinaryOpKind::Eq,
        BinaryOp::Ne => BinaryOpKind::Ne,
        BinaryOp::Lt => BinaryOpKind::Lt,
        BinaryOp::Le => BinaryOpKind::Le,
        BinaryOp::Gt => BinaryOpKind::Gt,
        BinaryOp::Ge => BinaryOpKind::Ge,
        BinaryOp::LogicalAnd => BinaryOpKind::LogicalAnd,
        BinaryOp::LogicalOr => BinaryOpKind::LogicalOr,
        BinaryOp::In => BinaryOpKind::In,
    }
}

fn convert_unary_op(op: UnaryOp) -> UnaryOpKind {
    match op {
        UnaryOp::Not => UnaryOpKind::Not,
        UnaryOp::Neg => UnaryOpKind::Neg,
        UnaryOp::Plus => UnaryOpKind::Plus,
        UnaryOp::BitNot => UnaryOpKind::BitNot,
    }
}

use ember_ast::{AssignKind, Assignment, Declaration, Expr, ExprKind, LeftValue};
use ember_error::error::CompileError;
use ember_ir::{BinaryOpKind, Constant, Context, Instruction, Value};
use ember_types::{Ident, Span, Spanned};

use super::{expression::convert_binary_op, function::IrBuilder};

/// A target with its object and key already evaluated.
enum Place {
    Variable(Ident),
    Element { object: Value, key: Value, span: Span },
}

impl<'eng> IrBuilder<'eng> {
    pub(super) fn compile_assignment(&mut self, context: &mut Context, assignment: &Assignment) {
        match &assignment.kind {
            AssignKind::Assign {
                targets,
                values,
                force,
            } => self.compile_multiple_assign(context, targets, values, *force, &assignment.span),
            AssignKind::Compound { target, op, value } => {
                let place = self.compile_place(context, target);
                let current = self.read_place(context, &place, &assignment.span);
                let rhs = self.compile_expression(context, value);
                let result = self
                    .current_block()
                    .append(context)
                    .with_span(Some(assignment.span.clone()))
                    .binary_op(convert_binary_op(*op), current, rhs);
                self.write_place(context, place, result, false);
            }
            AssignKind::Step { target, increment } => {
                let place = self.compile_place(context, target);
                let current = self.read_place(context, &place, &assignment.span);
                let one = Constant::new_number(context, 1);
                let one = Value::new_constant(context, one, None);
                let op = if *increment {
                    BinaryOpKind::Add
                } else {
                    BinaryOpKind::Sub
                };
                let result = self
                    .current_block()
                    .append(context)
                    .with_span(Some(assignment.span.clone()))
                    .binary_op(op, current, one);
                self.write_place(context, place, result, false);
            }
        }
    }

    /// `var a, b` declares without a value; reading before a write sees an undefined value.
    pub(super) fn compile_declaration(&mut self, context: &mut Context, declaration: &Declaration) {
        if declaration.values.is_empty() {
            for name in declaration.names.iter().filter(|name| !name.is_discard()) {
                self.frame().declare(name.as_str());
            }
            return;
        }
        let targets = declaration
            .names
            .iter()
            .cloned()
            .map(LeftValue::Ident)
            .collect::<Vec<_>>();
        self.compile_multiple_assign(
            context,
            &targets,
            &declaration.values,
            true,
            &declaration.span,
        );
    }

    /// `a, b = x, y` pairs the sides up.  `a, b = f()` unpacks the results of a single call.
    fn compile_multiple_assign(
        &mut self,
        context: &mut Context,
        targets: &[LeftValue],
        values: &[Expr],
        declare: bool,
        span: &Span,
    ) {
        let results = if targets.len() == values.len() {
            let mut results = Vec::with_capacity(values.len());
            for value in values {
                let result = self.compile_expression(context, value);
                if matches!(value.kind, ExprKind::Call(_)) {
                    set_unpack(context, result, 1);
                }
                results.push(result);
            }
            results
        } else if values.len() == 1 && matches!(values[0].kind, ExprKind::Call(_)) {
            let call = self.compile_expression(context, &values[0]);
            set_unpack(context, call, targets.len());
            let mut results = Vec::with_capacity(targets.len());
            for idx in 0..targets.len() {
                let key = Constant::new_number(context, idx as i64);
                let key = Value::new_constant(context, key, None);
                results.push(
                    self.current_block()
                        .append(context)
                        .with_span(Some(span.clone()))
                        .field(call, key, false),
                );
            }
            results
        } else {
            self.handler.emit_err(CompileError::MultipleAssignFailed {
                left: targets.len(),
                right: values.len(),
                span: span.clone(),
            });
            return;
        };

        for (target, result) in targets.iter().zip(results) {
            let place = self.compile_place(context, target);
            self.write_place(context, place, result, declare);
        }
    }

    fn compile_place(&mut self, context: &mut Context, target: &LeftValue) -> Place {
        match target {
            LeftValue::Ident(ident) => Place::Variable(ident.clone()),
            LeftValue::Member {
                target,
                member,
                span,
            } => {
                let object = self.compile_expression(context, target);
                let key = self.compile_member_key(context, member);
                Place::Element {
                    object,
                    key,
                    span: span.clone(),
                }
            }
            LeftValue::Index {
                target,
                index,
                span,
            } => {
                let object = self.compile_expression(context, target);
                let key = self.compile_expression(context, index);
                Place::Element {
                    object,
                    key,
                    span: span.clone(),
                }
            }
        }
    }

    fn read_place(&mut self, context: &mut Context, place: &Place, span: &Span) -> Value {
        match place {
            Place::Variable(ident) => self.read_variable(context, ident.as_str(), &ident.span()),
            Place::Element { object, key, .. } => self
                .current_block()
                .append(context)
                .with_span(Some(span.clone()))
                .field(*object, *key, false),
        }
    }

    fn write_place(&mut self, context: &mut Context, place: Place, value: Value, declare: bool) {
        match place {
            Place::Variable(ident) => self.assign_variable(context, &ident, value, declare),
            Place::Element { object, key, span } => {
                self.current_block()
                    .append(context)
                    .with_span(Some(span))
                    .update(object, key, value);
            }
        }
    }
}

fn set_unpack(context: &mut Context, call: Value, count: usize) {
    if let Some(Instruction::Call { unpack, .. }) = call.get_instruction_mut(context) {
        *unpack = Some(count);
    }
}

//! Report semantic defects in typed IR.
//!
//! Runs after type inference.  Checks are made value by value in block order:
//! - an error value must be handled, by being read or explicitly discarded,
//! - calls must match the arity and parameter types of their callee,
//! - a call unpacked into assignment targets must return as many values as there are targets,
//! - every unresolved `Undefine` names a binding which does not exist.

use ember_error::{error::CompileError, formatting::sequence_to_str, handler::Handler};
use ember_types::{Span, DISCARD_IDENT};

use crate::{
    analysis::UseMap,
    context::Context,
    error::IrError,
    function::Function,
    instruction::{Instruction, UndefineKind},
    irtype::{FunctionType, Type, TypeContent},
    package::Package,
    value::{Value, ValueDatum},
    Pass, PassMutability, ScopedPass,
};

pub const TYPE_CHECK_NAME: &str = "typecheck";

pub fn create_type_check_pass() -> Pass {
    Pass {
        name: TYPE_CHECK_NAME,
        descr: "report type errors, unhandled errors and undefined values.",
        runner: ScopedPass::PackagePass(PassMutability::Analysis(check_types)),
    }
}

pub fn check_types(context: &Context, handler: &Handler, package: Package) -> Result<(), IrError> {
    let use_map = UseMap::compute(context, package);
    for function in package.function_iter(context) {
        check_function(context, handler, &use_map, function);
    }
    Ok(())
}

fn check_function(context: &Context, handler: &Handler, use_map: &UseMap, function: Function) {
    for (_, ins_val) in function.instruction_iter(context) {
        let span = ins_val.get_span(context).unwrap_or_else(Span::dummy);
        match ins_val.get_instruction(context) {
            Some(Instruction::Undefine {
                name,
                kind: UndefineKind::Unresolved,
            }) => {
                handler.emit_err(CompileError::ValueUndefined {
                    name: name.clone(),
                    span,
                });
            }
            Some(Instruction::Field { object, .. }) => {
                let from_make = matches!(
                    object.get_instruction(context),
                    Some(Instruction::Make { .. })
                );
                let is_error = ins_val.get_type(context).is_some_and(|ty| ty.is_error(context));
                if is_error && !from_make && !is_handled(context, use_map, ins_val) {
                    handler.emit_err(CompileError::ErrorUnhandled { span });
                }
            }
            Some(Instruction::Call {
                callee,
                args,
                ellipsis,
                drop_error,
                unpack,
                ..
            }) => {
                if carries_error(context, ins_val) && !is_handled(context, use_map, ins_val) {
                    handler.emit_err(CompileError::ErrorUnhandled { span: span.clone() });
                }
                let Some(fn_ty) = callee
                    .get_type(context)
                    .and_then(|ty| ty.get_function_type(context))
                else {
                    continue;
                };
                let func = callee_name(context, *callee);
                if !*ellipsis {
                    check_arguments(context, handler, &func, fn_ty, args, &span);
                }
                if let Some(targets) = unpack {
                    check_unpack(context, handler, fn_ty.ret, *drop_error, *targets, span);
                }
            }
            _ => (),
        }
    }
}

/// An error result is handled once something reads it, or when it is bound to the discard
/// identifier.
fn is_handled(context: &Context, use_map: &UseMap, value: Value) -> bool {
    use_map.is_used(value) || value.get_name(context) == Some(DISCARD_IDENT)
}

/// Whether a call's result is an error, or a tuple ending in one.
fn carries_error(context: &Context, value: Value) -> bool {
    value.get_type(context).is_some_and(|ty| {
        ty.is_error(context)
            || ty
                .get_combination_fields(context)
                .and_then(|fields| fields.last().copied())
                .is_some_and(|last| last.is_error(context))
    })
}

fn check_arguments(
    context: &Context,
    handler: &Handler,
    func: &str,
    fn_ty: &FunctionType,
    args: &[Value],
    span: &Span,
) {
    let num_fixed = if fn_ty.variadic {
        fn_ty.params.len().saturating_sub(1)
    } else {
        fn_ty.params.len()
    };
    let arg_types = args
        .iter()
        .map(|arg| arg.get_type(context).unwrap_or_else(|| Type::get_any(context)))
        .collect::<Vec<_>>();

    let have = || {
        sequence_to_str(
            &arg_types
                .iter()
                .map(|ty| ty.as_string(context))
                .collect::<Vec<_>>(),
        )
    };
    let want = || param_list(context, fn_ty);
    if args.len() < num_fixed {
        handler.emit_err(CompileError::NotEnoughArguments {
            func: func.to_owned(),
            have: have(),
            want: want(),
            span: span.clone(),
        });
        return;
    }
    if !fn_ty.variadic && args.len() > num_fixed {
        handler.emit_err(CompileError::TooManyArguments {
            func: func.to_owned(),
            have: have(),
            want: want(),
            span: span.clone(),
        });
        return;
    }

    let rest = fn_ty
        .params
        .last()
        .and_then(|rest| rest.get_slice_elem(context));
    for (idx, got) in arg_types.iter().enumerate() {
        let want = if idx < num_fixed {
            fn_ty.params[idx]
        } else {
            match rest {
                Some(elem) => elem,
                None => continue,
            }
        };
        if !got.is_assignable_to(context, &want) {
            handler.emit_err(CompileError::ArgumentTypeError {
                index: idx + 1,
                got: got.as_string(context),
                want: want.as_string(context),
                func: func.to_owned(),
                span: args[idx].get_span(context).unwrap_or_else(|| span.clone()),
            });
        }
    }
}

fn check_unpack(
    context: &Context,
    handler: &Handler,
    ret: Type,
    drop_error: bool,
    targets: usize,
    span: Span,
) {
    let (returned, dropped) = if drop_error {
        match ret.get_content(context) {
            TypeContent::Error => {
                handler.emit_err(CompileError::ValueIsNull { span });
                return;
            }
            _ => match ret.get_combination_fields(context) {
                Some(fields) if fields.last().is_some_and(|ty| ty.is_error(context)) => {
                    (fields.len() - 1, true)
                }
                _ => (ret.return_arity(context), false),
            },
        }
    } else {
        (ret.return_arity(context), false)
    };
    if returned == targets {
        return;
    }
    let ty = ret.as_string(context);
    if dropped {
        handler.emit_err(CompileError::CallAssignmentMismatchDropError {
            left: targets,
            right: returned,
            ty,
            span,
        });
    } else {
        handler.emit_err(CompileError::CallAssignmentMismatch {
            left: targets,
            right: returned,
            ty,
            span,
        });
    }
}

fn param_list(context: &Context, fn_ty: &FunctionType) -> String {
    let last = fn_ty.params.len().saturating_sub(1);
    fn_ty
        .params
        .iter()
        .enumerate()
        .map(|(idx, ty)| match ty.get_slice_elem(context) {
            Some(elem) if fn_ty.variadic && idx == last => {
                format!("...{}", elem.as_string(context))
            }
            _ => ty.as_string(context),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn callee_name(context: &Context, callee: Value) -> String {
    match callee.get_datum(context) {
        ValueDatum::Extern { name } => name.clone(),
        ValueDatum::Function(function) => function.get_name(context).to_owned(),
        _ => callee
            .get_name(context)
            .map(str::to_owned)
            .unwrap_or_else(|| "function".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::infer_types, constant::Constant, parser::parse_type};
    use rustc_hash::FxHashMap;

    fn setup() -> (Context, Package, Function) {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        (context, package, main)
    }

    fn extern_value(context: &mut Context, name: &str, ty: &str) -> Value {
        let ty = parse_type(context, ty, &FxHashMap::default()).unwrap();
        Value::new_extern(context, name.to_owned(), ty, None)
    }

    fn number(context: &mut Context, n: i64) -> Value {
        let c = Constant::new_number(context, n);
        Value::new_constant(context, c, None)
    }

    fn check(context: &mut Context, package: Package) -> Vec<CompileError> {
        let handler = Handler::default();
        infer_types(context, &handler, package).unwrap();
        check_types(context, &handler, package).unwrap();
        handler.errors()
    }

    #[test]
    fn unhandled_errors() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let get_error = extern_value(&mut context, "getError", "fn() -> error");
        let println = extern_value(&mut context, "println", "fn(...any)");

        // getError()
        entry.append(&mut context).call(get_error, vec![]);
        // _ = getError()
        let discarded = entry.append(&mut context).call(get_error, vec![]);
        discarded.set_name(&mut context, DISCARD_IDENT.to_owned());
        // err = getError(); println(err)
        let handled = entry.append(&mut context).call(get_error, vec![]);
        handled.set_name(&mut context, "err".to_owned());
        entry.append(&mut context).call(println, vec![handled]);
        // err2 = getError()
        let unused = entry.append(&mut context).call(get_error, vec![]);
        unused.set_name(&mut context, "err2".to_owned());
        entry.append(&mut context).ret(vec![]);

        let errors = check(&mut context, package);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|err| matches!(err, CompileError::ErrorUnhandled { .. })));
    }

    #[test]
    fn argument_checks() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let takes = extern_value(&mut context, "takes", "fn(number, string, ...number)");
        let one = number(&mut context, 1);
        let s = Constant::new_string(&context, "s".to_owned());
        let s = Value::new_constant(&mut context, s, None);

        entry.append(&mut context).call(takes, vec![one]);
        entry.append(&mut context).call(takes, vec![one, s, one, s]);
        let spread = entry.append(&mut context).call(takes, vec![one]);
        if let Some(Instruction::Call { ellipsis, .. }) = spread.get_instruction_mut(&mut context) {
            *ellipsis = true;
        }
        entry.append(&mut context).ret(vec![]);

        let errors = check(&mut context, package);
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(matches!(
            &errors[0],
            CompileError::NotEnoughArguments { func, have, want, .. }
                if func == "takes" && have == "number" && want == "number, string, ...number"
        ));
        assert!(matches!(
            &errors[1],
            CompileError::ArgumentTypeError { index: 4, got, want, .. }
                if got == "string" && want == "number"
        ));
    }

    #[test]
    fn unpack_counts() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let pair = extern_value(&mut context, "pair", "fn() -> (number, number)");
        let try_pair = extern_value(&mut context, "tryPair", "fn() -> (number, number, error)");
        let only_error = extern_value(&mut context, "onlyError", "fn() -> error");

        let set_call = |context: &mut Context, callee: Value, unpack: usize, drop_error: bool| {
            let call = entry.append(context).call(callee, vec![]);
            if let Some(Instruction::Call {
                unpack: u,
                drop_error: d,
                ..
            }) = call.get_instruction_mut(context)
            {
                *u = Some(unpack);
                *d = drop_error;
            }
            call.set_name(context, "a".to_owned());
            let any = Type::get_any(context);
            let consumer = Value::new_extern(context, "use".to_owned(), any, None);
            entry.append(context).call(consumer, vec![call]);
        };
        set_call(&mut context, pair, 1, false);
        set_call(&mut context, try_pair, 2, true);
        set_call(&mut context, try_pair, 1, true);
        set_call(&mut context, only_error, 1, true);
        entry.append(&mut context).ret(vec![]);

        let errors = check(&mut context, package);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(matches!(
            &errors[0],
            CompileError::CallAssignmentMismatch { left: 1, right: 2, ty, .. }
                if ty == "number, number"
        ));
        assert!(matches!(
            &errors[1],
            CompileError::CallAssignmentMismatchDropError { left: 1, right: 2, .. }
        ));
        assert!(matches!(&errors[2], CompileError::ValueIsNull { .. }));
    }

    #[test]
    fn unresolved_undefine_is_reported() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        entry
            .append(&mut context)
            .undefine("c".to_owned(), UndefineKind::Unresolved);
        entry
            .append(&mut context)
            .undefine("a".to_owned(), UndefineKind::Declared);
        entry.append(&mut context).ret(vec![]);

        let errors = check(&mut context, package);
        assert!(matches!(
            errors.as_slice(),
            [CompileError::ValueUndefined { name, .. }] if name == "c"
        ));
    }
}

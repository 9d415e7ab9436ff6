//! Give every value a [`Type`], in a single forward sweep.
//!
//! Functions are visited in reverse creation order, so a closure is typed, and its signature
//! known, before the function which creates and calls it.  Within a function values are typed in
//! block order, phis first.  Operands which are not typed yet (only possible along a loop's back
//! edge) count as `any`.

use ember_error::{error::CompileError, formatting::did_you_mean, handler::Handler};
use ember_types::Span;
use rustc_hash::FxHashMap;

use crate::{
    analysis::UseMap,
    constant::ConstantValue,
    context::Context,
    error::IrError,
    function::Function,
    instruction::{BinaryOpKind, Instruction, UnaryOpKind},
    irtype::{FunctionType, ObjectKind, ObjectType, Type, TypeContent},
    package::Package,
    value::{Value, ValueDatum},
    Pass, PassMutability, ScopedPass,
};

pub const TYPE_INFERENCE_NAME: &str = "typeinfer";

pub fn create_type_inference_pass() -> Pass {
    Pass {
        name: TYPE_INFERENCE_NAME,
        descr: "infer the type of every value.",
        runner: ScopedPass::PackagePass(PassMutability::Transform(infer_types)),
    }
}

pub fn infer_types(
    context: &mut Context,
    handler: &Handler,
    package: Package,
) -> Result<bool, IrError> {
    let use_map = UseMap::compute(context, package);
    let mut inferrer = TypeInferrer {
        handler,
        use_map: &use_map,
    };
    for function in package.function_iter(context).rev() {
        inferrer.infer_function(context, function);
    }
    Ok(true)
}

/// The names of the three fields of an iteration step.
pub const NEXT_KEY: &str = "key";
pub const NEXT_FIELD: &str = "field";
pub const NEXT_OK: &str = "ok";

/// The type of a `Next` over a container yielding `key` and `field`.
pub fn next_type(context: &mut Context, key: Type, field: Type) -> Type {
    let ok = Type::get_bool(context);
    Type::new_object(
        context,
        ObjectType {
            kind: ObjectKind::Struct,
            name: None,
            fields: vec![
                (NEXT_KEY.to_owned(), key),
                (NEXT_FIELD.to_owned(), field),
                (NEXT_OK.to_owned(), ok),
            ],
            methods: Vec::new(),
        },
    )
}

struct TypeInferrer<'a> {
    handler: &'a Handler,
    use_map: &'a UseMap,
}

impl TypeInferrer<'_> {
    fn infer_function(&mut self, context: &mut Context, function: Function) {
        tracing::trace!(function = function.get_name(context), "inferring types");

        let any = Type::get_any(context);
        let params = function.params(context).to_vec();
        let variadic = function.is_variadic(context);
        let mut param_types = Vec::with_capacity(params.len());
        for (idx, param) in params.iter().enumerate() {
            let ty = match param.get_type(context) {
                Some(ty) => ty,
                None if variadic && idx + 1 == params.len() => Type::new_slice(context, any),
                None => any,
            };
            param.set_type(context, ty);
            param_types.push(ty);
        }

        for (_, free_value) in function.free_values_iter(context) {
            if free_value.get_type(context).is_some() {
                continue;
            }
            let ty = match free_value.get_datum(context) {
                ValueDatum::FreeValue {
                    captured: Some(captured),
                    ..
                } => captured.get_type(context).unwrap_or(any),
                _ => any,
            };
            free_value.set_type(context, ty);
        }

        for (_, ins_val) in function.instruction_iter(context) {
            let ty = self.infer_instruction(context, ins_val);
            if let Some(ty) = ty {
                ins_val.set_type(context, ty);
            }
        }

        let null = Type::get_null(context);
        for (_, ins_val) in function.instruction_iter(context) {
            if ins_val.get_type(context).is_none() {
                ins_val.set_type(context, null);
            }
        }

        let returns = function
            .return_values(context)
            .into_iter()
            .map(|values| self.return_type(context, &values))
            .collect::<Vec<_>>();
        let ret = Type::common(context, returns).unwrap_or(null);
        let free_values = function
            .free_values_iter(context)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let sig = Type::new_function(
            context,
            FunctionType {
                params: param_types,
                ret,
                free_values,
                variadic,
            },
        );
        function.set_type(context, sig);
    }

    fn return_type(&self, context: &mut Context, values: &[Value]) -> Type {
        match values {
            [] => Type::get_null(context),
            [value] => self.operand_type(context, *value),
            _ => {
                let fields = values
                    .iter()
                    .map(|value| self.operand_type(context, *value))
                    .collect();
                Type::new_combination(context, fields)
            }
        }
    }

    /// The type of an operand, typing function references on first sight.
    fn operand_type(&self, context: &mut Context, value: Value) -> Type {
        if let Some(ty) = value.get_type(context) {
            return ty;
        }
        match value.get_datum(context) {
            ValueDatum::Function(function) => match function.get_type(context) {
                Some(sig) => {
                    value.set_type(context, sig);
                    sig
                }
                None => Type::get_any(context),
            },
            _ => Type::get_any(context),
        }
    }

    fn infer_instruction(&mut self, context: &mut Context, ins_val: Value) -> Option<Type> {
        let ins = ins_val.get_instruction(context)?.clone();
        let span = ins_val.get_span(context).unwrap_or_else(Span::dummy);
        let any = Type::get_any(context);
        let ty = match ins {
            Instruction::Undefine { .. } => any,
            Instruction::BinaryOp { op, arg1, arg2 } => {
                let lhs = self.operand_type(context, arg1);
                let rhs = self.operand_type(context, arg2);
                binary_op_type(context, op, lhs, rhs)
            }
            Instruction::UnaryOp { op, arg } => match op {
                UnaryOpKind::Not => Type::get_bool(context),
                UnaryOpKind::Neg | UnaryOpKind::Plus => self.operand_type(context, arg),
                UnaryOpKind::BitNot => Type::get_number(context),
            },
            Instruction::Phi { edges, .. } => {
                let typed = edges
                    .iter()
                    .filter_map(|edge| edge.get_type(context))
                    .collect::<Vec<_>>();
                Type::common(context, typed).unwrap_or(any)
            }
            Instruction::Call {
                callee,
                args,
                ellipsis,
                drop_error,
                binding,
                ..
            } => {
                let callee_ty = self.operand_type(context, callee);
                for (name, value) in &binding {
                    let bound = self.operand_type(context, *value);
                    if let Some(free_value) = callee
                        .get_function_ref(context)
                        .and_then(|function| function.get_free_value(context, name))
                    {
                        free_value.set_type(context, bound);
                    }
                }
                let Some(fn_ty) = callee_ty.get_function_type(context).cloned() else {
                    return Some(any);
                };
                let arg_types = args
                    .iter()
                    .map(|arg| self.operand_type(context, *arg))
                    .collect::<Vec<_>>();
                let mut ret = fn_ty.ret;
                let generic = ret.contains_generic(context)
                    || fn_ty.params.iter().any(|p| p.contains_generic(context));
                if generic {
                    let bindings = self.bind_generics(context, &fn_ty, &arg_types, ellipsis, &span);
                    ret = ret.substitute(context, &bindings);
                }
                if drop_error {
                    ret = ret.without_error(context).0;
                }
                ret
            }
            Instruction::Field {
                object,
                key,
                is_method,
            } => self.field_type(context, object, key, is_method, &span),
            Instruction::Update { object, key, .. } => {
                let object_ty = self.operand_type(context, object);
                if is_scalar(context, object_ty) {
                    self.handler
                        .emit_err(invalid_field(context, object_ty, key, &span));
                }
                object_ty
            }
            Instruction::Make { ty, refine, .. } => {
                if refine {
                    self.refine_literal(context, ins_val, ty)
                } else {
                    ty
                }
            }
            Instruction::Next { iter } => {
                let iter_ty = self.operand_type(context, iter);
                let number = Type::get_number(context);
                let (key, field) = match iter_ty.get_content(context).clone() {
                    TypeContent::Slice(elem) => (number, elem),
                    TypeContent::Bytes | TypeContent::Number => (number, number),
                    TypeContent::String => (number, Type::get_string(context)),
                    TypeContent::Object(_) => (Type::get_string(context), any),
                    TypeContent::Map(key, value) => (key, value),
                    TypeContent::Channel(elem) => (elem, Type::get_null(context)),
                    _ => (any, any),
                };
                next_type(context, key, field)
            }
            Instruction::SideEffect { value, .. } => self.operand_type(context, value),
            Instruction::ErrorCatch { .. } => Type::get_error(context),
            Instruction::Slice { object, .. } => {
                let object_ty = self.operand_type(context, object);
                match object_ty.get_content(context) {
                    TypeContent::Slice(_) | TypeContent::String | TypeContent::Bytes => object_ty,
                    _ => any,
                }
            }
            Instruction::Send { .. } | Instruction::Assert { .. } | Instruction::Panic(_) => {
                Type::get_null(context)
            }
            Instruction::Recover => any,
            Instruction::Jump(_)
            | Instruction::If { .. }
            | Instruction::Loop { .. }
            | Instruction::Switch { .. }
            | Instruction::ErrorHandler { .. }
            | Instruction::Return(_) => return None,
        };
        Some(ty)
    }

    /// Bind the generic placeholders of `fn_ty`'s parameters from the argument types.
    fn bind_generics(
        &self,
        context: &Context,
        fn_ty: &FunctionType,
        arg_types: &[Type],
        ellipsis: bool,
        span: &Span,
    ) -> FxHashMap<String, Type> {
        let mut bindings = FxHashMap::default();
        let num_fixed = if fn_ty.variadic {
            fn_ty.params.len().saturating_sub(1)
        } else {
            fn_ty.params.len()
        };
        for (idx, arg_ty) in arg_types.iter().enumerate() {
            let param = if idx < num_fixed {
                fn_ty.params[idx]
            } else if fn_ty.variadic {
                let Some(rest) = fn_ty.params.last() else {
                    break;
                };
                if ellipsis {
                    *rest
                } else {
                    match rest.get_slice_elem(context) {
                        Some(elem) => elem,
                        None => break,
                    }
                }
            } else {
                break;
            };
            self.bind(context, param, *arg_ty, &mut bindings, span);
        }
        bindings
    }

    fn bind(
        &self,
        context: &Context,
        param: Type,
        arg: Type,
        bindings: &mut FxHashMap<String, Type>,
        span: &Span,
    ) {
        match (param.get_content(context), arg.get_content(context)) {
            (TypeContent::Generic(name), _) => match bindings.get(name) {
                Some(first) if *first != arg && !first.is_any(context) && !arg.is_any(context) => {
                    self.handler.emit_err(CompileError::GenericTypeMismatch {
                        generic: format!("${name}"),
                        first: first.as_string(context),
                        second: arg.as_string(context),
                        span: span.clone(),
                    });
                }
                Some(first) if !first.is_any(context) => (),
                _ => {
                    bindings.insert(name.clone(), arg);
                }
            },
            (TypeContent::Slice(p), TypeContent::Slice(a))
            | (TypeContent::Channel(p), TypeContent::Channel(a)) => {
                self.bind(context, *p, *a, bindings, span)
            }
            (TypeContent::Map(pk, pv), TypeContent::Map(ak, av)) => {
                self.bind(context, *pk, *ak, bindings, span);
                self.bind(context, *pv, *av, bindings, span);
            }
            _ => (),
        }
    }

    fn field_type(
        &mut self,
        context: &mut Context,
        object: Value,
        key: Value,
        is_method: bool,
        span: &Span,
    ) -> Type {
        let any = Type::get_any(context);
        let object_ty = self.operand_type(context, object);
        let key_ty = self.operand_type(context, key);
        let key_name = match key.get_constant(context).map(|c| &c.value) {
            Some(ConstantValue::String(name)) => Some(name.clone()),
            _ => None,
        };
        let key_index = match key.get_constant(context).map(|c| &c.value) {
            Some(ConstantValue::Number(n)) => usize::try_from(*n).ok(),
            _ => None,
        };
        let invalid = |context: &Context| invalid_field(context, object_ty, key, span);

        if key_name.as_deref() == Some(NEXT_FIELD) {
            let next_iter = match object.get_instruction(context) {
                Some(Instruction::Next { iter }) => Some(*iter),
                _ => None,
            };
            if let Some(iter) = next_iter {
                let iter_ty = self.operand_type(context, iter);
                if let TypeContent::Channel(elem) = iter_ty.get_content(context) {
                    self.handler.emit_err(CompileError::InvalidChanType {
                        ty: elem.as_string(context),
                        span: span.clone(),
                    });
                    return Type::get_null(context);
                }
            }
        }

        match object_ty.get_content(context).clone() {
            TypeContent::Any | TypeContent::Generic(_) => any,
            TypeContent::Object(object) if object.kind == ObjectKind::Combination => {
                match key_index.and_then(|idx| object.fields.get(idx)) {
                    Some((_, ty)) => *ty,
                    None if key.is_constant(context) => {
                        self.handler.emit_err(invalid(&*context));
                        any
                    }
                    None => any,
                }
            }
            TypeContent::Object(object) => {
                let Some(name) = key_name else {
                    return any;
                };
                let member = if is_method {
                    object.get_method(&name).or_else(|| object.get_field(&name))
                } else {
                    object.get_field(&name).or_else(|| object.get_method(&name))
                };
                if let Some(ty) = member {
                    return ty;
                }
                match &object.name {
                    Some(object_name) => {
                        let kind = match object.kind {
                            ObjectKind::Library => "library",
                            _ => "type",
                        };
                        self.handler.emit_err(CompileError::ExternFieldError {
                            kind: kind.to_owned(),
                            name: object_name.clone(),
                            key: name.clone(),
                            suggestion: did_you_mean(&name, object.member_names()),
                            span: span.clone(),
                        });
                    }
                    None => {
                        self.handler.emit_err(invalid(&*context));
                    }
                }
                any
            }
            TypeContent::Slice(elem) => {
                if key_name.is_some() {
                    any
                } else {
                    elem
                }
            }
            TypeContent::Map(_, value) => value,
            TypeContent::String | TypeContent::Bytes => {
                if key_name.is_some() || key_ty.is_string(context) {
                    any
                } else {
                    Type::get_number(context)
                }
            }
            TypeContent::Error => {
                if key_name.as_deref() == Some("Error") {
                    let string = Type::get_string(context);
                    Type::new_function(
                        context,
                        FunctionType {
                            params: Vec::new(),
                            ret: string,
                            free_values: Vec::new(),
                            variadic: false,
                        },
                    )
                } else {
                    any
                }
            }
            TypeContent::Null
            | TypeContent::Boolean
            | TypeContent::Number
            | TypeContent::Channel(_)
            | TypeContent::Function(_) => {
                self.handler.emit_err(invalid(&*context));
                any
            }
        }
    }

    /// Refine an untyped literal's `[]any` or `map[any]any` from the elements written into it.
    fn refine_literal(&self, context: &mut Context, make: Value, declared: Type) -> Type {
        let mut keys = Vec::new();
        let mut elems = Vec::new();
        for user in self.use_map.users(make) {
            if let Some(Instruction::Update { object, key, value }) =
                user.get_instruction(context)
            {
                if *object == make {
                    keys.push(*key);
                    elems.push(*value);
                }
            }
        }
        let key_types = keys
            .into_iter()
            .map(|key| self.operand_type(context, key))
            .collect::<Vec<_>>();
        let elem_types = elems
            .into_iter()
            .map(|elem| self.operand_type(context, elem))
            .collect::<Vec<_>>();
        let Some(elem) = Type::common(context, elem_types) else {
            return declared;
        };
        match declared.get_content(context).clone() {
            TypeContent::Slice(_) => Type::new_slice(context, elem),
            TypeContent::Map(key, _) => {
                let key = Type::common(context, key_types).unwrap_or(key);
                Type::new_map(context, key, elem)
            }
            _ => declared,
        }
    }
}

fn binary_op_type(context: &Context, op: BinaryOpKind, lhs: Type, rhs: Type) -> Type {
    if op.yields_bool() {
        Type::get_bool(context)
    } else if lhs.is_any(context) {
        rhs
    } else if rhs.is_any(context) || lhs == rhs {
        lhs
    } else {
        Type::get_any(context)
    }
}

fn invalid_field(context: &Context, object_ty: Type, key: Value, span: &Span) -> CompileError {
    CompileError::InvalidField {
        ty: object_ty.as_string(context),
        key: key_string(context, key),
        span: span.clone(),
    }
}

fn is_scalar(context: &Context, ty: Type) -> bool {
    matches!(
        ty.get_content(context),
        TypeContent::Null
            | TypeContent::Boolean
            | TypeContent::Number
            | TypeContent::String
            | TypeContent::Bytes
    )
}

/// A field key as written in source, for diagnostics.
pub fn key_string(context: &Context, key: Value) -> String {
    match key.get_constant(context) {
        Some(c) => match &c.value {
            ConstantValue::String(s) => s.clone(),
            other => other.as_lit_string(),
        },
        None => key
            .get_name(context)
            .map(str::to_owned)
            .unwrap_or_else(|| "?".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::Constant, parser::parse_type};
    use pretty_assertions::assert_eq;

    fn setup() -> (Context, Package, Function) {
        let mut context = Context::new();
        let package = Package::new(&mut context, "test");
        let main = Function::new(&mut context, package, "main".to_owned(), None, None);
        (context, package, main)
    }

    fn string(context: &mut Context, s: &str) -> Value {
        let c = Constant::new_string(context, s.to_owned());
        Value::new_constant(context, c, None)
    }

    fn number(context: &mut Context, n: i64) -> Value {
        let c = Constant::new_number(context, n);
        Value::new_constant(context, c, None)
    }

    fn extern_value(context: &mut Context, name: &str, ty: &str) -> Value {
        let ty = parse_type(context, ty, &FxHashMap::default()).unwrap();
        Value::new_extern(context, name.to_owned(), ty, None)
    }

    #[test]
    fn binary_ops_and_phis() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let p = main.add_param(&mut context, "p".to_owned(), None);
        let one = number(&mut context, 1);
        let s = string(&mut context, "s");
        let add = entry.append(&mut context).binary_op(BinaryOpKind::Add, p, one);
        let mixed = entry.append(&mut context).binary_op(BinaryOpKind::Add, s, one);
        let lt = entry.append(&mut context).binary_op(BinaryOpKind::Lt, s, one);
        entry.append(&mut context).ret(vec![add, lt]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(add.get_type(&context), Some(Type::get_number(&context)));
        assert_eq!(mixed.get_type(&context), Some(Type::get_any(&context)));
        assert_eq!(lt.get_type(&context), Some(Type::get_bool(&context)));
        assert_eq!(
            main.get_type(&context).unwrap().as_string(&context),
            "fn(any) -> (number, boolean)"
        );
        assert!(!handler.has_errors());
    }

    #[test]
    fn slices_membership_and_recover() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let numbers = extern_value(&mut context, "numbers", "[]number");
        let table = extern_value(&mut context, "table", "map[string]number");
        let one = number(&mut context, 1);
        let key = string(&mut context, "k");
        let sliced = entry
            .append(&mut context)
            .slice(numbers, Some(one), None, None);
        let member = entry
            .append(&mut context)
            .binary_op(BinaryOpKind::In, key, table);
        let recovered = entry.append(&mut context).recover();
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(sliced.get_type(&context).unwrap().as_string(&context), "[]number");
        assert_eq!(member.get_type(&context), Some(Type::get_bool(&context)));
        assert_eq!(recovered.get_type(&context), Some(Type::get_any(&context)));
    }

    #[test]
    fn generic_calls_and_dropped_errors() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let first = extern_value(&mut context, "first", "fn([]$T) -> ($T, error)");
        let numbers = extern_value(&mut context, "numbers", "[]number");
        let pair = entry.append(&mut context).call(first, vec![numbers]);
        let dropped = entry.append(&mut context).call(first, vec![numbers]);
        if let Some(Instruction::Call { drop_error, .. }) =
            dropped.get_instruction_mut(&mut context)
        {
            *drop_error = true;
        }
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(pair.get_type(&context).unwrap().as_string(&context), "number, error");
        assert_eq!(dropped.get_type(&context), Some(Type::get_number(&context)));
    }

    #[test]
    fn generic_mismatch_is_reported() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let max = extern_value(&mut context, "max", "fn($T, $T) -> $T");
        let one = number(&mut context, 1);
        let s = string(&mut context, "s");
        entry.append(&mut context).call(max, vec![one, s]);
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert!(matches!(
            handler.errors().as_slice(),
            [CompileError::GenericTypeMismatch { first, second, .. }]
                if first == "number" && second == "string"
        ));
    }

    #[test]
    fn fields_of_named_types_suggest_members() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let number_ty = Type::get_number(&context);
        let getter = parse_type(&mut context, "fn() -> number", &FxHashMap::default()).unwrap();
        let lib = Type::new_library(
            &mut context,
            "codec".to_owned(),
            vec![("getAInt".to_owned(), getter), ("width".to_owned(), number_ty)],
        );
        let codec = Value::new_extern(&mut context, "codec".to_owned(), lib, None);
        let width = string(&mut context, "width");
        let typo = string(&mut context, "GetaInt");
        let good = entry.append(&mut context).field(codec, width, false);
        let bad = entry.append(&mut context).field(codec, typo, false);
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(good.get_type(&context), Some(number_ty));
        assert_eq!(bad.get_type(&context), Some(Type::get_any(&context)));
        assert!(matches!(
            handler.errors().as_slice(),
            [CompileError::ExternFieldError { suggestion: Some(s), .. }] if s == "getAInt"
        ));
    }

    #[test]
    fn iterating_channels() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let ch = extern_value(&mut context, "ch", "chan string");
        let step = entry.append(&mut context).next(ch);
        let key = string(&mut context, NEXT_KEY);
        let field = string(&mut context, NEXT_FIELD);
        let k = entry.append(&mut context).field(step, key, false);
        let f = entry.append(&mut context).field(step, field, false);
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(k.get_type(&context), Some(Type::get_string(&context)));
        assert_eq!(f.get_type(&context), Some(Type::get_null(&context)));
        assert!(matches!(
            handler.errors().as_slice(),
            [CompileError::InvalidChanType { ty, .. }] if ty == "string"
        ));
    }

    #[test]
    fn literals_are_refined_when_elements_agree() {
        let (mut context, package, main) = setup();
        let entry = main.get_entry_block(&context);
        let any = Type::get_any(&context);
        let any_slice = Type::new_slice(&mut context, any);
        let zero = number(&mut context, 0);
        let one = number(&mut context, 1);
        let a = string(&mut context, "a");
        let b = string(&mut context, "b");
        let list = entry.append(&mut context).make(any_slice, None, None, true);
        entry.append(&mut context).update(list, zero, a);
        entry.append(&mut context).update(list, one, b);
        let mixed = entry.append(&mut context).make(any_slice, None, None, true);
        entry.append(&mut context).update(mixed, zero, a);
        entry.append(&mut context).update(mixed, one, one);
        entry.append(&mut context).ret(vec![]);

        let handler = Handler::default();
        infer_types(&mut context, &handler, package).unwrap();
        assert_eq!(list.get_type(&context).unwrap().as_string(&context), "[]string");
        assert_eq!(mixed.get_type(&context).unwrap().as_string(&context), "[]any");
    }
}

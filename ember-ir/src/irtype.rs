//! Each of the valid `Value` types.
//!
//! These mirror the dynamic kinds of the scripting language plus a few analysis-only kinds:
//! - [`TypeContent::Any`] is the unresolved type, compatible with everything.
//! - [`ObjectKind::Combination`] is the positional tuple produced by a multi-value return.  Its
//!   fields are named `"0"`, `"1"`, and so on.
//! - [`TypeContent::Generic`] is a placeholder bound per call by the builtins that declare one.
//!
//! Types are interned in the [`Context`], so two structurally equal types compare equal as
//! handles.

use rustc_hash::FxHashMap;

use crate::context::Context;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Type(pub slotmap::DefaultKey);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum TypeContent {
    Any,
    Null,
    Boolean,
    Number,
    String,
    Bytes,
    Slice(Type),
    Map(Type, Type),
    Object(ObjectType),
    Channel(Type),
    Function(FunctionType),
    Error,
    Generic(String),
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ObjectKind {
    /// A named host type with fields and methods.
    Struct,
    /// An external library namespace.
    Library,
    /// A multi-value return tuple.
    Combination,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ObjectType {
    pub kind: ObjectKind,
    pub name: Option<String>,
    pub fields: Vec<(String, Type)>,
    pub methods: Vec<(String, Type)>,
}

impl ObjectType {
    pub fn get_field(&self, key: &str) -> Option<Type> {
        self.fields
            .iter()
            .find_map(|(name, ty)| (name == key).then_some(*ty))
    }

    pub fn get_method(&self, key: &str) -> Option<Type> {
        self.methods
            .iter()
            .find_map(|(name, ty)| (name == key).then_some(*ty))
    }

    /// Every field and method name, fields first.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .chain(self.methods.iter())
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FunctionType {
    /// With `variadic` set, the last parameter is a slice of the variadic element type.
    pub params: Vec<Type>,
    pub ret: Type,
    pub free_values: Vec<String>,
    pub variadic: bool,
}

impl Type {
    fn get_or_create_unique_type(context: &mut Context, t: TypeContent) -> Type {
        // Trying to avoiding cloning t unless we're creating a new type.
        #[allow(clippy::map_entry)]
        if !context.type_map.contains_key(&t) {
            let new_type = Type(context.types.insert(t.clone()));
            context.type_map.insert(t, new_type);
            new_type
        } else {
            context.type_map[&t]
        }
    }

    /// Get Type if it already exists.
    pub fn get_type(context: &Context, t: &TypeContent) -> Option<Type> {
        context.type_map.get(t).copied()
    }

    pub fn create_basic_types(context: &mut Context) {
        Self::get_or_create_unique_type(context, TypeContent::Any);
        Self::get_or_create_unique_type(context, TypeContent::Null);
        Self::get_or_create_unique_type(context, TypeContent::Boolean);
        Self::get_or_create_unique_type(context, TypeContent::Number);
        Self::get_or_create_unique_type(context, TypeContent::String);
        Self::get_or_create_unique_type(context, TypeContent::Bytes);
        Self::get_or_create_unique_type(context, TypeContent::Error);
    }

    fn get_basic(context: &Context, t: &TypeContent) -> Type {
        Self::get_type(context, t).expect("basic types are created with the context")
    }

    /// Get the content for this [Type].
    pub fn get_content<'a>(&self, context: &'a Context) -> &'a TypeContent {
        &context.types[self.0]
    }

    pub fn get_any(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Any)
    }

    pub fn get_null(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Null)
    }

    pub fn get_bool(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Boolean)
    }

    pub fn get_number(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Number)
    }

    pub fn get_string(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::String)
    }

    pub fn get_bytes(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Bytes)
    }

    pub fn get_error(context: &Context) -> Type {
        Self::get_basic(context, &TypeContent::Error)
    }

    pub fn new_slice(context: &mut Context, elem: Type) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Slice(elem))
    }

    pub fn new_map(context: &mut Context, key: Type, value: Type) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Map(key, value))
    }

    pub fn new_channel(context: &mut Context, elem: Type) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Channel(elem))
    }

    pub fn new_generic(context: &mut Context, name: String) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Generic(name))
    }

    pub fn new_object(context: &mut Context, object: ObjectType) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Object(object))
    }

    pub fn new_struct(
        context: &mut Context,
        name: String,
        fields: Vec<(String, Type)>,
        methods: Vec<(String, Type)>,
    ) -> Type {
        Self::new_object(
            context,
            ObjectType {
                kind: ObjectKind::Struct,
                name: Some(name),
                fields,
                methods,
            },
        )
    }

    pub fn new_library(context: &mut Context, name: String, members: Vec<(String, Type)>) -> Type {
        Self::new_object(
            context,
            ObjectType {
                kind: ObjectKind::Library,
                name: Some(name),
                fields: members,
                methods: Vec::new(),
            },
        )
    }

    /// A positional tuple of `fields`.
    pub fn new_combination(context: &mut Context, fields: Vec<Type>) -> Type {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(idx, ty)| (idx.to_string(), ty))
            .collect();
        Self::new_object(
            context,
            ObjectType {
                kind: ObjectKind::Combination,
                name: None,
                fields,
                methods: Vec::new(),
            },
        )
    }

    pub fn new_function(context: &mut Context, function: FunctionType) -> Type {
        Self::get_or_create_unique_type(context, TypeContent::Function(function))
    }

    /// Return a string representation of type, used for printing and diagnostics.
    pub fn as_string(&self, context: &Context) -> String {
        match self.get_content(context) {
            TypeContent::Any => "any".into(),
            TypeContent::Null => "null".into(),
            TypeContent::Boolean => "boolean".into(),
            TypeContent::Number => "number".into(),
            TypeContent::String => "string".into(),
            TypeContent::Bytes => "bytes".into(),
            TypeContent::Error => "error".into(),
            TypeContent::Slice(elem) => format!("[]{}", elem.as_string(context)),
            TypeContent::Map(key, value) => {
                format!("map[{}]{}", key.as_string(context), value.as_string(context))
            }
            TypeContent::Channel(elem) => format!("chan {}", elem.as_string(context)),
            TypeContent::Generic(name) => format!("${name}"),
            TypeContent::Object(ObjectType {
                kind: ObjectKind::Combination,
                fields,
                ..
            }) => fields
                .iter()
                .map(|(_, ty)| ty.as_string(context))
                .collect::<Vec<_>>()
                .join(", "),
            TypeContent::Object(ObjectType { name, .. }) => {
                name.clone().unwrap_or_else(|| "object".into())
            }
            TypeContent::Function(FunctionType {
                params,
                ret,
                variadic,
                ..
            }) => {
                let last = params.len().saturating_sub(1);
                let params = params
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| match (idx == last && *variadic, ty.get_content(context)) {
                        (true, TypeContent::Slice(elem)) => {
                            format!("...{}", elem.as_string(context))
                        }
                        _ => ty.as_string(context),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let ret_str = if ret.is_combination(context) {
                    format!("({})", ret.as_string(context))
                } else {
                    ret.as_string(context)
                };
                format!("fn({params}) -> {ret_str}")
            }
        }
    }

    pub fn is_any(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Any)
    }

    pub fn is_null(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Null)
    }

    pub fn is_bool(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Boolean)
    }

    pub fn is_number(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Number)
    }

    pub fn is_string(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::String)
    }

    pub fn is_error(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Error)
    }

    pub fn is_generic(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Generic(_))
    }

    pub fn is_function(&self, context: &Context) -> bool {
        matches!(*self.get_content(context), TypeContent::Function(_))
    }

    pub fn is_combination(&self, context: &Context) -> bool {
        matches!(
            self.get_content(context),
            TypeContent::Object(ObjectType {
                kind: ObjectKind::Combination,
                ..
            })
        )
    }

    pub fn get_object<'a>(&self, context: &'a Context) -> Option<&'a ObjectType> {
        match self.get_content(context) {
            TypeContent::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn get_function_type<'a>(&self, context: &'a Context) -> Option<&'a FunctionType> {
        match self.get_content(context) {
            TypeContent::Function(function) => Some(function),
            _ => None,
        }
    }

    /// The positional field types of a combination.
    pub fn get_combination_fields(&self, context: &Context) -> Option<Vec<Type>> {
        match self.get_content(context) {
            TypeContent::Object(ObjectType {
                kind: ObjectKind::Combination,
                fields,
                ..
            }) => Some(fields.iter().map(|(_, ty)| *ty).collect()),
            _ => None,
        }
    }

    pub fn get_slice_elem(&self, context: &Context) -> Option<Type> {
        match self.get_content(context) {
            TypeContent::Slice(elem) => Some(*elem),
            _ => None,
        }
    }

    /// How many values a call returning this type yields.
    pub fn return_arity(&self, context: &Context) -> usize {
        self.get_combination_fields(context)
            .map(|fields| fields.len())
            .unwrap_or(1)
    }

    /// The type left once a trailing error result is dropped, and whether one was.
    ///
    /// A lone error becomes `null`, a pair collapses to its remaining field.
    pub fn without_error(&self, context: &mut Context) -> (Type, bool) {
        if self.is_error(context) {
            return (Type::get_null(context), true);
        }
        match self.get_combination_fields(context) {
            Some(mut fields) if fields.last().is_some_and(|ty| ty.is_error(context)) => {
                fields.pop();
                let ty = match fields.len() {
                    0 => Type::get_null(context),
                    1 => fields[0],
                    _ => Type::new_combination(context, fields),
                };
                (ty, true)
            }
            _ => (*self, false),
        }
    }

    pub fn contains_generic(&self, context: &Context) -> bool {
        match self.get_content(context) {
            TypeContent::Generic(_) => true,
            TypeContent::Slice(elem) | TypeContent::Channel(elem) => elem.contains_generic(context),
            TypeContent::Map(key, value) => {
                key.contains_generic(context) || value.contains_generic(context)
            }
            TypeContent::Object(ObjectType {
                kind: ObjectKind::Combination,
                fields,
                ..
            }) => fields.iter().any(|(_, ty)| ty.contains_generic(context)),
            TypeContent::Function(FunctionType { params, ret, .. }) => {
                params.iter().any(|ty| ty.contains_generic(context))
                    || ret.contains_generic(context)
            }
            _ => false,
        }
    }

    /// Replace every generic placeholder using `bindings`; unbound placeholders become `any`.
    pub fn substitute(&self, context: &mut Context, bindings: &FxHashMap<String, Type>) -> Type {
        if !self.contains_generic(context) {
            return *self;
        }
        match self.get_content(context).clone() {
            TypeContent::Generic(name) => bindings
                .get(&name)
                .copied()
                .unwrap_or_else(|| Type::get_any(context)),
            TypeContent::Slice(elem) => {
                let elem = elem.substitute(context, bindings);
                Type::new_slice(context, elem)
            }
            TypeContent::Channel(elem) => {
                let elem = elem.substitute(context, bindings);
                Type::new_channel(context, elem)
            }
            TypeContent::Map(key, value) => {
                let key = key.substitute(context, bindings);
                let value = value.substitute(context, bindings);
                Type::new_map(context, key, value)
            }
            TypeContent::Object(ObjectType {
                kind: ObjectKind::Combination,
                fields,
                ..
            }) => {
                let fields = fields
                    .into_iter()
                    .map(|(_, ty)| ty.substitute(context, bindings))
                    .collect();
                Type::new_combination(context, fields)
            }
            TypeContent::Function(FunctionType {
                params,
                ret,
                free_values,
                variadic,
            }) => {
                let params = params
                    .into_iter()
                    .map(|ty| ty.substitute(context, bindings))
                    .collect();
                let ret = ret.substitute(context, bindings);
                Type::new_function(
                    context,
                    FunctionType {
                        params,
                        ret,
                        free_values,
                        variadic,
                    },
                )
            }
            _ => *self,
        }
    }

    /// Whether a value of this type may be passed where `want` is declared.
    pub fn is_assignable_to(&self, context: &Context, want: &Type) -> bool {
        if self == want {
            return true;
        }
        match (self.get_content(context), want.get_content(context)) {
            (TypeContent::Any, _)
            | (_, TypeContent::Any)
            | (TypeContent::Null, _)
            | (TypeContent::Generic(_), _)
            | (_, TypeContent::Generic(_)) => true,
            (TypeContent::Slice(got), TypeContent::Slice(want))
            | (TypeContent::Channel(got), TypeContent::Channel(want)) => {
                got.is_assignable_to(context, want)
            }
            (TypeContent::Map(got_key, got_value), TypeContent::Map(want_key, want_value)) => {
                got_key.is_assignable_to(context, want_key)
                    && got_value.is_assignable_to(context, want_value)
            }
            (TypeContent::Function(_), TypeContent::Function(_)) => true,
            (TypeContent::Object(got), TypeContent::Object(want)) => {
                want.name.is_none() || got.name == want.name
            }
            _ => false,
        }
    }

    /// The type shared by every element of `types`: `None` when empty, `any` when they disagree.
    pub fn common(context: &Context, types: impl IntoIterator<Item = Type>) -> Option<Type> {
        let mut types = types.into_iter();
        let first = types.next()?;
        if types.all(|ty| ty == first) {
            Some(first)
        } else {
            Some(Type::get_any(context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn types_are_interned() {
        let mut context = Context::new();
        let number = Type::get_number(&context);
        let a = Type::new_slice(&mut context, number);
        let b = Type::new_slice(&mut context, number);
        assert_eq!(a, b);
        assert_eq!(a.as_string(&context), "[]number");
    }

    #[test]
    fn function_strings() {
        let mut context = Context::new();
        let number = Type::get_number(&context);
        let any = Type::get_any(&context);
        let error = Type::get_error(&context);
        let rest = Type::new_slice(&mut context, any);
        let ret = Type::new_combination(&mut context, vec![number, error]);
        let func = Type::new_function(
            &mut context,
            FunctionType {
                params: vec![number, rest],
                ret,
                free_values: Vec::new(),
                variadic: true,
            },
        );
        assert_eq!(
            func.as_string(&context),
            "fn(number, ...any) -> (number, error)"
        );
        assert_eq!(ret.as_string(&context), "number, error");
        assert_eq!(ret.return_arity(&context), 2);
    }

    #[test]
    fn dropping_errors() {
        let mut context = Context::new();
        let number = Type::get_number(&context);
        let string = Type::get_string(&context);
        let error = Type::get_error(&context);
        let pair = Type::new_combination(&mut context, vec![number, error]);
        assert_eq!(pair.without_error(&mut context), (number, true));
        let triple = Type::new_combination(&mut context, vec![number, string, error]);
        let (rest, dropped) = triple.without_error(&mut context);
        assert!(dropped);
        assert_eq!(rest.as_string(&context), "number, string");
        let null = Type::get_null(&context);
        assert_eq!(error.without_error(&mut context), (null, true));
        assert_eq!(number.without_error(&mut context), (number, false));
    }

    #[test]
    fn generics_substitute() {
        let mut context = Context::new();
        let t = Type::new_generic(&mut context, "T".to_string());
        let slice_t = Type::new_slice(&mut context, t);
        let mut bindings = FxHashMap::default();
        bindings.insert("T".to_string(), Type::get_string(&context));
        let concrete = slice_t.substitute(&mut context, &bindings);
        assert_eq!(concrete.as_string(&context), "[]string");
        let unbound = slice_t.substitute(&mut context, &FxHashMap::default());
        assert_eq!(unbound.as_string(&context), "[]any");
    }

    #[test]
    fn common_types() {
        let context = Context::new();
        let number = Type::get_number(&context);
        let string = Type::get_string(&context);
        assert_eq!(Type::common(&context, []), None);
        assert_eq!(Type::common(&context, [number, number]), Some(number));
        assert_eq!(
            Type::common(&context, [number, string]),
            Some(Type::get_any(&context))
        );
    }
}

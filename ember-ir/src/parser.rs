//! A parser for type descriptors, as written in extern symbol tables and in tests.
//!
//! ```text
//! number   []string   map[string]any   chan bytes   $T
//! fn(number, ...any) -> (number, error)
//! io.Reader
//! ```
//!
//! Primitive names have a few accepted spellings (`bool`/`boolean`, `int`/`float`/`number`,
//! `nil`/`null`).  Any other name refers to a named object type which is looked up by the caller;
//! see [`parse_type`].

use rustc_hash::FxHashMap;

use crate::{
    context::Context,
    error::IrError,
    irtype::{FunctionType, ObjectType, ObjectKind, Type},
};

/// A parsed, not yet interned, type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Any,
    Null,
    Boolean,
    Number,
    String,
    Bytes,
    Error,
    Slice(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Channel(Box<TypeDesc>),
    Generic(String),
    Function {
        params: Vec<TypeDesc>,
        variadic: bool,
        ret: Vec<TypeDesc>,
    },
    Named(String),
}

/// Parse a type descriptor without resolving it.
pub fn parse_type_desc(input: &str) -> Result<TypeDesc, IrError> {
    type_parser::type_desc(input).map_err(|err| {
        let found = input
            .get(err.location.offset..)
            .unwrap_or_default()
            .chars()
            .take(20)
            .collect::<String>();
        IrError::ParseFailure(err.expected.to_string(), found)
    })
}

/// Parse and intern a type descriptor.
///
/// Names which are not primitives are resolved through `named`.  An unknown name becomes an
/// empty struct type of that name, so it still compares equal to itself.
pub fn parse_type(
    context: &mut Context,
    input: &str,
    named: &FxHashMap<String, Type>,
) -> Result<Type, IrError> {
    let desc = parse_type_desc(input)?;
    Ok(resolve_type_desc(context, &desc, named))
}

pub fn resolve_type_desc(
    context: &mut Context,
    desc: &TypeDesc,
    named: &FxHashMap<String, Type>,
) -> Type {
    match desc {
        TypeDesc::Any => Type::get_any(context),
        TypeDesc::Null => Type::get_null(context),
        TypeDesc::Boolean => Type::get_bool(context),
        TypeDesc::Number => Type::get_number(context),
        TypeDesc::String => Type::get_string(context),
        TypeDesc::Bytes => Type::get_bytes(context),
        TypeDesc::Error => Type::get_error(context),
        TypeDesc::Slice(elem) => {
            let elem = resolve_type_desc(context, elem, named);
            Type::new_slice(context, elem)
        }
        TypeDesc::Map(key, value) => {
            let key = resolve_type_desc(context, key, named);
            let value = resolve_type_desc(context, value, named);
            Type::new_map(context, key, value)
        }
        TypeDesc::Channel(elem) => {
            let elem = resolve_type_desc(context, elem, named);
            Type::new_channel(context, elem)
        }
        TypeDesc::Generic(name) => Type::new_generic(context, name.clone()),
        TypeDesc::Function {
            params,
            variadic,
            ret,
        } => {
            let params = params
                .iter()
                .map(|param| resolve_type_desc(context, param, named))
                .collect();
            let mut ret = ret
                .iter()
                .map(|ty| resolve_type_desc(context, ty, named))
                .collect::<Vec<_>>();
            let ret = match ret.len() {
                0 => Type::get_null(context),
                1 => ret.remove(0),
                _ => Type::new_combination(context, ret),
            };
            Type::new_function(
                context,
                FunctionType {
                    params,
                    ret,
                    free_values: Vec::new(),
                    variadic: *variadic,
                },
            )
        }
        TypeDesc::Named(name) => match named.get(name) {
            Some(ty) => *ty,
            None => Type::new_object(
                context,
                ObjectType {
                    kind: ObjectKind::Struct,
                    name: Some(name.clone()),
                    fields: Vec::new(),
                    methods: Vec::new(),
                },
            ),
        },
    }
}

peg::parser! {
    grammar type_parser() for str {
        pub rule type_desc() -> TypeDesc
            = _ ty:ty() _ eoi() { ty }

        rule ty() -> TypeDesc
            = "[" _ "]" _ elem:ty() { TypeDesc::Slice(Box::new(elem)) }
            / "map" _ "[" _ key:ty() _ "]" _ value:ty() {
                TypeDesc::Map(Box::new(key), Box::new(value))
            }
            / "chan" __ elem:ty() { TypeDesc::Channel(Box::new(elem)) }
            / "$" name:ident() { TypeDesc::Generic(name) }
            / func()
            / name:dotted() { primitive(&name).unwrap_or(TypeDesc::Named(name)) }

        rule func() -> TypeDesc
            = "fn" _ "(" _ params:(param() ** comma()) _ ")" _ ret:ret()? {
                let variadic = params.last().is_some_and(|(spread, _)| *spread);
                let params = params
                    .into_iter()
                    .map(|(spread, ty)| if spread { TypeDesc::Slice(Box::new(ty)) } else { ty })
                    .collect();
                TypeDesc::Function { params, variadic, ret: ret.unwrap_or_default() }
            }

        rule param() -> (bool, TypeDesc)
            = "..." _ ty:ty() { (true, ty) }
            / ty:ty() { (false, ty) }

        rule ret() -> Vec<TypeDesc>
            = "->" _ "(" _ tys:(ty() ** comma()) _ ")" { tys }
            / "->" _ ty:ty() { vec![ty] }

        rule dotted() -> String
            = parts:(ident() ++ ".") { parts.join(".") }

        rule ident() -> String
            = id:$(id_char0() id_char()*) { id.to_owned() }

        rule id_char0()
            = quiet!{ ['A'..='Z' | 'a'..='z' | '_'] }

        rule id_char()
            = quiet!{ id_char0() / ['0'..='9'] }

        rule comma()
            = quiet!{ _ "," _ }

        rule _()
            = quiet!{ [' ' | '\t' | '\n' | '\r']* }

        rule __()
            = quiet!{ [' ' | '\t' | '\n' | '\r']+ }

        rule eoi()
            = ![_] / expected!("end of input")
    }
}

fn primitive(name: &str) -> Option<TypeDesc> {
    Some(match name {
        "any" => TypeDesc::Any,
        "null" | "nil" => TypeDesc::Null,
        "bool" | "boolean" => TypeDesc::Boolean,
        "number" | "int" | "float" => TypeDesc::Number,
        "string" => TypeDesc::String,
        "bytes" => TypeDesc::Bytes,
        "error" => TypeDesc::Error,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(context: &mut Context, input: &str) -> Type {
        parse_type(context, input, &FxHashMap::default()).unwrap()
    }

    #[test]
    fn primitives_and_containers() {
        let mut context = Context::new();
        assert_eq!(parse(&mut context, "int"), Type::get_number(&context));
        assert_eq!(parse(&mut context, "nil"), Type::get_null(&context));
        let ty = parse(&mut context, "map[string] []chan bool");
        assert_eq!(ty.as_string(&context), "map[string][]chan boolean");
    }

    #[test]
    fn function_signatures() {
        let mut context = Context::new();
        let ty = parse(&mut context, "fn(number, ...any) -> (number, error)");
        assert_eq!(ty.as_string(&context), "fn(number, ...any) -> (number, error)");
        let fn_ty = ty.get_function_type(&context).unwrap();
        assert!(fn_ty.variadic);
        assert_eq!(fn_ty.params.len(), 2);

        let ty = parse(&mut context, "fn()");
        assert_eq!(
            ty.get_function_type(&context).unwrap().ret,
            Type::get_null(&context)
        );
    }

    #[test]
    fn generics_and_named_types() {
        let mut context = Context::new();
        let ty = parse(&mut context, "fn([]$T, $T) -> $T");
        assert!(ty.contains_generic(&context));

        let reader = parse(&mut context, "io.Reader");
        assert_eq!(reader.as_string(&context), "io.Reader");
        assert_eq!(reader, parse(&mut context, "io.Reader"));

        let mut named = FxHashMap::default();
        named.insert("Conn".to_owned(), Type::get_string(&context));
        let conn = parse_type(&mut context, "[]Conn", &named).unwrap();
        assert_eq!(conn.as_string(&context), "[]string");
    }

    #[test]
    fn reports_failures() {
        let err = parse_type_desc("map[string").unwrap_err();
        assert!(matches!(err, IrError::ParseFailure(..)));
        assert!(parse_type_desc("[]number extra").is_err());
    }
}

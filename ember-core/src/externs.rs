//! Symbols provided by the host environment.
//!
//! A table is usually written in TOML:
//!
//! ```toml
//! [values]
//! println = "fn(...any)"
//! getRequest = "fn(string) -> (Response, error)"
//!
//! [libs.str]
//! Split = "fn(string, string) -> []string"
//!
//! [types.Response.fields]
//! StatusCode = "number"
//!
//! [types.Response.methods]
//! Body = "fn() -> (bytes, error)"
//! ```
//!
//! Types are written as descriptors, see [`ember_ir::parse_type`].  Named types are resolved in
//! declaration order, so a type may only refer to those declared before it.

use std::path::Path;

use ember_ir::{parse_type, Context, IrError, Type};
use ember_types::FxIndexMap;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExternError {
    #[error("failed to read extern table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed extern table: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A named host type, with its fields and methods.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExternType {
    #[serde(default)]
    pub fields: FxIndexMap<String, String>,
    #[serde(default)]
    pub methods: FxIndexMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExternTable {
    /// Global values, by name.
    #[serde(default)]
    pub values: FxIndexMap<String, String>,
    /// Library namespaces; each maps a member name to its type.
    #[serde(default)]
    pub libs: FxIndexMap<String, FxIndexMap<String, String>>,
    #[serde(default)]
    pub types: FxIndexMap<String, ExternType>,
}

impl ExternTable {
    pub fn from_toml_str(src: &str) -> Result<Self, ExternError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, ExternError> {
        let src = std::fs::read_to_string(path).map_err(|source| ExternError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    pub fn with_value(mut self, name: &str, ty: &str) -> Self {
        self.values.insert(name.to_owned(), ty.to_owned());
        self
    }

    pub fn with_lib(mut self, name: &str, members: &[(&str, &str)]) -> Self {
        self.libs.insert(
            name.to_owned(),
            members
                .iter()
                .map(|(member, ty)| ((*member).to_owned(), (*ty).to_owned()))
                .collect(),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.libs.is_empty() && self.types.is_empty()
    }

    /// Intern every symbol's type into `context`.
    pub fn resolve(&self, context: &mut Context) -> Result<ResolvedExterns, IrError> {
        let mut named = FxHashMap::default();
        for (name, ty) in &self.types {
            let fields = resolve_members(context, &ty.fields, &named)?;
            let methods = resolve_members(context, &ty.methods, &named)?;
            let resolved = Type::new_struct(context, name.clone(), fields, methods);
            named.insert(name.clone(), resolved);
        }

        let mut symbols = FxHashMap::default();
        for (name, desc) in &self.values {
            symbols.insert(name.clone(), parse_type(context, desc, &named)?);
        }
        for (name, members) in &self.libs {
            let members = resolve_members(context, members, &named)?;
            symbols.insert(name.clone(), Type::new_library(context, name.clone(), members));
        }
        Ok(ResolvedExterns { symbols, named })
    }
}

fn resolve_members(
    context: &mut Context,
    members: &FxIndexMap<String, String>,
    named: &FxHashMap<String, Type>,
) -> Result<Vec<(String, Type)>, IrError> {
    members
        .iter()
        .map(|(name, desc)| Ok((name.clone(), parse_type(context, desc, named)?)))
        .collect()
}

/// An [`ExternTable`] with its types interned into a [`Context`].
#[derive(Debug, Default)]
pub struct ResolvedExterns {
    symbols: FxHashMap<String, Type>,
    named: FxHashMap<String, Type>,
}

impl ResolvedExterns {
    pub fn get(&self, name: &str) -> Option<Type> {
        self.symbols.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// The named host types, for resolving types written in source.
    pub fn named_types(&self) -> &FxHashMap<String, Type> {
        &self.named
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::{ObjectKind, TypeContent};
    use pretty_assertions::assert_eq;

    const TABLE: &str = r#"
[values]
println = "fn(...any)"
getRequest = "fn(string) -> (Response, error)"

[libs.str]
Split = "fn(string, string) -> []string"

[types.Response.fields]
StatusCode = "number"

[types.Response.methods]
Body = "fn() -> (bytes, error)"
"#;

    #[test]
    fn loads_from_toml() {
        let table = ExternTable::from_toml_str(TABLE).unwrap();
        assert_eq!(table.values.len(), 2);
        assert_eq!(table.libs["str"]["Split"], "fn(string, string) -> []string");
        assert_eq!(table.types["Response"].methods["Body"], "fn() -> (bytes, error)");
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(ExternTable::from_toml_str("[globals]\nx = \"number\"\n").is_err());
    }

    #[test]
    fn resolves_named_types_and_libraries() {
        let table = ExternTable::from_toml_str(TABLE).unwrap();
        let mut context = Context::new();
        let externs = table.resolve(&mut context).unwrap();

        let get_request = externs.get("getRequest").unwrap();
        assert_eq!(
            get_request.as_string(&context),
            "fn(string) -> (Response, error)"
        );
        let str_lib = externs.get("str").unwrap();
        match str_lib.get_content(&context) {
            TypeContent::Object(object) => {
                assert_eq!(object.kind, ObjectKind::Library);
                assert!(object.get_field("Split").is_some());
            }
            other => panic!("unexpected type {other:?}"),
        }
        assert!(!externs.contains("Response"));
        assert!(externs.named_types().contains_key("Response"));
    }

    #[test]
    fn bad_descriptor_is_an_error() {
        let table = ExternTable::default().with_value("broken", "fn(number");
        let mut context = Context::new();
        assert!(matches!(
            table.resolve(&mut context),
            Err(IrError::ParseFailure(..))
        ));
    }
}

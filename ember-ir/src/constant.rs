//! [`Constant`] is a typed constant value.

use crate::{context::Context, irtype::Type};

/// A [`Type`] and constant value, including [`ConstantValue::Null`] for `nil`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub ty: Type,
    pub value: ConstantValue,
}

/// A constant representation of each of the supported [`Type`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Number(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Constant {
    /// Build a constant, deriving its type from the kind of `value`.
    pub fn new(context: &Context, value: ConstantValue) -> Self {
        let ty = match &value {
            ConstantValue::Null => Type::get_null(context),
            ConstantValue::Bool(_) => Type::get_bool(context),
            ConstantValue::Number(_) | ConstantValue::Float(_) => Type::get_number(context),
            ConstantValue::String(_) => Type::get_string(context),
            ConstantValue::Bytes(_) => Type::get_bytes(context),
        };
        Constant { ty, value }
    }

    pub fn new_null(context: &Context) -> Self {
        Self::new(context, ConstantValue::Null)
    }

    pub fn new_bool(context: &Context, value: bool) -> Self {
        Self::new(context, ConstantValue::Bool(value))
    }

    pub fn new_number(context: &Context, value: i64) -> Self {
        Self::new(context, ConstantValue::Number(value))
    }

    pub fn new_string(context: &Context, value: String) -> Self {
        Self::new(context, ConstantValue::String(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            ConstantValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_lit_string(&self) -> String {
        self.value.as_lit_string()
    }
}

impl ConstantValue {
    /// Compare by value; integers and floats compare numerically.
    pub fn eq_value(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantValue::Number(a), ConstantValue::Float(b))
            | (ConstantValue::Float(b), ConstantValue::Number(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    pub fn as_lit_string(&self) -> String {
        match self {
            ConstantValue::Null => "nil".into(),
            ConstantValue::Bool(b) => b.to_string(),
            ConstantValue::Number(n) => n.to_string(),
            ConstantValue::Float(f) => format!("{f:?}"),
            ConstantValue::String(s) => format!("{s:?}"),
            ConstantValue::Bytes(bs) => format!(
                "b\"{}\"",
                bs.iter()
                    .flat_map(|b| std::ascii::escape_default(*b))
                    .map(char::from)
                    .collect::<String>()
            ),
        }
    }
}

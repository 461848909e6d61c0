//! Value substrate (spec.md §9 re-architecture note).
//!
//! The source language is dynamically typed through reflection; Rust has
//! neither, so `Value` plays the role of "an instance of any mapped type"
//! and `TypeTag` plays the role of a reflected `Class<?>` / descriptor
//! character. Nothing here is spec behavior on its own — it is the typed
//! scaffolding the rest of the crate (mapper, descriptor, invoker) is built
//! on top of.

use std::fmt;

/// A decoded or about-to-be-encoded argument/return value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
    /// Payload produced by the auto-serializer (spec.md §4.3).
    Opaque { type_name: String, bytes: Vec<u8> },
    List(Vec<Value>),
    /// `ExceptionType: message`, spec.md §4.3's exception mapper.
    Exception { type_name: String, message: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// JVM-descriptor-style type marker (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeTag {
    Int,
    Long,
    Double,
    Float,
    Byte,
    Char,
    Short,
    Bool,
    Void,
    /// `L<dotted.class.name>;` — the name is stored dotted, not slashed.
    Object(String),
    Array(Box<TypeTag>),
}

impl TypeTag {
    /// The canonical name a mapper is registered under for this type.
    pub fn canonical_name(&self) -> String {
        match self {
            TypeTag::Int => "int".to_string(),
            TypeTag::Long => "long".to_string(),
            TypeTag::Double => "double".to_string(),
            TypeTag::Float => "float".to_string(),
            TypeTag::Byte => "byte".to_string(),
            TypeTag::Char => "char".to_string(),
            TypeTag::Short => "short".to_string(),
            TypeTag::Bool => "boolean".to_string(),
            TypeTag::Void => "void".to_string(),
            TypeTag::Object(name) => name.clone(),
            TypeTag::Array(inner) => format!("{}[]", inner.canonical_name()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, TypeTag::Object(_) | TypeTag::Array(_) | TypeTag::Void)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

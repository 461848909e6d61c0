//! Built-in mappers for primitives, their wrapper aliases, strings, the
//! null marker, and the exception text form (spec.md §4.3).

use std::sync::Arc;

use crate::{error::MapperError, mapper::Mapper, value::Value};

macro_rules! numeric_mapper {
    ($name:ident, $variant:ident, $ty:ty, $type_name:expr) => {
        pub struct $name;

        impl Mapper for $name {
            fn type_name(&self) -> &'static str {
                $type_name
            }

            fn encode(&self, value: &Value) -> Result<String, MapperError> {
                match value {
                    Value::$variant(v) => Ok(v.to_string()),
                    Value::Null => Ok(String::new()),
                    other => Err(MapperError::EncodeFailed {
                        type_name: $type_name.to_string(),
                        reason: format!("expected {}, found {:?}", $type_name, other),
                    }),
                }
            }

            fn decode(&self, text: &str) -> Result<Value, MapperError> {
                text.parse::<$ty>()
                    .map(Value::$variant)
                    .map_err(|e| MapperError::DecodeFailed {
                        type_name: $type_name.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

numeric_mapper!(IntMapper, Int, i32, "int");
numeric_mapper!(LongMapper, Long, i64, "long");
numeric_mapper!(ShortMapper, Short, i16, "short");
numeric_mapper!(ByteMapper, Byte, i8, "byte");
numeric_mapper!(FloatMapper, Float, f32, "float");
numeric_mapper!(DoubleMapper, Double, f64, "double");

pub struct BoolMapper;

impl Mapper for BoolMapper {
    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn encode(&self, value: &Value) -> Result<String, MapperError> {
        match value {
            Value::Bool(b) => Ok(if *b { "true".into() } else { "false".into() }),
            other => Err(MapperError::EncodeFailed {
                type_name: "boolean".to_string(),
                reason: format!("expected boolean, found {other:?}"),
            }),
        }
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(MapperError::DecodeFailed {
                type_name: "boolean".to_string(),
                reason: format!("expected true|false, found {other}"),
            }),
        }
    }
}

/// Single-character text; empty string decodes to NUL (spec.md §4.3).
pub struct CharMapper;

impl Mapper for CharMapper {
    fn type_name(&self) -> &'static str {
        "char"
    }

    fn encode(&self, value: &Value) -> Result<String, MapperError> {
        match value {
            Value::Char(c) => Ok(c.to_string()),
            other => Err(MapperError::EncodeFailed {
                type_name: "char".to_string(),
                reason: format!("expected char, found {other:?}"),
            }),
        }
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        let mut chars = text.chars();
        let Some(first) = chars.next() else {
            return Ok(Value::Char('\u{0}'));
        };
        if chars.next().is_some() {
            return Err(MapperError::DecodeFailed {
                type_name: "char".to_string(),
                reason: "more than one character".to_string(),
            });
        }
        Ok(Value::Char(first))
    }
}

/// `String` mapper: identity.
pub struct StringMapper;

impl Mapper for StringMapper {
    fn type_name(&self) -> &'static str {
        "java.lang.String"
    }

    fn encode(&self, value: &Value) -> Result<String, MapperError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Err(MapperError::EncodeFailed {
                type_name: "java.lang.String".to_string(),
                reason: format!("expected String, found {other:?}"),
            }),
        }
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        Ok(Value::Str(text.to_string()))
    }
}

/// The literal `NULL` sentinel used in V1 text; V2 uses the unambiguous `~`
/// array-element token instead (handled directly by the V2 parser).
pub struct NullMapper;

pub const NULL_MARKER_V1: &str = "NULL";

impl Mapper for NullMapper {
    fn type_name(&self) -> &'static str {
        "null"
    }

    fn encode(&self, _value: &Value) -> Result<String, MapperError> {
        Ok(NULL_MARKER_V1.to_string())
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        if text == NULL_MARKER_V1 {
            Ok(Value::Null)
        } else {
            Err(MapperError::DecodeFailed {
                type_name: "null".to_string(),
                reason: format!("expected {NULL_MARKER_V1}, found {text}"),
            })
        }
    }
}

/// `ExceptionType: message` concatenation. Decoding always succeeds: an
/// unresolvable type name on the consumer side still yields a generic
/// exception carrying the original name (spec.md §4.3 — "loses type
/// identity by default").
pub struct ExceptionMapper;

impl Mapper for ExceptionMapper {
    fn type_name(&self) -> &'static str {
        "java.lang.Throwable"
    }

    fn encode(&self, value: &Value) -> Result<String, MapperError> {
        match value {
            Value::Exception { type_name, message } => Ok(format!("{type_name}: {message}")),
            other => Err(MapperError::EncodeFailed {
                type_name: "java.lang.Throwable".to_string(),
                reason: format!("expected Exception, found {other:?}"),
            }),
        }
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        match text.split_once(": ") {
            Some((type_name, message)) => Ok(Value::Exception {
                type_name: type_name.to_string(),
                message: message.to_string(),
            }),
            None => Ok(Value::Exception {
                type_name: "java.lang.RuntimeException".to_string(),
                message: text.to_string(),
            }),
        }
    }
}

/// Fast text path for `T[]` where `T` is a primitive or `String` (spec.md
/// §4.3 decode-priority (i)): comma-joined element text, each element
/// produced/consumed by its own element mapper. Embedded commas inside a
/// `String` element are not escaped — a `String[]` whose elements may
/// contain commas should travel as a `java.util.List` instead, which goes
/// through the auto-serializer untruncated.
pub struct PrimitiveArrayMapper {
    element: Arc<dyn Mapper>,
}

impl PrimitiveArrayMapper {
    pub fn new(element: Arc<dyn Mapper>) -> Self {
        Self { element }
    }
}

impl Mapper for PrimitiveArrayMapper {
    fn type_name(&self) -> &'static str {
        "array"
    }

    fn encode(&self, value: &Value) -> Result<String, MapperError> {
        let Value::List(items) = value else {
            return Err(MapperError::EncodeFailed {
                type_name: "array".to_string(),
                reason: format!("expected an array-shaped List, found {value:?}"),
            });
        };
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(self.element.encode(item)?);
        }
        Ok(parts.join(","))
    }

    fn decode(&self, text: &str) -> Result<Value, MapperError> {
        if text.is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        let mut items = Vec::with_capacity(text.matches(',').count() + 1);
        for part in text.split(',') {
            items.push(self.element.decode(part)?);
        }
        Ok(Value::List(items))
    }
}

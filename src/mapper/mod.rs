//! Mapper registry (spec.md §4.3): a named registry of bidirectional
//! `<value> <-> <text>` converters, seeded with built-ins, with a
//! resolution policy for both encode and decode.

pub mod auto;
pub mod builtin;

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    error::MapperError,
    value::{TypeTag, Value},
};

/// Bidirectional converter between a typed value and its textual wire form.
pub trait Mapper: Send + Sync {
    fn type_name(&self) -> &str;
    fn encode(&self, value: &Value) -> Result<String, MapperError>;
    fn decode(&self, text: &str) -> Result<Value, MapperError>;
}

const COLLECTION_INTERFACES: &[&str] = &[
    "java.util.List",
    "java.util.Set",
    "java.util.Queue",
    "java.util.Map",
    "java.util.Collection",
    "java.util.Deque",
];

/// Per-server/per-client registry mapping `type-canonical-name -> mapper`.
/// Shared (`Arc`) and treated as immutable after publication (spec.md §5);
/// the inner map still allows registering additional mappers at setup time.
#[derive(Clone)]
pub struct MapperRegistry {
    by_name: Arc<DashMap<String, Arc<dyn Mapper>>>,
    auto: Arc<dyn Mapper>,
}

impl MapperRegistry {
    pub fn with_defaults() -> Self {
        let by_name = DashMap::new();
        let register = |name: &str, mapper: Arc<dyn Mapper>| {
            by_name.insert(name.to_string(), mapper);
        };

        register("int", Arc::new(builtin::IntMapper));
        register("java.lang.Integer", Arc::new(builtin::IntMapper));
        register("long", Arc::new(builtin::LongMapper));
        register("java.lang.Long", Arc::new(builtin::LongMapper));
        register("short", Arc::new(builtin::ShortMapper));
        register("java.lang.Short", Arc::new(builtin::ShortMapper));
        register("byte", Arc::new(builtin::ByteMapper));
        register("java.lang.Byte", Arc::new(builtin::ByteMapper));
        register("float", Arc::new(builtin::FloatMapper));
        register("java.lang.Float", Arc::new(builtin::FloatMapper));
        register("double", Arc::new(builtin::DoubleMapper));
        register("java.lang.Double", Arc::new(builtin::DoubleMapper));
        register("boolean", Arc::new(builtin::BoolMapper));
        register("java.lang.Boolean", Arc::new(builtin::BoolMapper));
        register("char", Arc::new(builtin::CharMapper));
        register("java.lang.Character", Arc::new(builtin::CharMapper));
        register("java.lang.String", Arc::new(builtin::StringMapper));
        register("null", Arc::new(builtin::NullMapper));
        register("java.lang.Throwable", Arc::new(builtin::ExceptionMapper));
        register("java.lang.Exception", Arc::new(builtin::ExceptionMapper));

        let auto: Arc<dyn Mapper> = Arc::new(auto::AutoMapper);
        for iface in COLLECTION_INTERFACES {
            register(iface, auto.clone());
        }

        Self {
            by_name: Arc::new(by_name),
            auto,
        }
    }

    /// Register (or replace) a user mapper by canonical type name.
    pub fn register(&self, type_name: impl Into<String>, mapper: Arc<dyn Mapper>) {
        self.by_name.insert(type_name.into(), mapper);
    }

    fn lookup(&self, type_name: &str) -> Option<Arc<dyn Mapper>> {
        self.by_name.get(type_name).map(|entry| entry.value().clone())
    }

    /// Whether an exact mapper is registered for this type — used by
    /// strict-mode registration validation (spec.md §4.8), not by the
    /// encode/decode resolution paths themselves.
    pub fn has_mapper(&self, tag: &TypeTag) -> bool {
        self.by_name.contains_key(&tag.canonical_name())
    }

    /// Encode-time resolution (spec.md §4.3): exact name (which already
    /// covers boxed-wrapper aliases and the registered collection
    /// interfaces), then the primitive/String array fast path, then the
    /// auto-serializer for object arrays and `Opaque`/`List` values, then
    /// failure.
    pub fn resolve_for_encode(&self, tag: &TypeTag, value: &Value) -> Result<Arc<dyn Mapper>, MapperError> {
        if let Some(mapper) = self.lookup(&tag.canonical_name()) {
            return Ok(mapper);
        }
        if let TypeTag::Array(inner) = tag {
            if is_fast_path_element(inner) {
                return Ok(Arc::new(builtin::PrimitiveArrayMapper::new(self.resolve_for_decode(inner))));
            }
            return Ok(self.auto.clone());
        }
        if matches!(value, Value::Opaque { .. } | Value::List(_)) {
            return Ok(self.auto.clone());
        }
        Err(MapperError::NotFound(tag.canonical_name()))
    }

    /// Decode-time resolution (V2 priority list, spec.md §4.3):
    /// (i) exact/primitive/String and arrays of those go through the fast
    /// text path, (ii) object arrays and (iv)/(v) collections/Serializable
    /// fall to the auto-serializer, (iii) any other user-registered exact
    /// mapper, (vi) fallback text (String) conversion.
    pub fn resolve_for_decode(&self, tag: &TypeTag) -> Arc<dyn Mapper> {
        if let Some(mapper) = self.lookup(&tag.canonical_name()) {
            return mapper;
        }
        match tag {
            TypeTag::Array(inner) if is_fast_path_element(inner) => {
                Arc::new(builtin::PrimitiveArrayMapper::new(self.resolve_for_decode(inner)))
            }
            TypeTag::Array(_) => self.auto.clone(),
            TypeTag::Object(_) => self.auto.clone(),
            _ => self.lookup("java.lang.String").expect("String mapper always registered"),
        }
    }
}

/// Spec.md §4.3 decode-priority (i): "arrays of primitives/String" go
/// through the fast text path; any other element type is treated as an
/// object array and falls to the auto-serializer (priority (ii)).
fn is_fast_path_element(tag: &TypeTag) -> bool {
    tag.is_primitive() || matches!(tag, TypeTag::Object(name) if name == "java.lang.String")
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_primitive_and_boxed_aliases_to_the_same_mapper() {
        let registry = MapperRegistry::with_defaults();
        let int_mapper = registry.resolve_for_encode(&TypeTag::Int, &Value::Int(5)).unwrap();
        assert_eq!(int_mapper.encode(&Value::Int(5)).unwrap(), "5");
        let boxed_mapper = registry
            .resolve_for_encode(&TypeTag::Object("java.lang.Integer".to_string()), &Value::Int(5))
            .unwrap();
        assert_eq!(boxed_mapper.encode(&Value::Int(5)).unwrap(), "5");
    }

    #[test]
    fn unregistered_non_opaque_type_fails_to_resolve() {
        let registry = MapperRegistry::with_defaults();
        let result = registry.resolve_for_encode(
            &TypeTag::Object("com.example.NoMapper".to_string()),
            &Value::Str("x".to_string()),
        );
        assert!(matches!(result, Err(MapperError::NotFound(_))));
    }

    #[test]
    fn primitive_array_resolves_to_the_fast_text_path_both_ways() {
        let registry = MapperRegistry::with_defaults();
        let tag = TypeTag::Array(Box::new(TypeTag::Int));
        let value = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let encode_mapper = registry.resolve_for_encode(&tag, &value).unwrap();
        let encoded = encode_mapper.encode(&value).unwrap();
        assert_eq!(encoded, "1,2");
        let decode_mapper = registry.resolve_for_decode(&tag);
        assert_eq!(decode_mapper.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn object_array_falls_back_to_auto_serializer() {
        let registry = MapperRegistry::with_defaults();
        let tag = TypeTag::Array(Box::new(TypeTag::Object("com.example.Point".to_string())));
        let mapper = registry.resolve_for_decode(&tag);
        assert_eq!(mapper.type_name(), "auto");
    }

    #[test]
    fn collection_interface_round_trips_a_list_value() {
        let registry = MapperRegistry::with_defaults();
        let tag = TypeTag::Object("java.util.List".to_string());
        let value = Value::List(vec![Value::Str("a".to_string()), Value::Int(3)]);
        let mapper = registry.resolve_for_encode(&tag, &value).unwrap();
        let encoded = mapper.encode(&value).unwrap();
        let decode_mapper = registry.resolve_for_decode(&tag);
        assert_eq!(decode_mapper.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn opaque_value_falls_back_to_auto_serializer() {
        let registry = MapperRegistry::with_defaults();
        let value = Value::Opaque {
            type_name: "com.example.NoMapper".to_string(),
            bytes: vec![1],
        };
        let mapper = registry
            .resolve_for_encode(&TypeTag::Object("com.example.NoMapper".to_string()), &value)
            .unwrap();
        assert!(mapper.encode(&value).is_ok());
    }
}

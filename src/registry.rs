//! Resource registry (spec.md §4.8, §3).
//!
//! The Rust stand-in for "reflective method lookup on a concrete resource
//! class": a `Resource` impl exposes a precomputed method table instead of
//! being scanned, and the registry maps canonical class/interface names to
//! either a per-request factory or a shared singleton (spec.md §9).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::{
    descriptor::MethodDescriptor,
    mapper::{auto::is_denied, MapperRegistry},
    value::{TypeTag, Value},
    error::InvokeError,
};

/// A remotely callable resource. `methods()` is the precomputed table
/// `find_method` searches; `invoke` performs the reflective call.
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn interfaces(&self) -> &'static [&'static str] {
        &[]
    }
    fn methods(&self) -> &'static [MethodDescriptor];
    /// `descriptor` is the resolved method's own `(...)` descriptor, passed
    /// back in so an overloaded `Resource` impl can dispatch on it without
    /// re-deriving it from `args`.
    fn invoke(&self, method: &str, descriptor: &str, args: Vec<Value>) -> Result<Value, InvokeError>;
}

/// `fn() -> Box<dyn Resource>`, the Rust equivalent of "class with a public
/// no-arg constructor" (spec.md §3 invariant).
pub type ResourceFactory = fn() -> Box<dyn Resource>;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("resource {class} has unsupported parameter/return types: {unsupported:?}")]
    UnsupportedTypes {
        class: String,
        unsupported: Vec<String>,
    },
}

struct ClassEntry {
    factory: ResourceFactory,
    methods: &'static [MethodDescriptor],
}

enum Registration {
    Class(Arc<ClassEntry>),
    Singleton(Arc<dyn Resource>),
}

/// Per-server map of `canonical-name -> class` and `canonical-name ->
/// singleton`; singleton wins when both are present (spec.md §3). Reads
/// take a stable snapshot (an `Arc` clone) so concurrent add/remove never
/// tears a single request's view (spec.md §5).
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    entries: Arc<DashMap<String, Registration>>,
}

/// What a successful lookup resolved to: either a fresh instance must be
/// constructed per call, or a shared singleton is reused (spec.md §3
/// invocation-context invariant).
pub enum Resolved {
    Factory(ResourceFactory, &'static [MethodDescriptor]),
    Singleton(Arc<dyn Resource>),
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-request class. `strict` rejects unsupported
    /// parameter/return types up front instead of warning (spec.md §4.8).
    pub fn add_resource(
        &self,
        factory: ResourceFactory,
        strict: bool,
        mappers: &MapperRegistry,
    ) -> Result<(), RegistrationError> {
        let probe = factory();
        let class_name = probe.type_name().to_string();
        let methods = probe.methods();
        let interfaces = probe.interfaces();
        drop(probe);

        Self::validate_methods(&class_name, methods, strict, mappers)?;

        let entry = Arc::new(ClassEntry { factory, methods });
        self.entries
            .insert(class_name.clone(), Registration::Class(entry.clone()));
        for iface in interfaces {
            self.entries
                .insert(iface.to_string(), Registration::Class(entry.clone()));
        }
        Ok(())
    }

    /// Register a shared singleton instance, stored under its class name and
    /// every implemented interface's canonical name (spec.md §4.8).
    pub fn add_singleton_resource(
        &self,
        instance: Arc<dyn Resource>,
        strict: bool,
        mappers: &MapperRegistry,
    ) -> Result<(), RegistrationError> {
        let class_name = instance.type_name().to_string();
        Self::validate_methods(&class_name, instance.methods(), strict, mappers)?;
        self.entries
            .insert(class_name, Registration::Singleton(instance.clone()));
        for iface in instance.interfaces() {
            self.entries
                .insert(iface.to_string(), Registration::Singleton(instance.clone()));
        }
        Ok(())
    }

    pub fn remove_resource(&self, class_name: &str) {
        self.entries.remove(class_name);
    }

    pub fn remove_singleton_resource(&self, class_name: &str) {
        self.entries.remove(class_name);
    }

    pub fn resolve(&self, class_name: &str) -> Option<Resolved> {
        match self.entries.get(class_name)?.value() {
            Registration::Singleton(instance) => Some(Resolved::Singleton(instance.clone())),
            Registration::Class(entry) => Some(Resolved::Factory(entry.factory, entry.methods)),
        }
    }

    /// spec.md §4.8: every parameter/return type must be "supported"
    /// (primitive, wrapper, `String`, array of those, a common collection
    /// interface, a type with a registered mapper, or serializable). A type
    /// with an exact mapper registered is supported regardless of whether
    /// its name happens to match the auto-serializer's deny-list prefixes —
    /// the deny-list only gates what may flow through the auto-serializer
    /// itself, it is not the definition of "unsupported". Anything left
    /// over is treated as supported via the auto-serializer's `Serializable`
    /// fallback unless it's explicitly denied.
    fn validate_methods(
        class_name: &str,
        methods: &[MethodDescriptor],
        strict: bool,
        mappers: &MapperRegistry,
    ) -> Result<(), RegistrationError> {
        let mut unsupported = Vec::new();
        for m in methods {
            for p in m.params.iter().chain(std::iter::once(&m.return_type)) {
                if let crate::descriptor::TypeTagStatic::Object(name) = p {
                    let tag = TypeTag::Object(name.to_string());
                    if mappers.has_mapper(&tag) {
                        continue;
                    }
                    if is_denied(name) {
                        unsupported.push(tag.canonical_name());
                    }
                }
            }
        }

        if unsupported.is_empty() {
            return Ok(());
        }
        if strict {
            Err(RegistrationError::UnsupportedTypes {
                class: class_name.to_string(),
                unsupported,
            })
        } else {
            for name in &unsupported {
                tracing::warn!(class = class_name, r#type = name, "unsupported type accepted in non-strict mode");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeTagStatic;

    struct Holder;
    impl Resource for Holder {
        fn type_name(&self) -> &'static str {
            "Holder"
        }
        fn methods(&self) -> &'static [MethodDescriptor] {
            const METHODS: &[MethodDescriptor] = &[MethodDescriptor {
                name: "get",
                params: &[],
                return_type: TypeTagStatic::Object("com.sun.Custom"),
            }];
            METHODS
        }
        fn invoke(&self, _method: &str, _descriptor: &str, _args: Vec<Value>) -> Result<Value, InvokeError> {
            unreachable!()
        }
    }

    struct Thrower;
    impl Resource for Thrower {
        fn type_name(&self) -> &'static str {
            "Thrower"
        }
        fn methods(&self) -> &'static [MethodDescriptor] {
            const METHODS: &[MethodDescriptor] = &[MethodDescriptor {
                name: "get",
                params: &[],
                return_type: TypeTagStatic::Object("java.lang.Runtime"),
            }];
            METHODS
        }
        fn invoke(&self, _method: &str, _descriptor: &str, _args: Vec<Value>) -> Result<Value, InvokeError> {
            unreachable!()
        }
    }

    #[test]
    fn strict_mode_accepts_a_denied_prefix_type_with_a_registered_mapper() {
        let mappers = MapperRegistry::with_defaults();
        mappers.register("com.sun.Custom", Arc::new(crate::mapper::builtin::StringMapper));
        let registry = ResourceRegistry::new();
        assert!(registry
            .add_singleton_resource(Arc::new(Holder), true, &mappers)
            .is_ok());
    }

    #[test]
    fn strict_mode_rejects_an_unmapped_denied_type() {
        let mappers = MapperRegistry::with_defaults();
        let registry = ResourceRegistry::new();
        let result = registry.add_singleton_resource(Arc::new(Thrower), true, &mappers);
        assert!(matches!(result, Err(RegistrationError::UnsupportedTypes { .. })));
    }

    #[test]
    fn non_strict_mode_accepts_an_unmapped_denied_type_with_a_warning() {
        let mappers = MapperRegistry::with_defaults();
        let registry = ResourceRegistry::new();
        assert!(registry
            .add_singleton_resource(Arc::new(Thrower), false, &mappers)
            .is_ok());
    }
}

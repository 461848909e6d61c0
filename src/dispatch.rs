//! Connection dispatcher (spec.md §4.9): per line, detect version, validate
//! trailers and identifiers, route to the matching parser + registry +
//! invoker + codec, and render the reply. Validation order follows spec.md
//! §4.1/§4.5: checksum, then signature, then the configured protocol-version
//! permission, then class-name shape, then whitelist, then method-name
//! shape, then class/method resolution, then argument decoding.

use crate::{
    codec,
    compression::CompressionConfig,
    config::ProtocolVersionPreference,
    descriptor::find_method,
    error::{MapperError, ParseError, SecurityError, TcpRestError},
    invoker::Invoker,
    mapper::MapperRegistry,
    parse::{peek_version, v1::parse_v1, v2::parse_v2, ProtocolVersion, RawElem},
    registry::ResourceRegistry,
    security::{self, SecurityConfig},
    value::{TypeTag, Value},
};

/// What the caller (the transport loop) should do once dispatch returns.
pub enum DispatchAction {
    /// Write this line back and keep the connection open.
    Reply(String),
    /// V1 has no error status codes: any failure before a reply can be
    /// rendered means logging the cause and closing the connection
    /// (spec.md §4.6, §4.9).
    CloseConnection,
}

/// Owns everything a connection needs to answer one request line. Cheap to
/// clone (every field is itself `Arc`-backed), so one instance is typically
/// shared across all connections on a server (spec.md §5).
#[derive(Clone)]
pub struct Dispatcher {
    pub resources: ResourceRegistry,
    pub mappers: MapperRegistry,
    pub security: SecurityConfig,
    pub compression: CompressionConfig,
    pub protocol_version: ProtocolVersionPreference,
    invoker: Invoker,
}

impl Dispatcher {
    pub fn new(
        resources: ResourceRegistry,
        mappers: MapperRegistry,
        security: SecurityConfig,
        compression: CompressionConfig,
        protocol_version: ProtocolVersionPreference,
    ) -> Self {
        Self {
            resources,
            mappers,
            security,
            compression,
            protocol_version,
            invoker: Invoker,
        }
    }

    /// Handle one complete request line and produce the action the
    /// transport loop should take.
    pub fn dispatch_line(&self, line: &str) -> DispatchAction {
        let split = security::split_trailing(line);
        if !security::verify_checksum(split.content.as_bytes(), split.checksum_segment, &self.security.checksum) {
            return self.protocol_failure(ProtocolVersion::V1, SecurityError::ChecksumMismatch.into());
        }
        let signed_payload = if split.checksum_segment.is_empty() {
            split.content.to_string()
        } else {
            format!("{}|{}", split.content, split.checksum_segment)
        };
        if let Err(e) = security::verify_signature_segment(
            signed_payload.as_bytes(),
            split.signature_segment,
            &self.security,
        ) {
            return self.protocol_failure(ProtocolVersion::V1, e.into());
        }

        let version = peek_version(split.content);
        let span = tracing::info_span!("dispatch", ?version);
        let _enter = span.enter();

        if !self.version_permitted(version) {
            return self.version_not_permitted(version);
        }

        match version {
            ProtocolVersion::V2 => self.dispatch_v2(split.content),
            ProtocolVersion::V1 => self.dispatch_v1(split.content),
        }
    }

    /// Server protocol mode gate (spec.md §4.9): a request whose version
    /// doesn't match the configured mode never reaches the parser.
    fn version_permitted(&self, version: ProtocolVersion) -> bool {
        match self.protocol_version {
            ProtocolVersionPreference::Auto => true,
            ProtocolVersionPreference::V1Only => version == ProtocolVersion::V1,
            ProtocolVersionPreference::V2Only => version == ProtocolVersion::V2,
        }
    }

    /// AUTO/V2-only modes reject a mismatched version with a V2
    /// PROTOCOL_ERROR reply; V1-only has no status codes, so it gets a
    /// best-effort textual error instead of the V2 envelope (spec.md §4.9).
    fn version_not_permitted(&self, version: ProtocolVersion) -> DispatchAction {
        tracing::warn!(?version, configured = ?self.protocol_version, "request protocol version not permitted");
        match self.protocol_version {
            ProtocolVersionPreference::V1Only => {
                DispatchAction::Reply("ERROR: this server only accepts legacy (V1) requests".to_string())
            }
            ProtocolVersionPreference::Auto | ProtocolVersionPreference::V2Only => DispatchAction::Reply(
                codec::encode_v2_protocol_error("protocol version not permitted by this server", &self.compression),
            ),
        }
    }

    fn dispatch_v2(&self, content: &str) -> DispatchAction {
        let Some(rest) = content.strip_prefix("V2|") else {
            return self.protocol_failure(ProtocolVersion::V2, ParseError::Malformed.into());
        };
        let request = match parse_v2(rest, &self.compression) {
            Ok(r) => r,
            Err(e) => return self.protocol_failure(ProtocolVersion::V2, e.into()),
        };

        if let Err(e) = self.validate_identifiers(&request.class_name, &request.method_name) {
            return self.protocol_failure(ProtocolVersion::V2, e.into());
        }

        let resolved = match self.resources.resolve(&request.class_name) {
            Some(r) => r,
            None => {
                return self.protocol_failure(
                    ProtocolVersion::V2,
                    ParseError::NoSuchClass(request.class_name.clone()).into(),
                )
            }
        };
        let methods = match &resolved {
            crate::registry::Resolved::Factory(_, methods) => methods,
            crate::registry::Resolved::Singleton(instance) => instance.methods(),
        };
        let method = match find_method(methods, &request.method_name, Some(&request.descriptor)) {
            Ok(m) => m,
            Err(e) => return self.protocol_failure(ProtocolVersion::V2, e.into()),
        };

        let raw_args = match request.raw_array.resolve(method.arity()) {
            Ok(a) => a,
            Err(e) => return self.protocol_failure(ProtocolVersion::V2, e.into()),
        };

        let args = match self.decode_args(method.params.iter().map(|p| p.to_owned_tag()), raw_args) {
            Ok(a) => a,
            Err(e) => return self.protocol_failure(ProtocolVersion::V2, e.into()),
        };

        let (outcome, result) = self.invoker.invoke(&resolved, method, args);
        match codec::encode_v2(outcome, &result, method, &self.mappers, &self.compression) {
            Ok(line) => DispatchAction::Reply(line),
            Err(e) => self.protocol_failure(ProtocolVersion::V2, TcpRestError::Mapper(e)),
        }
    }

    fn dispatch_v1(&self, content: &str) -> DispatchAction {
        let request = match parse_v1(content) {
            Ok(r) => r,
            Err(_) => return DispatchAction::CloseConnection,
        };

        if self.validate_identifiers(&request.class_name, &request.method_name).is_err() {
            return DispatchAction::CloseConnection;
        }

        let Some(resolved) = self.resources.resolve(&request.class_name) else {
            tracing::warn!(class = request.class_name, "V1 request for unknown class");
            return DispatchAction::CloseConnection;
        };
        let methods = match &resolved {
            crate::registry::Resolved::Factory(_, methods) => methods,
            crate::registry::Resolved::Singleton(instance) => instance.methods(),
        };
        // V1 has no overload resolution: first name match wins (spec.md §9).
        let Ok(method) = find_method(methods, &request.method_name, None) else {
            return DispatchAction::CloseConnection;
        };
        if request.raw_params.len() != method.arity() {
            return DispatchAction::CloseConnection;
        }

        let args = match self.decode_args(method.params.iter().map(|p| p.to_owned_tag()), request.raw_params) {
            Ok(a) => a,
            Err(_) => return DispatchAction::CloseConnection,
        };

        let (_outcome, result) = self.invoker.invoke(&resolved, method, args);
        match result {
            Ok(value) => {
                let tag = method.return_type.to_owned_tag();
                let rendered = if value.is_null() {
                    "null".to_string()
                } else {
                    match self.mappers.resolve_for_encode(&tag, &value).and_then(|m| m.encode(&value)) {
                        Ok(text) => text,
                        Err(_) => return DispatchAction::CloseConnection,
                    }
                };
                DispatchAction::Reply(codec::encode_v1(&rendered, &self.compression))
            }
            Err(e) => {
                tracing::warn!(error = %e, "V1 invocation failed, closing connection");
                DispatchAction::CloseConnection
            }
        }
    }

    fn validate_identifiers(&self, class_name: &str, method_name: &str) -> Result<(), SecurityError> {
        if !security::is_valid_class_name(class_name) {
            return Err(SecurityError::InvalidClassName(class_name.to_string()));
        }
        if let Some(whitelist) = &self.security.class_whitelist {
            if !whitelist.contains(class_name) {
                return Err(SecurityError::ClassNotWhitelisted(class_name.to_string()));
            }
        }
        if !security::is_valid_method_name(method_name) {
            return Err(SecurityError::InvalidMethodName(method_name.to_string()));
        }
        Ok(())
    }

    fn decode_args(
        &self,
        param_tags: impl Iterator<Item = TypeTag>,
        raw_args: Vec<RawElem>,
    ) -> Result<Vec<Value>, MapperError> {
        param_tags
            .zip(raw_args)
            .map(|(tag, elem)| match elem {
                RawElem::Null => Ok(Value::Null),
                RawElem::Text(text) => self.mappers.resolve_for_decode(&tag).decode(&text),
            })
            .collect()
    }

    fn protocol_failure(&self, version: ProtocolVersion, error: TcpRestError) -> DispatchAction {
        tracing::warn!(error = %error, status = ?error.status_code(), "request failed");
        match version {
            ProtocolVersion::V2 => DispatchAction::Reply(codec::encode_v2_error(&error, &self.compression)),
            ProtocolVersion::V1 => DispatchAction::CloseConnection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compression::CompressionConfig,
        descriptor::{MethodDescriptor, TypeTagStatic},
        error::InvokeError,
        registry::ResourceRegistry,
        security::SecurityConfig,
        value::Value,
    };

    struct Calculator;
    impl crate::registry::Resource for Calculator {
        fn type_name(&self) -> &'static str {
            "Calculator"
        }
        fn methods(&self) -> &'static [MethodDescriptor] {
            const METHODS: &[MethodDescriptor] = &[MethodDescriptor {
                name: "add",
                params: &[TypeTagStatic::Int, TypeTagStatic::Int],
                return_type: TypeTagStatic::Int,
            }];
            METHODS
        }
        fn invoke(&self, method: &str, _descriptor: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
            match method {
                "add" => {
                    let (Value::Int(a), Value::Int(b)) = (&args[0], &args[1]) else {
                        unreachable!()
                    };
                    Ok(Value::Int(a + b))
                }
                _ => unreachable!(),
            }
        }
    }

    fn dispatcher() -> Dispatcher {
        let mappers = MapperRegistry::with_defaults();
        let resources = ResourceRegistry::new();
        resources
            .add_singleton_resource(std::sync::Arc::new(Calculator), false, &mappers)
            .unwrap();
        Dispatcher::new(
            resources,
            mappers,
            SecurityConfig::default(),
            CompressionConfig::default(),
            crate::config::ProtocolVersionPreference::Auto,
        )
    }

    #[test]
    fn dispatches_v2_add_call() {
        let dispatcher = dispatcher();
        let line = "V2|0|{{Q2FsY3VsYXRvci9hZGQoSUkp}}|[NQ==,Mw==]";
        match dispatcher.dispatch_line(line) {
            DispatchAction::Reply(reply) => assert_eq!(reply, "V2|0|0|{{OA==}}"),
            DispatchAction::CloseConnection => panic!("expected a reply"),
        }
    }

    #[test]
    fn unknown_class_yields_protocol_error_on_v2() {
        let dispatcher = dispatcher();
        let line = "V2|0|{{Tm9wZS9ydW4oKQ==}}|[]";
        match dispatcher.dispatch_line(line) {
            DispatchAction::Reply(reply) => assert!(reply.starts_with("V2|0|3|")),
            DispatchAction::CloseConnection => panic!("expected a protocol-error reply"),
        }
    }

    #[test]
    fn legacy_v1_call_closes_on_unknown_class() {
        let dispatcher = dispatcher();
        match dispatcher.dispatch_line("Nope/run()") {
            DispatchAction::CloseConnection => {}
            DispatchAction::Reply(_) => panic!("V1 unknown class should close"),
        }
    }

    #[test]
    fn v2_only_server_rejects_a_legacy_v1_request() {
        let mappers = MapperRegistry::with_defaults();
        let resources = ResourceRegistry::new();
        resources
            .add_singleton_resource(std::sync::Arc::new(Calculator), false, &mappers)
            .unwrap();
        let dispatcher = Dispatcher::new(
            resources,
            mappers,
            SecurityConfig::default(),
            CompressionConfig::default(),
            crate::config::ProtocolVersionPreference::V2Only,
        );
        match dispatcher.dispatch_line("Calculator/add()") {
            DispatchAction::Reply(reply) => assert!(reply.starts_with("V2|0|3|")),
            DispatchAction::CloseConnection => panic!("expected a protocol-error reply"),
        }
    }

    #[test]
    fn v1_only_server_rejects_a_v2_request_with_a_textual_error() {
        let mappers = MapperRegistry::with_defaults();
        let resources = ResourceRegistry::new();
        resources
            .add_singleton_resource(std::sync::Arc::new(Calculator), false, &mappers)
            .unwrap();
        let dispatcher = Dispatcher::new(
            resources,
            mappers,
            SecurityConfig::default(),
            CompressionConfig::default(),
            crate::config::ProtocolVersionPreference::V1Only,
        );
        let line = "V2|0|{{Q2FsY3VsYXRvci9hZGQoSUkp}}|[NQ==,Mw==]";
        match dispatcher.dispatch_line(line) {
            DispatchAction::Reply(reply) => assert!(!reply.starts_with("V2|")),
            DispatchAction::CloseConnection => panic!("expected a textual error reply"),
        }
    }
}

//! Client-side call surface (spec.md §4.10, §9).
//!
//! The source platform builds per-interface dynamic proxies at runtime;
//! Rust has no reflection to build one generically, so `Client::call` plays
//! that role directly: given a `MethodDescriptor` and argument `Value`s, it
//! builds the V2 frame, round-trips it over a blocking TCP connection, and
//! decodes the reply — the same descriptor table a generated proxy method
//! would have closed over.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

use crate::{
    codec::{self, ResponseBody},
    compression,
    config::ClientConfig,
    descriptor::MethodDescriptor,
    error::ParseError,
    mapper::MapperRegistry,
    security,
    value::Value,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Mapper(#[from] crate::error::MapperError),
    #[error(transparent)]
    Security(#[from] crate::error::SecurityError),
    #[error("remote business exception {type_name}: {message}")]
    Business { type_name: String, message: String },
    #[error("remote server error {type_name}: {message}")]
    Server { type_name: String, message: String },
    #[error("remote protocol error: {0}")]
    Protocol(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// A connected client able to invoke resource methods against one server
/// (spec.md §3: "construct with interface/host/port/mappers/tls/compression/
/// security"). TLS is interfaced via `TcpStream` wrapping left to the
/// caller's transport layer (spec.md §4.10 Non-goals).
pub struct Client {
    config: ClientConfig,
    mappers: MapperRegistry,
}

impl Client {
    pub fn new(config: ClientConfig, mappers: MapperRegistry) -> Self {
        Self { config, mappers }
    }

    /// Invoke `class_name.method(args)` and decode the reply against the
    /// method's declared return type.
    pub fn call(
        &self,
        class_name: &str,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<Value, ClientError> {
        let request_line = self.build_request(class_name, method, args)?;

        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))?;
        if let Some(timeout) = self.config.call_timeout {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }
        stream.write_all(request_line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut reply = String::new();
        match reader.read_line(&mut reply) {
            Ok(0) => return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed").into()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(ClientError::Timeout(self.config.call_timeout.unwrap_or_default()))
            }
            Err(e) => return Err(e.into()),
        }
        while reply.ends_with('\n') || reply.ends_with('\r') {
            reply.pop();
        }

        self.decode_reply(&reply, method)
    }

    fn build_request(
        &self,
        class_name: &str,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<String, ClientError> {
        let meta = format!("{class_name}/{}{}", method.name, method.descriptor());
        let meta_b64 = security::meta_encode(meta.as_bytes());

        let mut elements = Vec::with_capacity(args.len());
        for (tag, value) in method.params.iter().map(|p| p.to_owned_tag()).zip(args) {
            if value.is_null() {
                elements.push("~".to_string());
            } else {
                let mapper = self.mappers.resolve_for_encode(&tag, value)?;
                let text = mapper.encode(value)?;
                elements.push(security::meta_encode(text.as_bytes()));
            }
        }
        let array_part = format!("[{}]", elements.join(","));
        let payload = format!("{{{{{meta_b64}}}}}|{array_part}");
        let envelope = compression::encode(payload.as_bytes(), &self.config.compression);
        let mut content = format!("V2|{envelope}");

        let chk = security::checksum(content.as_bytes(), &self.config.security.checksum);
        if !chk.is_empty() {
            content = format!("{content}|{chk}");
        }
        let sig = security::signature(content.as_bytes(), &self.config.security)?;
        if !sig.is_empty() {
            content = format!("{content}|{sig}");
        }
        Ok(content)
    }

    fn decode_reply(&self, reply: &str, method: &MethodDescriptor) -> Result<Value, ClientError> {
        let split = security::split_trailing(reply);
        if !security::verify_checksum(split.content.as_bytes(), split.checksum_segment, &self.config.security.checksum) {
            return Err(crate::error::SecurityError::ChecksumMismatch.into());
        }
        let signed_payload = if split.checksum_segment.is_empty() {
            split.content.to_string()
        } else {
            format!("{}|{}", split.content, split.checksum_segment)
        };
        security::verify_signature_segment(signed_payload.as_bytes(), split.signature_segment, &self.config.security)?;

        let rest = split
            .content
            .strip_prefix("V2|")
            .ok_or(ParseError::UnsupportedVersion)?;
        let return_tag = method.return_type.to_owned_tag();
        let body = codec::decode_v2(rest, &return_tag, &self.mappers, &self.config.compression)?;
        match body {
            ResponseBody::Success(value) => Ok(value),
            ResponseBody::Business { type_name, message } => Err(ClientError::Business { type_name, message }),
            ResponseBody::Server { type_name, message } => Err(ClientError::Server { type_name, message }),
            ResponseBody::Protocol(message) => Err(ClientError::Protocol(message)),
        }
    }
}

//! Typed configuration surface mirroring the server/client setup calls in
//! spec.md §3 ("Security configuration", "Compression configuration",
//! protocol version, strict type checking).

use crate::{compression::CompressionConfig, security::SecurityConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersionPreference {
    /// Accept both; version is detected per line (spec.md §4.9 default).
    Auto,
    V1Only,
    V2Only,
}

impl Default for ProtocolVersionPreference {
    fn default() -> Self {
        ProtocolVersionPreference::Auto
    }
}

/// Everything a server needs before it calls `up()` (spec.md §3).
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub security: SecurityConfig,
    pub compression: CompressionConfig,
    pub protocol_version: ProtocolVersionPreference,
    pub strict_type_check: bool,
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            security: SecurityConfig::default(),
            compression: CompressionConfig::default(),
            protocol_version: ProtocolVersionPreference::default(),
            strict_type_check: false,
            max_frame_bytes: 1_048_576,
        }
    }
}

/// Everything a client needs to construct a resource proxy (spec.md §3, §4.10).
#[derive(Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub security: SecurityConfig,
    pub compression: CompressionConfig,
    pub protocol_version: ProtocolVersionPreference,
    pub call_timeout: Option<std::time::Duration>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: SecurityConfig::default(),
            compression: CompressionConfig::default(),
            protocol_version: ProtocolVersionPreference::V2Only,
            call_timeout: None,
        }
    }
}

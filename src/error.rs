//! Exception taxonomy (spec.md §4.11, §7).
//!
//! Five kinds, each with its own wire status code and retry semantics.
//! `TcpRestError` is the dispatcher-facing sum type; callers that only care
//! about one subsystem can match on `SecurityError`/`MapperError`/etc.
//! directly since those also implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// V2 status code attached to every response (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    BusinessException = 1,
    ServerError = 2,
    ProtocolError = 3,
}

impl StatusCode {
    pub fn as_digit(self) -> char {
        (b'0' + self as u8) as char
    }

    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(StatusCode::Success),
            '1' => Some(StatusCode::BusinessException),
            '2' => Some(StatusCode::ServerError),
            '3' => Some(StatusCode::ProtocolError),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("invalid base64 component")]
    InvalidComponent,
    #[error("checksum verification failed")]
    ChecksumMismatch,
    #[error("signature segment missing")]
    SignatureMissing,
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("invalid class name: {0}")]
    InvalidClassName(String),
    #[error("invalid method name: {0}")]
    InvalidMethodName(String),
    #[error("class not in whitelist: {0}")]
    ClassNotWhitelisted(String),
    #[error("decompressed size exceeded limit")]
    DecompressedSizeExceeded,
}

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("no mapper registered for type {0}")]
    NotFound(String),
    #[error("failed to decode value of type {type_name}: {reason}")]
    DecodeFailed { type_name: String, reason: String },
    #[error("failed to encode value as type {type_name}: {reason}")]
    EncodeFailed { type_name: String, reason: String },
    #[error("opaque type rejected by deny-list: {0}")]
    DeniedType(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed frame")]
    Malformed,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("parameter count {found} does not match method arity {expected}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("no method named {0}")]
    NoSuchMethod(String),
    #[error("class not found: {0}")]
    NoSuchClass(String),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("class {0} is not instantiable")]
    NotInstantiable(String),
    #[error("business exception: {type_name}: {message}")]
    Business { type_name: String, message: String },
    #[error("server error: {type_name}: {message}")]
    Server { type_name: String, message: String },
}

/// Dispatcher-facing union of every subsystem's failure, each carrying the
/// `StatusCode` it renders as on the wire (spec.md §4.11 table).
#[derive(Debug, Error)]
pub enum TcpRestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
}

impl TcpRestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TcpRestError::Parse(ParseError::Security(_)) => StatusCode::ServerError,
            TcpRestError::Parse(ParseError::Mapper(_)) => StatusCode::ServerError,
            TcpRestError::Parse(_) => StatusCode::ProtocolError,
            TcpRestError::Invoke(InvokeError::Business { .. }) => StatusCode::BusinessException,
            // Class not instantiable (abstract, no default ctor, ctor throws)
            // is a protocol-level failure, not a server-side fault (spec.md §4.7).
            TcpRestError::Invoke(InvokeError::NotInstantiable(_)) => StatusCode::ProtocolError,
            TcpRestError::Invoke(_) => StatusCode::ServerError,
            TcpRestError::Security(_) => StatusCode::ServerError,
            TcpRestError::Mapper(_) => StatusCode::ServerError,
        }
    }

    /// Whether a caller may retry; business exceptions are the only kind
    /// retryable at the caller's discretion (spec.md §4.11).
    pub fn retryable(&self) -> bool {
        matches!(self, TcpRestError::Invoke(InvokeError::Business { .. }))
    }
}

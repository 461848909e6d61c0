//! TcpRest: a line-oriented, text-framed RPC substrate.
//!
//! A request is one line of text naming a class, a method (with, on the V2
//! wire, a full parameter descriptor for overload resolution), and a
//! parameter array; a reply is one line carrying a status code and a
//! mapper-encoded result or exception. Two wire versions coexist: V1 (no
//! overload support, legacy Base64 framing) and V2 (descriptor-based
//! resolution, compression envelope, pluggable checksums and signatures).
//!
//! See [`dispatch::Dispatcher`] for the piece that ties parsing, the mapper
//! registry, the resource registry, and the invoker together; [`server`]
//! and [`client`] are the process-facing surfaces built on top of it.

pub mod client;
pub mod codec;
pub mod compression;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod invoker;
pub mod mapper;
pub mod parse;
pub mod registry;
pub mod security;
pub mod server;
pub mod transport;
pub mod value;

pub use client::{Client, ClientError};
pub use config::{ClientConfig, ProtocolVersionPreference, ServerConfig};
pub use descriptor::MethodDescriptor;
pub use dispatch::Dispatcher;
pub use error::{StatusCode, TcpRestError};
pub use registry::{Resource, ResourceFactory, ResourceRegistry};
pub use server::{Server, ServerHandle};
pub use value::{TypeTag, Value};

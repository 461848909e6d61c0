//! Server-facing surface (spec.md §3): register resources and mappers,
//! configure security/compression/strictness, then `up()`/`down()`.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::{
    config::ServerConfig,
    dispatch::Dispatcher,
    mapper::{Mapper, MapperRegistry},
    registry::{RegistrationError, Resource, ResourceFactory, ResourceRegistry},
    transport::{serve_connection, TcpTransport},
};

/// A running server instance. Dropping this without calling `down()` leaves
/// the accept thread running in the background until the process exits.
pub struct ServerHandle {
    local_addr: std::net::SocketAddr,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. In-flight connections finish their
    /// current request before noticing (spec.md §4.9: no cooperative
    /// cancellation of in-progress invocations).
    pub fn down(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Builds up a `Dispatcher` before handing control to `up()`.
pub struct Server {
    config: ServerConfig,
    resources: ResourceRegistry,
    mappers: MapperRegistry,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            resources: ResourceRegistry::new(),
            mappers: MapperRegistry::with_defaults(),
        }
    }

    pub fn add_resource(&self, factory: ResourceFactory) -> Result<(), RegistrationError> {
        self.resources.add_resource(factory, self.config.strict_type_check, &self.mappers)
    }

    pub fn add_singleton_resource(&self, instance: Arc<dyn Resource>) -> Result<(), RegistrationError> {
        self.resources
            .add_singleton_resource(instance, self.config.strict_type_check, &self.mappers)
    }

    pub fn remove_resource(&self, class_name: &str) {
        self.resources.remove_resource(class_name);
    }

    pub fn remove_singleton_resource(&self, class_name: &str) {
        self.resources.remove_singleton_resource(class_name);
    }

    pub fn add_mapper(&self, type_name: impl Into<String>, mapper: Arc<dyn Mapper>) {
        self.mappers.register(type_name, mapper);
    }

    pub fn set_security_config(&mut self, security: crate::security::SecurityConfig) {
        self.config.security = security;
    }

    pub fn set_compression_config(&mut self, compression: crate::compression::CompressionConfig) {
        self.config.compression = compression;
    }

    pub fn set_strict_type_check(&mut self, strict: bool) {
        self.config.strict_type_check = strict;
    }

    pub fn set_protocol_version(&mut self, preference: crate::config::ProtocolVersionPreference) {
        self.config.protocol_version = preference;
    }

    /// Bind and start accepting connections on a background thread, one
    /// thread per connection (spec.md §5 concurrency model: the registry and
    /// mapper table are shared read-mostly state across connections).
    pub fn up(self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher::new(
            self.resources,
            self.mappers,
            self.config.security,
            self.config.compression,
            self.config.protocol_version,
        );

        listener.set_nonblocking(true)?;
        let stop_clone = stop.clone();
        let accept_thread = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        let dispatcher = dispatcher.clone();
                        std::thread::spawn(move || {
                            let _ = stream.set_nonblocking(false);
                            tracing::info!(%peer, "connection accepted");
                            match TcpTransport::new(stream) {
                                Ok(mut transport) => {
                                    if let Err(err) = serve_connection(&dispatcher, &mut transport) {
                                        tracing::warn!(%err, %peer, "connection ended with error");
                                    }
                                }
                                Err(err) => tracing::warn!(%err, %peer, "failed to wrap accepted stream"),
                            }
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(err) => {
                        tracing::error!(%err, "accept failed");
                        break;
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            stop,
            accept_thread: Some(accept_thread),
        })
    }
}

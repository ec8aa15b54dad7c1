//! Application state

use crate::config::GatewayConfig;
use crate::resolver::ConnectionIdentity;
use crate::{ApiError, S3ErrorCode};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use s3mux_backend::{MemoryBackend, ObjectBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Backends keyed by connection name
pub struct BackendRegistry {
    backends: DashMap<String, Arc<dyn ObjectBackend>>,
    auto_provision: bool,
    /// Cap on backends created on first use
    max_auto_connections: usize,
    provisioned: AtomicUsize,
    multipart_expiry_secs: u64,
}

impl BackendRegistry {
    pub fn new(
        auto_provision: bool,
        max_auto_connections: usize,
        multipart_expiry_secs: u64,
    ) -> Self {
        Self {
            backends: DashMap::new(),
            auto_provision,
            max_auto_connections,
            provisioned: AtomicUsize::new(0),
            multipart_expiry_secs,
        }
    }

    /// Register (or replace) the backend serving `name`
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn ObjectBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ObjectBackend>> {
        self.backends.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Look up a backend, provisioning an in-memory one when allowed
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ObjectBackend>, ApiError> {
        if let Some(backend) = self.get(name) {
            return Ok(backend);
        }

        let unknown = || {
            ApiError::s3(
                S3ErrorCode::AccessDenied,
                format!("Unknown connection: {}", name),
            )
        };
        if !self.auto_provision {
            return Err(unknown());
        }

        match self.backends.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let reserved = self
                    .provisioned
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < self.max_auto_connections).then_some(n + 1)
                    });
                let Ok(previous) = reserved else {
                    warn!(
                        connection = %name,
                        limit = self.max_auto_connections,
                        "Auto-provisioned connection limit reached"
                    );
                    return Err(unknown());
                };

                warn!(
                    connection = %name,
                    provisioned = previous + 1,
                    "Provisioning in-memory backend for unknown connection"
                );
                let backend: Arc<dyn ObjectBackend> =
                    Arc::new(MemoryBackend::with_multipart_expiry(self.multipart_expiry_secs));
                entry.insert(backend.clone());
                Ok(backend)
            }
        }
    }

    /// Registered connection names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// A resolved connection and the backend serving it
#[derive(Clone)]
pub struct Connection {
    pub identity: ConnectionIdentity,
    pub backend: Arc<dyn ObjectBackend>,
}

impl Connection {
    pub fn name(&self) -> &str {
        self.identity.as_str()
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Backends per connection
    pub backends: BackendRegistry,
}

impl AppState {
    /// Create state with in-memory backends for every configured connection
    pub fn new(config: GatewayConfig) -> Self {
        let backends = BackendRegistry::new(
            config.auto_provision_connections,
            config.max_auto_connections,
            config.multipart_expiry_secs,
        );
        for name in &config.connections {
            backends.register(
                name.clone(),
                Arc::new(MemoryBackend::with_multipart_expiry(config.multipart_expiry_secs)),
            );
        }
        if let Some(default) = &config.default_connection {
            if backends.get(default).is_none() {
                backends.register(
                    default.clone(),
                    Arc::new(MemoryBackend::with_multipart_expiry(config.multipart_expiry_secs)),
                );
            }
        }

        info!(connections = ?backends.names(), "Backend registry ready");
        Self { config, backends }
    }

    /// Bind a request to its backend, falling back to the default connection
    pub fn connect(&self, resolved: Option<&ConnectionIdentity>) -> Result<Connection, ApiError> {
        let identity = resolved
            .cloned()
            .or_else(|| {
                self.config
                    .default_connection
                    .as_deref()
                    .map(ConnectionIdentity::new)
            })
            .ok_or_else(|| {
                ApiError::s3(
                    S3ErrorCode::MissingParameter,
                    "ConnectionName parameter is required",
                )
            })?;

        let backend = self.backends.resolve(identity.as_str())?;
        Ok(Connection { identity, backend })
    }
}

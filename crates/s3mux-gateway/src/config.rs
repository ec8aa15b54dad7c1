//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "S3MUX";

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Connection used when a request names none
    pub default_connection: Option<String>,
    /// Connections registered with an in-memory backend at startup
    pub connections: Vec<String>,
    /// Create an in-memory backend for unknown connection names on first use
    pub auto_provision_connections: bool,
    /// Most connections created on first use; further unknown names get AccessDenied
    pub max_auto_connections: usize,
    /// Region used when CreateBucket carries no location constraint
    pub default_region: String,
    /// Rate limit (requests per second per connection)
    pub rate_limit_rps: u32,
    /// Maximum buffered request body size (bytes)
    pub max_body_size: usize,
    /// Multipart upload expiry (seconds)
    pub multipart_expiry_secs: u64,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            default_connection: None,
            connections: Vec::new(),
            auto_provision_connections: true,
            max_auto_connections: 1024,
            default_region: "us-east-1".to_string(),
            rate_limit_rps: 100,
            max_body_size: 5 * 1024 * 1024 * 1024, // 5 GB
            multipart_expiry_secs: 24 * 60 * 60, // 24 hours
            cors_enabled: true,
        }
    }
}

impl GatewayConfig {
    /// Load defaults, then an optional config file, then `S3MUX_*` environment variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("connections"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

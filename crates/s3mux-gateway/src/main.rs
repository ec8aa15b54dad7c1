//! s3mux gateway - S3-compatible protocol gateway

use clap::Parser;
use s3mux_gateway::{run_server_with_shutdown, GatewayConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "s3mux-gateway")]
#[command(about = "S3-compatible gateway multiplexing connections onto storage backends")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "S3MUX_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "S3MUX_PORT")]
    port: Option<u16>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "S3MUX_CONFIG")]
    config: Option<PathBuf>,

    /// Connection used when a request names none
    #[arg(long, env = "S3MUX_DEFAULT_CONNECTION")]
    default_connection: Option<String>,

    /// Reject connection names that are not configured
    #[arg(long, env = "S3MUX_NO_AUTO_PROVISION")]
    no_auto_provision: bool,

    /// Enable debug logging
    #[arg(short, long, env = "S3MUX_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "s3mux_gateway={level},s3mux_backend={level},tower_http=debug",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.default_connection.is_some() {
        config.default_connection = args.default_connection;
    }
    if args.no_auto_provision {
        config.auto_provision_connections = false;
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        default_connection = ?config.default_connection,
        connections = ?config.connections,
        "Starting s3mux gateway"
    );
    if config.auto_provision_connections {
        tracing::warn!(
            limit = config.max_auto_connections,
            "Unknown connection names get a fresh in-memory backend"
        );
    }

    run_server_with_shutdown(config, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
}

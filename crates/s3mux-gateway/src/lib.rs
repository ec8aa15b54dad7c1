//! # s3mux gateway
//!
//! S3-compatible protocol gateway in front of pluggable storage backends.
//!
//! This crate provides:
//! - **S3 API**: bucket and object CRUD, versioning, CORS, multipart upload, batch delete
//! - **Connections**: each request is bound to a named backend via SigV4 credentials,
//!   the `ConnectionName` parameter, or the `x-connection-name` header
//! - **Rate Limiting**: per-connection request throttling
//! - **Error envelope**: AWS-style XML errors with request ids
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │       (AWS CLI, SDKs, S3 Browser, curl, etc.)       │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                   s3mux gateway                     │
//! ├─────────────────────────────────────────────────────┤
//! │ Connection Resolver │ Rate Limiter │ Intent Router  │
//! ├─────────────────────────────────────────────────────┤
//! │   Bucket │ Object │ Multipart │ Batch Delete        │
//! ├─────────────────────────────────────────────────────┤
//! │                   s3mux-backend                     │
//! │               (ObjectBackend trait)                 │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod resolver;
pub mod router;
pub mod routes;
pub mod server;
pub mod state;
pub mod xml;

pub use config::GatewayConfig;
pub use error::{ApiError, S3ErrorCode};
pub use server::{run_server, run_server_with_shutdown, serve};
pub use state::AppState;

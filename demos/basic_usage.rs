//! Basic usage of the s3mux backend and gateway
//!
//! Run with: cargo run --example basic_usage

use bytes::Bytes;
use s3mux_backend::{collect_stream, stream_from_bytes, MemoryBackend, ObjectBackend, ObjectUpload};
use s3mux_gateway::{serve, GatewayConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== s3mux basic usage ===\n");

    // 1. Talk to a backend directly
    let backend = MemoryBackend::new();
    backend.create_bucket("my-bucket", "us-east-1").await?;
    println!("✓ Created bucket: my-bucket");

    let info = backend
        .put_object(
            "my-bucket",
            "hello.txt",
            stream_from_bytes(Bytes::from_static(b"Hello, s3mux!")),
            ObjectUpload {
                content_type: Some("text/plain".to_string()),
                ..Default::default()
            },
        )
        .await?;
    println!("✓ Stored hello.txt ({} bytes, etag {})", info.size, info.etag);

    let object = backend.get_object_stream("my-bucket", "hello.txt").await?;
    let data = collect_stream(object.body).await?;
    println!("✓ Read back: {}", String::from_utf8_lossy(&data));

    // 2. Serve the S3 API on a local port
    let config = GatewayConfig {
        host: "127.0.0.1".to_string(),
        default_connection: Some("demo".to_string()),
        ..Default::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    println!("\n✓ Gateway listening on http://{}", addr);
    println!("  Try: aws --endpoint-url http://{} s3 mb s3://photos", addr);
    println!("  Press Ctrl+C to stop");

    serve(listener, config, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
}

//! HTTP middleware for connection resolution, rate limiting, etc.

use crate::resolver::{resolve_connection, ConnectionIdentity};
use crate::router::QueryParams;
use crate::{ApiError, AppState, S3ErrorCode};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use governor::{state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type
pub type KeyedRateLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// Create a rate limiter; zero is treated as one request per second
pub fn create_rate_limiter(requests_per_second: u32) -> Arc<KeyedRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_second(rps)))
}

/// Connection identity resolved from the request, if any
#[derive(Clone, Debug, Default)]
pub struct ResolvedConnection(pub Option<ConnectionIdentity>);

/// Resolve the connection identity once per request
pub async fn connection_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let params = QueryParams::parse(request.uri().query());
    let identity = resolve_connection(request.headers(), &params).or_else(|| {
        state
            .config
            .default_connection
            .as_deref()
            .map(ConnectionIdentity::new)
    });

    if let Some(identity) = &identity {
        tracing::debug!(connection = %identity, "Resolved connection");
    }
    request.extensions_mut().insert(ResolvedConnection(identity));

    next.run(request).await
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .extensions()
        .get::<ResolvedConnection>()
        .and_then(|c| c.0.as_ref())
        .map(|c| c.as_str().to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if limiter.check_key(&key).is_err() {
        return Err(ApiError::s3(
            S3ErrorCode::SlowDown,
            "Please reduce your request rate",
        ));
    }

    Ok(next.run(request).await)
}

/// Request ID middleware - adds x-amz-request-id and x-amz-id-2 headers
pub async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut response = next.run(request).await;

    // Error responses carry the id echoed in their body
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        let headers = response.headers_mut();
        if !headers.contains_key("x-amz-request-id") {
            headers.insert("x-amz-request-id", value.clone());
        }
        if !headers.contains_key("x-amz-id-2") {
            headers.insert("x-amz-id-2", value);
        }
    }
    response
}

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(100);

        // First request should pass
        assert!(limiter.check_key(&"conn1".to_string()).is_ok());
    }

    #[test]
    fn test_rate_limiter_is_keyed() {
        let limiter = create_rate_limiter(1);
        assert!(limiter.check_key(&"a".to_string()).is_ok());
        assert!(limiter.check_key(&"a".to_string()).is_err());
        assert!(limiter.check_key(&"b".to_string()).is_ok());
    }

    #[test]
    fn test_zero_rps_does_not_panic() {
        let limiter = create_rate_limiter(0);
        assert!(limiter.check_key(&"a".to_string()).is_ok());
    }
}

//! HTTP route definitions and operation dispatch
//!
//! Every path shape funnels into [`dispatch`], which resolves the
//! [`RequestIntent`] once and hands the request to exactly one handler.

use crate::middleware::{self, ResolvedConnection};
use crate::router::{classify_post_body, PathKind, QueryParams, RequestIntent};
use crate::state::Connection;
use crate::{handlers, ApiError, AppState, S3ErrorCode};
use axum::{
    body::{to_bytes, Body},
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, Method},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

/// Alternate mount point served alongside the root
pub const SPIDER_PREFIX: &str = "/spider";

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limiter = middleware::create_rate_limiter(state.config.rate_limit_rps);

    let s3_routes = Router::new()
        .route("/", any(service_handler))
        .route("/{bucket}", any(bucket_handler))
        .route("/{bucket}/", any(bucket_handler))
        .route("/{bucket}/{*key}", any(object_handler));

    let mut router = Router::new()
        .merge(s3_routes.clone())
        .nest(SPIDER_PREFIX, s3_routes)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::connection_middleware,
        ));

    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        );
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

async fn service_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(state, PathKind::Service, String::new(), None, request).await
}

async fn bucket_handler(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    request: Request,
) -> Response {
    dispatch(state, PathKind::Bucket, bucket, None, request).await
}

async fn object_handler(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    request: Request,
) -> Response {
    dispatch(state, PathKind::Object, bucket, Some(key), request).await
}

/// Resolve the operation and run it; HEAD failures carry no body
async fn dispatch(
    state: Arc<AppState>,
    path: PathKind,
    bucket: String,
    key: Option<String>,
    request: Request,
) -> Response {
    let method = request.method().clone();
    let params = QueryParams::parse(request.uri().query());
    let intent = RequestIntent::resolve(&method, path, &params);
    debug!(method = %method, bucket = %bucket, key = ?key, intent = ?intent, "Dispatching request");

    match execute(&state, intent, &bucket, key.as_deref(), &params, request).await {
        Ok(response) => response,
        Err(e) if method == Method::HEAD => e.into_head_response(),
        Err(e) => e.into_response(),
    }
}

async fn execute(
    state: &AppState,
    intent: RequestIntent,
    bucket: &str,
    key: Option<&str>,
    params: &QueryParams,
    request: Request,
) -> Result<Response, ApiError> {
    let resolved = request
        .extensions()
        .get::<ResolvedConnection>()
        .and_then(|r| r.0.clone());
    let connect = || state.connect(resolved.as_ref());
    let limit = state.config.max_body_size;
    let resource = request.uri().path().to_string();
    let (parts, body) = request.into_parts();
    let headers = &parts.headers;
    let object_key = key.unwrap_or_default();

    match intent {
        RequestIntent::HealthCheck => Ok(handlers::health_check().await),
        RequestIntent::ListBuckets => handlers::list_buckets(&connect()?).await,

        RequestIntent::CreateBucket => {
            let conn = connect()?;
            let body = read_body(body, limit).await?;
            handlers::create_bucket(&conn, bucket, body, &state.config.default_region).await
        }
        RequestIntent::HeadBucket => handlers::head_bucket(&connect()?, bucket).await,
        RequestIntent::DeleteBucket => {
            handlers::delete_bucket(&connect()?, bucket, params, headers).await
        }
        RequestIntent::ListObjects => handlers::list_objects(&connect()?, bucket, params).await,
        RequestIntent::ListObjectVersions => {
            handlers::list_object_versions(&connect()?, bucket, params).await
        }
        RequestIntent::GetBucketLocation => {
            handlers::get_bucket_location(&connect()?, bucket).await
        }
        RequestIntent::GetBucketVersioning => {
            handlers::get_bucket_versioning(&connect()?, bucket).await
        }
        RequestIntent::PutBucketVersioning => {
            let conn = connect()?;
            let body = read_body(body, limit).await?;
            handlers::put_bucket_versioning(&conn, bucket, body).await
        }
        RequestIntent::GetBucketCors => handlers::get_bucket_cors(&connect()?, bucket).await,
        RequestIntent::PutBucketCors => {
            let conn = connect()?;
            let body = read_body(body, limit).await?;
            handlers::put_bucket_cors(&conn, bucket, body).await
        }
        RequestIntent::DeleteBucketCors => {
            handlers::delete_bucket_cors(&connect()?, bucket).await
        }
        RequestIntent::PutBucketUnrecognized => {
            handlers::put_bucket_unrecognized(&connect()?, bucket).await
        }

        RequestIntent::InspectPostBody | RequestIntent::DeleteObjects | RequestIntent::PostObject => {
            let conn = connect()?;
            let body = read_body(body, limit).await?;
            let intent = match intent {
                RequestIntent::InspectPostBody => {
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok());
                    classify_post_body(content_type, &body)
                }
                other => other,
            };
            bucket_post(&conn, intent, bucket, headers, body, &resource).await
        }

        RequestIntent::InitiateMultipartUpload => {
            handlers::initiate_multipart_upload(&connect()?, bucket, key, params, headers).await
        }
        RequestIntent::UploadPart => {
            handlers::upload_part(&connect()?, bucket, object_key, params, body).await
        }
        RequestIntent::CompleteMultipartUpload => {
            let conn = connect()?;
            let body = read_body(body, limit).await?;
            handlers::complete_multipart_upload(&conn, bucket, key, params, body).await
        }
        RequestIntent::AbortMultipartUpload => {
            handlers::abort_multipart_upload(&connect()?, bucket, object_key, params).await
        }

        RequestIntent::PutObject => {
            handlers::put_object(&connect()?, bucket, object_key, headers, body).await
        }
        RequestIntent::GetObject => {
            handlers::get_object(&connect()?, bucket, object_key, params, headers).await
        }
        RequestIntent::HeadObject => {
            handlers::head_object(&connect()?, bucket, object_key, params).await
        }
        RequestIntent::DeleteObject => {
            handlers::delete_object(&connect()?, bucket, object_key, params, headers).await
        }

        RequestIntent::Unsupported(subresource) => Err(ApiError::s3_with_resource(
            S3ErrorCode::NotImplemented,
            format!("The {} sub-resource is not supported", subresource),
            resource,
        )),
        RequestIntent::InvalidPost => Err(invalid_post(resource)),
        RequestIntent::MethodNotAllowed => Err(ApiError::s3_with_resource(
            S3ErrorCode::MethodNotAllowed,
            format!("The method {} is not allowed against this resource", parts.method),
            resource,
        )),
    }
}

async fn bucket_post(
    conn: &Connection,
    intent: RequestIntent,
    bucket: &str,
    headers: &axum::http::HeaderMap,
    body: Bytes,
    resource: &str,
) -> Result<Response, ApiError> {
    match intent {
        RequestIntent::DeleteObjects => handlers::delete_objects(conn, bucket, body).await,
        RequestIntent::PostObject => handlers::post_object(conn, bucket, headers, body).await,
        _ => Err(invalid_post(resource)),
    }
}

fn invalid_post(resource: impl Into<String>) -> ApiError {
    ApiError::s3_with_resource(
        S3ErrorCode::InvalidRequest,
        "POST requires uploads, uploadId, delete, or a form upload",
        resource,
    )
}

/// Buffer a request body up to `limit` bytes
async fn read_body(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    to_bytes(body, limit).await.map_err(|e| {
        ApiError::s3(
            S3ErrorCode::InvalidRequest,
            format!("Failed to read request body: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayConfig;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = GatewayConfig {
            default_connection: Some("local".to_string()),
            ..Default::default()
        };
        create_router(Arc::new(AppState::new(config)))
    }

    fn request(method: &str, uri: &str, body: impl Into<Body>) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    async fn send(app: &Router, req: HttpRequest<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_health_check_needs_no_connection() {
        let app = create_router(Arc::new(AppState::new(GatewayConfig::default())));
        let (status, _, body) = send(&app, request("HEAD", "/", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_connection() {
        let app = create_router(Arc::new(AppState::new(GatewayConfig::default())));
        let (status, _, body) = send(&app, request("GET", "/", Body::empty())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("<Code>MissingParameter</Code>"));
    }

    #[tokio::test]
    async fn test_object_round_trip() {
        let app = app();
        let (status, headers, _) = send(&app, request("PUT", "/photos", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["location"], "/photos");
        assert!(headers.contains_key("x-amz-request-id"));

        let (status, headers, _) =
            send(&app, request("PUT", "/photos/2024/cat.txt", "meow")).await;
        assert_eq!(status, StatusCode::OK);
        let etag = headers["etag"].to_str().unwrap().to_string();

        let (status, headers, body) =
            send(&app, request("GET", "/photos/2024/cat.txt", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "meow");
        assert_eq!(headers["etag"].to_str().unwrap(), etag);
        assert_eq!(headers["content-type"], "text/plain");
    }

    #[tokio::test]
    async fn test_spider_prefix_and_trailing_slash() {
        let app = app();
        send(&app, request("PUT", "/spider/docs", Body::empty())).await;

        let (status, _, _) = send(&app, request("HEAD", "/docs/", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app, request("GET", "/spider", Body::empty())).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body.contains("<Name>docs</Name>"));
    }

    #[tokio::test]
    async fn test_head_error_has_no_body() {
        let app = app();
        let (status, headers, body) =
            send(&app, request("HEAD", "/nothing/here.txt", Body::empty())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers["x-amz-error-code"], "NoSuchBucket");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_subresource() {
        let app = app();
        send(&app, request("PUT", "/b", Body::empty())).await;
        let (status, _, body) = send(&app, request("GET", "/b?policy", Body::empty())).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(body.contains("<Code>NotImplemented</Code>"));
    }

    #[tokio::test]
    async fn test_invalid_post() {
        let app = app();
        send(&app, request("PUT", "/b", Body::empty())).await;
        let mut req = request("POST", "/b", "not xml");
        req.headers_mut()
            .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("<Code>InvalidRequest</Code>"));
    }

    #[tokio::test]
    async fn test_batch_delete_by_body_root() {
        let app = app();
        send(&app, request("PUT", "/b", Body::empty())).await;
        send(&app, request("PUT", "/b/one", "1")).await;

        let (status, _, body) = send(
            &app,
            request("POST", "/b", "<Delete><Object><Key>one</Key></Object></Delete>"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<Deleted><Key>one</Key></Deleted>"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let app = app();
        let (status, _, body) = send(&app, request("PATCH", "/b", Body::empty())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(body.contains("<Code>MethodNotAllowed</Code>"));
    }
}

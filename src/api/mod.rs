//! HTTP surface: axum router, middleware stack and server lifecycle.

pub(crate) mod handlers;
mod openapi;
pub mod state;

pub use openapi::openapi;
pub use state::ApiConfig;

use crate::api::handlers::{health, root};
use crate::session::{SessionStore, DEFAULT_GC_INTERVAL};
use crate::verify::SignatureVerifier;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, options},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble the full application: routes, middleware and shared state.
pub fn app(
    config: Arc<ApiConfig>,
    store: Arc<SessionStore>,
    verifier: Arc<dyn SignatureVerifier>,
) -> Result<Router> {
    let origin = frontend_origin(config.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/", get(root::root))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(config))
                .layer(Extension(store))
                .layer(Extension(verifier)),
        );

    Ok(app)
}

/// Serve the API until ctrl-c.
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(
    port: u16,
    config: Arc<ApiConfig>,
    store: Arc<SessionStore>,
    verifier: Arc<dyn SignatureVerifier>,
) -> Result<()> {
    let app = app(config, store.clone(), verifier)?;

    let gc_cancel = CancellationToken::new();
    let gc_task = SessionStore::spawn_gc(store, DEFAULT_GC_INTERVAL, gc_cancel.clone());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    gc_cancel.cancel();
    gc_task.await.context("session GC task panicked")?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}

/// Reduce the configured frontend base URL to its origin for CORS.
fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let url = url::Url::parse(frontend_base_url)
        .with_context(|| format!("invalid frontend base URL: {frontend_base_url}"))?;
    let origin = url.origin().ascii_serialization();
    HeaderValue::from_str(&origin).context("frontend origin is not a valid header value")
}

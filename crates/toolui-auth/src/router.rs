//! Axum router serving the protected resource metadata document.
//!
//! ```rust,no_run
//! use axum::Router;
//! use toolui_auth::{ProtectedResourceMetadata, ResourceServerConfig, protected_resource_metadata_router};
//!
//! let config = ResourceServerConfig::new("https://mcp.example.com", "https://auth.example.com");
//! let app: Router = Router::new()
//!     .merge(protected_resource_metadata_router(ProtectedResourceMetadata::generate(&config)));
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::trace;

use crate::challenge::PROTECTED_RESOURCE_METADATA_PATH;
use crate::metadata::ProtectedResourceMetadata;

const CACHE_CONTROL: &str = "public, max-age=3600";

/// Router exposing `/.well-known/oauth-protected-resource` to any origin.
///
/// CORS preflights are answered by the layer for `GET` and `OPTIONS` with
/// any request headers.
pub fn protected_resource_metadata_router(metadata: ProtectedResourceMetadata) -> Router {
    Router::new()
        .route(PROTECTED_RESOURCE_METADATA_PATH, get(serve_metadata))
        .with_state(Arc::new(metadata))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

async fn serve_metadata(State(metadata): State<Arc<ProtectedResourceMetadata>>) -> impl IntoResponse {
    trace!(resource = %metadata.resource, "Serving protected resource metadata");
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, CACHE_CONTROL)],
        Json(metadata.as_ref().clone()),
    )
}

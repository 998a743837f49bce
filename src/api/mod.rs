//! API module
//!
//! HTTP API endpoints, middleware and router assembly.

pub mod middleware;
pub mod routes;
mod state;

use std::time::Duration;

use axum::{http::HeaderValue, http::Uri, routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;

pub use routes::create_router;
pub use state::AppState;

/// Preflight cache lifetime
const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Build the full application router
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    // Layers run outermost-last: request-id -> propagate -> cors -> trace -> logging -> handler
    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .nest("/api", create_router(state.clone()))
        .fallback(not_found)
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(CORS_MAX_AGE);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

//! API Middleware
//!
//! Bearer-token authentication and request logging.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::TokenError;
use crate::error::AppError;

use super::AppState;

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub account_id: Uuid,
    pub username: String,
}

// =========================================================================
// Bearer authentication
// =========================================================================

/// Validate `Authorization: Bearer <jwt>` and attach the `RequestUser`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state.tokens.validate(token).map_err(|e| match e {
        TokenError::Expired => AppError::Unauthorized("Token has expired".to_string()),
        _ => AppError::Unauthorized("Invalid token".to_string()),
    })?;

    request.extensions_mut().insert(RequestUser {
        account_id: claims.sub,
        username: claims.username,
    });

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// =========================================================================
// Request logging
// =========================================================================

/// Headers whose values never reach the logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

const REDACTED: &str = "[REDACTED]";

/// Header pairs safe to log; credentials are replaced by `[REDACTED]`
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            // HeaderName is always lowercase
            let shown = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED
            } else {
                value.to_str().unwrap_or("[invalid utf8]")
            };
            (name.to_string(), shown.to_string())
        })
        .collect()
}

/// Wraps each request in an `http_request` span and logs its outcome.
///
/// Client errors are logged at `info`, server errors at `error`.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    );

    tracing::debug!(
        parent: &span,
        headers = ?mask_headers_for_logging(request.headers()),
        "Incoming request"
    );

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(parent: &span, status = status.as_u16(), elapsed_ms, "Request failed");
    } else {
        tracing::info!(parent: &span, status = status.as_u16(), elapsed_ms, "Request completed");
    }

    response
}

//! Bearer token authentication for the API.
//!
//! The guard runs ahead of every route. When no token is configured (or the
//! configured token is empty) the server is open and the guard waves
//! everything through; otherwise every request must carry
//! `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};

use super::AppState;

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.auth_token.as_deref().filter(|t| !t.is_empty()) else {
        return next.run(request).await;
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        return unauthorized("Authorization header is required");
    };
    let Some(("Bearer", token)) = header.split_once(' ') else {
        return unauthorized("Invalid authorization format. Use: Bearer <token>");
    };
    // A second space or nothing after "Bearer " is a malformed header, not
    // a token to compare.
    if token.is_empty() || token.starts_with(' ') {
        return unauthorized("Invalid authorization format. Use: Bearer <token>");
    }
    if token != expected {
        return unauthorized("Invalid token");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

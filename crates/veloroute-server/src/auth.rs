//! Static API-key authentication

use crate::app::AppState;
use crate::error::error_response;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

/// Require a configured client key on `/v1/*` routes.
///
/// Accepts either `Authorization: Bearer <key>` or `x-api-key: <key>`,
/// matching how Anthropic clients authenticate. An empty key list
/// disables the check entirely.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let keys = state
        .api_keys
        .read()
        .expect("api keys lock poisoned")
        .clone();
    if keys.is_empty() {
        return next.run(request).await;
    }

    let presented: Option<String> = {
        let headers = request.headers();
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .or_else(|| {
                headers
                    .get("x-api-key")
                    .and_then(|value| value.to_str().ok())
            })
            .map(str::to_string)
    };

    match presented {
        Some(key) if keys.iter().any(|known| known == &key) => next.run(request).await,
        _ => error_response(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "invalid or missing API key",
        ),
    }
}

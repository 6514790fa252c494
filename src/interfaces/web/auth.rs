use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

/// Identity of the authenticated caller, inserted as a request extension for
/// handlers to consume.
#[derive(Clone, Copy, Debug)]
pub struct AuthContext {
    pub user_id: i64,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let any_tokens_exist = state.store.has_any_api_tokens().await.unwrap_or(true);

    // No tokens configured → allow open access only on loopback (safe for
    // local dev); requests run as the default user.
    if !any_tokens_exist {
        let is_loopback = state.api_host == "127.0.0.1"
            || state.api_host == "::1"
            || state.api_host == "localhost";
        if is_loopback {
            match state.store.default_user_id().await {
                Ok(user_id) => {
                    req.extensions_mut().insert(AuthContext { user_id });
                    return next.run(req).await;
                }
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({ "success": false, "error": e.to_string() })),
                    )
                        .into_response();
                }
            }
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "error": "No API tokens configured. Create a token with 'webedt token create' before exposing on a non-loopback address."
            })),
        )
            .into_response();
    }

    let raw_token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let raw_token = match raw_token {
        Some(t) => t,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "success": false, "error": "Missing or invalid Authorization header. Use: Bearer <token>" })),
            )
                .into_response();
        }
    };

    match state.store.validate_api_token(&raw_token).await {
        Ok(Some(user_id)) => {
            req.extensions_mut().insert(AuthContext { user_id });
            next.run(req).await
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "error": "Invalid or unauthorized API token" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

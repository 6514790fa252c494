use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{execute, sessions, status, tokens, users};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status::status_endpoint))
        .route("/api/execute", post(execute::execute_endpoint))
        .route("/api/sessions", get(sessions::list_sessions_endpoint))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session_endpoint).delete(sessions::delete_session_endpoint),
        )
        .route(
            "/api/sessions/{id}/messages",
            get(sessions::list_messages_endpoint),
        )
        .route("/api/user", get(users::get_user_endpoint))
        .route("/api/user/credential", post(users::set_credential_endpoint))
        .route("/api/user/github", post(users::set_github_token_endpoint))
        .route(
            "/api/tokens",
            get(tokens::list_tokens).post(tokens::create_token),
        )
        .route(
            "/api/tokens/{token_id}",
            axum::routing::delete(tokens::delete_token),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::worker::WorkerClient;
    use crate::core::store::Store;
    use axum::http::StatusCode;
    use std::collections::HashSet;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            store: Store::open_in_memory().unwrap(),
            worker: WorkerClient::new("http://127.0.0.1:1"),
            worker_url: "http://127.0.0.1:1".to_string(),
            log_tx,
            api_host: "127.0.0.1".to_string(),
            api_port: 7177,
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build_api_router(test_state());
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn security_headers_are_applied() {
        let app = build_api_router(test_state());
        let req = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn api_route_contract_has_all_expected_paths() {
        let paths = [
            "/api/status",
            "/api/execute",
            "/api/sessions",
            "/api/sessions/1",
            "/api/sessions/1/messages",
            "/api/user",
            "/api/user/credential",
            "/api/user/github",
            "/api/tokens",
            "/api/tokens/token_1",
            "/api/logs",
        ];

        assert_eq!(paths.len(), 11, "Expected exactly 11 API routes");

        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(unique.len(), 11, "Duplicate routes found in route contract");

        let app = build_api_router(test_state());
        for path in paths {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(path)
                .body(Body::empty())
                .expect("request should build");
            let resp = app
                .clone()
                .oneshot(req)
                .await
                .expect("router oneshot should succeed");
            assert_ne!(
                resp.status(),
                StatusCode::NOT_FOUND,
                "Route missing from router: {}",
                path
            );
        }
    }
}

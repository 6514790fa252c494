use axum::{Json, extract::State};

use crate::interfaces::web::AppState;

pub async fn status_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workerUrl": state.worker_url,
    }))
}

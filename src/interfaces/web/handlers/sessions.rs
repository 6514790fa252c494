use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde_derive::Deserialize;

use crate::core::store::types::Session;
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthContext;

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

pub async fn list_sessions_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.store.list_sessions(auth.user_id, limit).await {
        Ok(sessions) => Json(serde_json::json!({ "success": true, "sessions": sessions })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

async fn owned_session(
    state: &AppState,
    auth: &AuthContext,
    id: i64,
) -> Result<Option<Session>, String> {
    match state.store.get_session(id).await {
        Ok(Some(session)) if session.owner_id == auth.user_id => Ok(Some(session)),
        Ok(_) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

pub async fn get_session_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    match owned_session(&state, &auth, id).await {
        Ok(Some(session)) => Json(serde_json::json!({ "success": true, "session": session })),
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Session not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e })),
    }
}

pub async fn list_messages_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    match owned_session(&state, &auth, id).await {
        Ok(Some(session)) => match state.store.list_messages(session.id).await {
            Ok(messages) => Json(serde_json::json!({ "success": true, "messages": messages })),
            Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        },
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Session not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e })),
    }
}

pub async fn delete_session_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    match owned_session(&state, &auth, id).await {
        Ok(Some(session)) => match state.store.delete_session(session.id).await {
            Ok(true) => Json(serde_json::json!({ "success": true, "message": "Session deleted" })),
            Ok(false) => {
                Json(serde_json::json!({ "success": false, "error": "Session not found" }))
            }
            Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        },
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Session not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e })),
    }
}

use axum::{Extension, Json, extract::State};
use serde_derive::Deserialize;

use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthContext;

pub async fn get_user_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Json<serde_json::Value> {
    match state.store.get_user(auth.user_id).await {
        Ok(Some(user)) => Json(serde_json::json!({ "success": true, "user": user })),
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "User not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
pub struct SetCredentialRequest {
    pub credential: String,
}

pub async fn set_credential_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SetCredentialRequest>,
) -> Json<serde_json::Value> {
    let credential = payload.credential.trim();
    if credential.is_empty() {
        return Json(serde_json::json!({ "success": false, "error": "Credential is required" }));
    }
    match state
        .store
        .set_worker_credential(auth.user_id, credential)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "success": true, "message": "Credential stored" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
pub struct SetGithubTokenRequest {
    pub token: String,
}

pub async fn set_github_token_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SetGithubTokenRequest>,
) -> Json<serde_json::Value> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Json(serde_json::json!({ "success": false, "error": "Token is required" }));
    }
    match state.store.set_github_token(auth.user_id, token).await {
        Ok(()) => Json(serde_json::json!({ "success": true, "message": "GitHub token stored" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
};
use serde_derive::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::error_response;
use crate::core::relay;
use crate::core::relay::worker::{
    CODING_ASSISTANT_PROVIDER, GithubBinding, WorkerExecuteRequest,
};
use crate::core::sse::SseFrame;
use crate::core::store::sessions::NewSession;
use crate::core::store::types::MessageKind;
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthContext;

/// `userRequest` is either a plain string or an array of content blocks;
/// the relay never interprets the block structure, so it stays a raw
/// `Value`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub user_request: Option<Value>,
    pub repository_url: Option<String>,
    pub branch: Option<String>,
    pub auto_commit: Option<bool>,
    pub resume_session_id: Option<String>,
}

/// The streaming proxy. Preconditions fail with a plain 400 before any SSE
/// framing; once the response upgrades to `text/event-stream` every further
/// failure is reported in-band as an `error` frame.
pub async fn execute_endpoint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ExecuteRequest>,
) -> Response {
    if payload.user_request.is_none() && payload.resume_session_id.is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "userRequest or resumeSessionId is required",
        );
    }

    let credential = match state.store.worker_credential(auth.user_id).await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "No coding agent credential configured. Set one via POST /api/user/credential.",
            );
        }
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let github = match &payload.repository_url {
        Some(repo_url) => {
            let access_token = state
                .store
                .github_token(auth.user_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            Some(GithubBinding {
                repo_url: repo_url.clone(),
                branch: payload.branch.clone(),
                access_token,
            })
        }
        None => None,
    };

    let user_request_text = match &payload.user_request {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    // Commit point 1: the durable session row.
    let session = match state
        .store
        .create_session(NewSession {
            owner_id: auth.user_id,
            user_request: &user_request_text,
            repository_url: payload.repository_url.as_deref(),
            branch: payload.branch.as_deref(),
            auto_commit: payload.auto_commit.unwrap_or(false),
        })
        .await
    {
        Ok(session) => session,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    // Commit point 2: the caller's prompt enters the transcript before any
    // forwarding starts.
    if payload.user_request.is_some() {
        if let Err(e) = state
            .store
            .append_message(session.id, MessageKind::User, &user_request_text, None)
            .await
        {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    }

    let request = WorkerExecuteRequest {
        user_request: payload.user_request,
        coding_assistant_provider: CODING_ASSISTANT_PROVIDER,
        coding_assistant_authentication: credential,
        resume_session_id: payload.resume_session_id,
        github,
        auto_commit: payload.auto_commit,
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<SseFrame>(32);
    let store = state.store.clone();
    let worker = state.worker.clone();
    let session_id = session.id;
    tokio::spawn(async move {
        relay::run(store, worker, session_id, request, tx).await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(Event::default().event(frame.event).data(frame.data)));

    Sse::new(stream).into_response()
}

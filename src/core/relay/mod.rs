//! StreamRelay: forwards one execute request to the ai-coding-worker and
//! fans the worker's event stream back to the caller while recording it.
//!
//! The loop is strictly sequential (read, decode, persist, forward) so the
//! transcript order always matches arrival order. A failure to forward means
//! the caller is gone; the session is finalized as `error` rather than left
//! `running` forever.

pub mod worker;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::core::sse::{SseDecoder, SseFrame};
use crate::core::store::Store;
use crate::core::store::types::{MessageKind, SessionStatus};
use worker::{WorkerClient, WorkerExecuteRequest};

/// Drive one relay run to completion. The session row and the caller's
/// `user` message already exist; this owns every transition after that.
pub async fn run(
    store: Store,
    worker: WorkerClient,
    session_id: i64,
    request: WorkerExecuteRequest,
    tx: mpsc::Sender<SseFrame>,
) {
    let response = match worker.execute(&request).await {
        Ok(response) => response,
        Err(e) => {
            let reason = format!("worker request failed: {e}");
            fail(&store, session_id, &tx, &reason).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let reason = upstream_failure_text(status.as_u16(), &body);
        fail(&store, session_id, &tx, &reason).await;
        return;
    }

    if !store
        .mark_session_running(session_id)
        .await
        .unwrap_or(false)
    {
        warn!("session {session_id} left pending before streaming started");
    }

    let connected = SseFrame::new(
        "connected",
        serde_json::json!({ "sessionId": session_id }).to_string(),
    );
    if tx.send(connected).await.is_err() {
        abort(&store, session_id).await;
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut stream = Box::pin(response.bytes_stream());

    use tokio_stream::StreamExt;
    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                for frame in decoder.feed(&chunk) {
                    record_frame(&store, session_id, &frame).await;
                    if tx.send(frame).await.is_err() {
                        abort(&store, session_id).await;
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let reason = format!("worker stream failed: {e}");
                fail(&store, session_id, &tx, &reason).await;
                return;
            }
            None => break,
        }
    }

    // Upstream may close without a trailing blank line; the pending event
    // still counts.
    if let Some(frame) = decoder.finish() {
        record_frame(&store, session_id, &frame).await;
        if tx.send(frame).await.is_err() {
            abort(&store, session_id).await;
            return;
        }
    }

    if let Err(e) = store
        .finalize_session(session_id, SessionStatus::Completed)
        .await
    {
        error!("failed to complete session {session_id}: {e}");
    }
    info!("session {session_id} completed");

    let completed = SseFrame::new(
        "completed",
        serde_json::json!({ "sessionId": session_id }).to_string(),
    );
    let _ = tx.send(completed).await;
}

/// Upstream rejected or became unreachable before/while streaming: one
/// terminal `error` frame, session marked `error`.
async fn fail(store: &Store, session_id: i64, tx: &mpsc::Sender<SseFrame>, reason: &str) {
    error!("relay for session {session_id} failed: {reason}");
    if let Err(e) = store
        .append_message(session_id, MessageKind::Error, reason, None)
        .await
    {
        warn!("could not record error message for session {session_id}: {e}");
    }
    if let Err(e) = store
        .finalize_session(session_id, SessionStatus::Error)
        .await
    {
        error!("failed to mark session {session_id} as error: {e}");
    }
    let frame = SseFrame::new(
        "error",
        serde_json::json!({ "error": reason, "sessionId": session_id }).to_string(),
    );
    let _ = tx.send(frame).await;
}

/// The caller's SSE channel closed mid-run. There is nobody left to emit
/// to; just make sure the session cannot stay `running`.
async fn abort(store: &Store, session_id: i64) {
    warn!("caller disconnected from session {session_id} mid-stream");
    if let Err(e) = store
        .append_message(session_id, MessageKind::Error, "client disconnected", None)
        .await
    {
        warn!("could not record abort for session {session_id}: {e}");
    }
    if let Err(e) = store
        .finalize_session(session_id, SessionStatus::Error)
        .await
    {
        error!("failed to mark session {session_id} as error: {e}");
    }
}

/// Persist the salient parts of one upstream frame. Persistence failures are
/// logged and swallowed: losing a transcript row is recoverable, dropping
/// the caller's live stream is not.
async fn record_frame(store: &Store, session_id: i64, frame: &SseFrame) {
    let payload: Option<Value> = serde_json::from_str(&frame.data).ok();

    if let Some(worker_session_id) = payload.as_ref().and_then(extract_worker_session_id) {
        match store
            .set_worker_session_id(session_id, worker_session_id)
            .await
        {
            Ok(true) => info!("session {session_id} bound to worker session {worker_session_id}"),
            Ok(false) => {} // already captured; later values are ignored
            Err(e) => warn!("could not store worker session id for {session_id}: {e}"),
        }
    }

    let kind = if frame.event == "error" {
        MessageKind::Error
    } else {
        MessageKind::Assistant
    };
    let text = match kind {
        MessageKind::Error => Some(frame.data.clone()),
        _ => extract_display_text(payload.as_ref()),
    };
    if let Some(text) = text {
        if let Err(e) = store.append_message(session_id, kind, &text, None).await {
            warn!("could not record message for session {session_id}: {e}");
        }
    }
}

fn extract_worker_session_id(payload: &Value) -> Option<&str> {
    payload.get("sessionId").and_then(Value::as_str)
}

/// The narrow slice of the payload the relay actually reads: a string under
/// one of the keys the worker uses for human-readable output. Everything
/// else stays opaque and is forwarded untouched.
fn extract_display_text(payload: Option<&Value>) -> Option<String> {
    let payload = payload?;
    for key in ["message", "text", "content"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    None
}

fn upstream_failure_text(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("worker returned HTTP {status}")
    } else {
        format!("worker returned HTTP {status}: {detail}")
    }
}

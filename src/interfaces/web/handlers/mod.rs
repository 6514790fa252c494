pub mod execute;
pub mod sessions;
pub mod status;
pub mod tokens;
pub mod users;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub(crate) fn error_response(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": error })),
    )
        .into_response()
}

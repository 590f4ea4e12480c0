use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// JSON body for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiMessage>) {
    (status, Json(ApiMessage::new(message)))
}

/// Logs the error chain and hides it from the client.
pub fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ApiMessage>) {
    tracing::error!(?err, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

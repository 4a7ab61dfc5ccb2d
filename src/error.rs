use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// Error taxonomy shared by the coordinator and node processes.
///
/// Each variant maps to exactly one HTTP status per the routing contract;
/// the `Display` message is shown to clients for client-caused errors and
/// logged (not shown) for anything that collapses to a 5xx. Clients see
/// the message as plain text: no JSON error envelope is imposed on top of
/// the status code.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request: bad JSON, empty key, out-of-range shard id, bad path.
    Validation(String),
    /// No assignment exists for the target shard, or its owning node isn't known.
    Unassigned(String),
    /// The owning node was unreachable, refused the connection, or timed out.
    Transport(String),
    /// Requested key/shard/node doesn't exist.
    NotFound(String),
    /// Anything else that shouldn't happen in a correctly configured cluster.
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "validation error: {msg}"),
            AppError::Unassigned(msg) => write!(f, "no eligible owner: {msg}"),
            AppError::Transport(msg) => write!(f, "upstream transport error: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unassigned(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Transport(msg) => {
                tracing::warn!("upstream transport error: {msg}");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::rpc::json_rpc_error_body;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }

    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code, message.to_string())
            }
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, code, message.to_string())
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}

/// Failures of the session routing layer.
///
/// Every variant is reported to the caller synchronously; none of them is
/// retried and none creates or resurrects session state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request body is not valid json")]
    ParseError,
    #[error("request does not carry a known session and is not an initialize request")]
    InvalidRequest,
    #[error("missing or unknown session id")]
    MissingSession,
    #[error("session is closed")]
    SessionClosed,
    #[error("session has no bound engine yet")]
    NotReady,
    #[error("invalid session state transition: {0}")]
    InvalidState(&'static str),
    #[error("an event stream is already open for this session")]
    StreamConflict,
    #[error("client does not accept text/event-stream")]
    NotAcceptable,
    #[error("protocol engine failed: {0}")]
    EngineFailure(String),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::ParseError => (StatusCode::BAD_REQUEST, -32700, "Parse error"),
            Self::InvalidRequest => (StatusCode::BAD_REQUEST, -32600, "Invalid request"),
            Self::MissingSession => {
                return (StatusCode::BAD_REQUEST, "Invalid or missing session ID").into_response()
            }
            Self::SessionClosed => (StatusCode::NOT_FOUND, -32001, "Session closed"),
            Self::NotReady => (StatusCode::CONFLICT, -32000, "Session not initialized"),
            Self::StreamConflict => (
                StatusCode::CONFLICT,
                -32000,
                "Conflict: only one event stream is allowed per session",
            ),
            Self::NotAcceptable => (
                StatusCode::NOT_ACCEPTABLE,
                -32000,
                "Not Acceptable: client must accept text/event-stream",
            ),
            Self::InvalidState(detail) => {
                tracing::error!(detail, "session state invariant violated");
                (StatusCode::INTERNAL_SERVER_ERROR, -32603, "Internal error")
            }
            Self::EngineFailure(detail) => {
                tracing::error!(error = %detail, "protocol engine failure");
                (StatusCode::INTERNAL_SERVER_ERROR, -32603, "Internal error")
            }
        };

        (status, Json(json_rpc_error_body(code, message))).into_response()
    }
}

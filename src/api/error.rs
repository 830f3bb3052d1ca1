//! JSON error responses.

use crate::task::services::{ErrorKind, TaskServiceError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// An error rendered as `{"msg": "..."}` with a matching status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    msg: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    msg: &'a str,
}

impl ApiError {
    /// A 400 response.
    #[must_use]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            msg: msg.into(),
        }
    }

    /// A 404 response.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            msg: msg.into(),
        }
    }

    /// A 500 response.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            msg: msg.into(),
        }
    }

    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    #[must_use]
    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::BadInput => Self::bad_request(msg),
            ErrorKind::NotFound => Self::not_found(msg),
            ErrorKind::Internal => Self::internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, msg = %self.msg, "request failed");
        } else {
            tracing::info!(status = %self.status, msg = %self.msg, "request rejected");
        }
        (self.status, Json(ErrorBody { msg: &self.msg })).into_response()
    }
}

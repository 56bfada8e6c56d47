use crate::services::{
    document_store::DocumentError, howto_store::HowtoError, object_store::StorageError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), "{}", self.message);
        }

        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(_) => AppError::not_found(err.to_string()),
            StorageError::InvalidObjectPath(_) => AppError::bad_request(err.to_string()),
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::InvalidField(_) => AppError::bad_request(err.to_string()),
            DocumentError::SlugTaken { .. } => AppError::new(StatusCode::CONFLICT, err.to_string()),
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<HowtoError> for AppError {
    fn from(err: HowtoError) -> Self {
        match err {
            HowtoError::Validation(msg) => AppError::bad_request(msg),
            HowtoError::SlugTaken(_)
            | HowtoError::UploadInProgress(_)
            | HowtoError::AlreadyPublished(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            HowtoError::Upload {
                source: StorageError::InvalidObjectPath(_),
                ..
            } => AppError::bad_request(err.to_string()),
            HowtoError::Document(inner) => inner.into(),
            other => AppError::internal(other.to_string()),
        }
    }
}

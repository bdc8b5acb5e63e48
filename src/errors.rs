use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::{
    proxy_service::ProxyError, sas_service::SasError, storage_service::StorageError,
};

/// HTTP-facing error: a status plus a message rendered as JSON.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
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
            tracing::error!(status = self.status.as_u16(), "{}", self.message);
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
        let status = match &err {
            StorageError::ContainerNotFound(_) | StorageError::ObjectNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            StorageError::InvalidContainerName { .. } | StorageError::InvalidObjectKey => {
                StatusCode::BAD_REQUEST
            }
            StorageError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StorageError::Sqlx(_) | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<SasError> for AppError {
    fn from(err: SasError) -> Self {
        let status = match &err {
            SasError::InvalidPermissions(_)
            | SasError::InvalidTimeRange(_)
            | SasError::EmptyKey => StatusCode::BAD_REQUEST,
            SasError::InvalidSigningKey => StatusCode::INTERNAL_SERVER_ERROR,
            SasError::MissingParameter(_)
            | SasError::BadSignature
            | SasError::Expired(_)
            | SasError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        let status = match &err {
            ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::Request(_) | ProxyError::Rejected { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

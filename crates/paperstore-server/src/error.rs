//! Maps library errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use paperstore::arxiv::ArxivError;
use paperstore::db::DatabaseError;
use paperstore::{AuthError, BatchError, IngestError, LibraryError, StorageError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Duplicate(String),
    InvalidInput(String),
    Upstream(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, "not_found", d),
            ApiError::Duplicate(d) => (StatusCode::CONFLICT, "duplicate", d),
            ApiError::InvalidInput(d) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", d),
            ApiError::Upstream(d) => (StatusCode::BAD_GATEWAY, "upstream_error", d),
            ApiError::Unavailable(d) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured", d),
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", d),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = code, detail, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = code, detail, "Request rejected");
        }
        let body = ErrorBody {
            error: code,
            detail: detail.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            LibraryError::InvalidDate(_) => ApiError::InvalidInput(err.to_string()),
            LibraryError::Database(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::Misconfigured(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Duplicate(_) => ApiError::Duplicate(err.to_string()),
            IngestError::InvalidUrl(_) | IngestError::NotPdf(_) => {
                ApiError::InvalidInput(err.to_string())
            }
            IngestError::Fetch { .. } => ApiError::Upstream(err.to_string()),
            IngestError::Arxiv(ArxivError::InvalidId(_)) => ApiError::InvalidInput(err.to_string()),
            IngestError::Arxiv(ArxivError::NotFound(_)) => ApiError::NotFound(err.to_string()),
            IngestError::Arxiv(_) => ApiError::Upstream(err.to_string()),
            IngestError::Upload(e) => e.into(),
            IngestError::Database(e) => e.into(),
            IngestError::ReadFile { .. } | IngestError::Process(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Config(_) => ApiError::Unavailable(err.to_string()),
            BatchError::Submit(_) | BatchError::Status(_) => ApiError::Upstream(err.to_string()),
            BatchError::Database(e) => e.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::OAuth2(_) => ApiError::Upstream(err.to_string()),
            AuthError::Database(e) => e.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

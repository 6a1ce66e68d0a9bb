use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use eprf_collab::CollabError;

/// HTTP-facing error.  Every failure serializes as the
/// `{"success": false, "error": "..."}` envelope the client expects.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl From<CollabError> for ApiError {
    fn from(err: CollabError) -> Self {
        match err {
            CollabError::Validation(msg) => Self::BadRequest(msg),
            CollabError::Authorization(msg) => Self::Forbidden(msg),
            CollabError::NotFound(msg) => Self::NotFound(msg),
            CollabError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<eprf_store::StoreError> for ApiError {
    fn from(err: eprf_store::StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => {
                // Log the detail server-side, hand the client a short line.
                tracing::error!(error = %msg, "internal error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_maps_to_status() {
        let cases = [
            (
                ApiError::from(CollabError::Validation("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CollabError::Authorization("no".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(CollabError::NotFound("gone".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(CollabError::Store(eprf_store::StoreError::NotFound)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}

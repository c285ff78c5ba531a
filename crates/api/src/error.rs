use atelier_core::RequestError;
use atelier_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain error taxonomy and implements [`IntoResponse`] to
/// produce consistent `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A parse/validation error from the command grammar.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A whitelist/quota store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A missing resource (unknown user, unknown job).
    #[error("{0} not found")]
    NotFound(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Request(err) => {
                let code = match err {
                    RequestError::Parse(_) => "PARSE_ERROR",
                    RequestError::UnknownParameter(_) => "UNKNOWN_PARAMETER",
                    RequestError::Validation { .. } => "VALIDATION_ERROR",
                };
                (StatusCode::BAD_REQUEST, code, err.to_string())
            }

            AppError::Store(err) => match err {
                StoreError::InvalidLimit => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                StoreError::Corrupt(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "CORRUPT_SNAPSHOT",
                    err.to_string(),
                ),
                StoreError::Io(_) => {
                    tracing::error!(error = %err, "Store I/O error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

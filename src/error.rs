use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid poll or option")]
    NotFound,

    #[error("This poll is closed")]
    PollClosed,

    #[error("You have already voted in this poll")]
    DuplicateVote,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A missing or malformed request body is a client mistake, reported in
/// the same structured shape as every other failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::PollClosed | AppError::DuplicateVote => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage failures are logged with their cause but surfaced to the
        // client as a generic message.
        let message = match &self {
            AppError::Storage(e) => {
                error!("storage failure: {e}");
                "Failed to process request".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_classes() {
        let cases = [
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::PollClosed, StatusCode::CONFLICT),
            (AppError::DuplicateVote, StatusCode::CONFLICT),
            (
                AppError::Storage(sqlx::Error::PoolClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn storage_error_text_does_not_leak() {
        let err = AppError::Storage(sqlx::Error::PoolTimedOut);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::users::repo::StoreError;

pub const GENERIC_FAILURE: &str = "Something went wrong!";

/// Error surfaced by every route; each variant maps to one status code.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed or duplicate input.
    #[error("{0}")]
    Validation(String),

    /// Bad credentials or a missing/invalid/expired token. The message is
    /// fixed so callers cannot learn whether an account exists.
    #[error("{0}")]
    Auth(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => AppError::Validation(msg),
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            AppError::Internal(e) => {
                error!(error = ?e, "unhandled error");
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

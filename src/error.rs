use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::status::WaitingRoomLockedErrorDto;

/// Client-visible errors. Store-level failures never appear here — they are
/// absorbed at the gate boundary by failing open.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("form is locked: {message}")]
    FormLocked { message: String },

    #[error("missing or malformed client identifier")]
    InvalidClient,

    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // Locked forms answer like the platform's inactive forms do:
            // not-found plus the admin's message for the client to display.
            AppError::FormLocked { message } => (
                StatusCode::NOT_FOUND,
                Json(WaitingRoomLockedErrorDto {
                    inactive_message: message,
                }),
            )
                .into_response(),
            AppError::InvalidClient => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            AppError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}

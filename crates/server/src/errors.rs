use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use core::fmt::Display;
use serde_json::json;

/// Page-level error. Internal detail is logged where the failure happened;
/// the browser only ever sees the generic message carried here.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("{message}")]
    Internal { message: &'static str },

    #[error("{message}")]
    Invalid { message: &'static str },

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Not found.")]
    NotFound,
}

impl PageError {
    /// Logs the internal cause and keeps only the generic message for the
    /// response.
    pub fn internal(message: &'static str, cause: &dyn Display) -> Self {
        tracing::error!("{message} ({cause})");
        Self::Internal { message }
    }

    pub const fn invalid(message: &'static str) -> Self {
        Self::Invalid { message }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

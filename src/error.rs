//! Caller-facing error taxonomy and its HTTP mapping.

use crate::fetch::FetchError;
use crate::gemini::InvocationError;
use crate::normalize::NormalizationFailure;
use crate::staging::StagingError;
use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Normalization(#[from] NormalizationFailure),

    /// Malformed request framing (multipart, missing file).
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ExtractError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Fetch(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Staging(_) | Self::Invocation(_) | Self::Normalization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message returned in the `detail` field.
    pub fn detail(&self) -> String {
        match self {
            Self::Normalization(failure) => {
                format!("{} Cleaned response: {}", failure, failure.fragment)
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, detail);
        } else {
            warn!("Request rejected ({}): {}", status, detail);
        }

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

//! Relay errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::schema::ExtractionResponse;

#[derive(Debug, Error)]
pub enum RelayError {
    /// No usable image field in the request.
    #[error("No valid image file provided")]
    MissingFile,

    /// The multipart body could not be read (malformed or over the size limit).
    #[error("Invalid upload: {message}")]
    Multipart { status: StatusCode, message: String },

    /// The relay has no provider credential.
    #[error("Server configuration error: {0}")]
    Configuration(String),

    /// The provider answered, but not with usable text.
    #[error("OCR provider returned {status}")]
    Upstream {
        status: StatusCode,
        details: Option<String>,
    },

    /// The provider could not be reached.
    #[error("Could not reach OCR provider")]
    Transport(#[source] reqwest::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingFile => StatusCode::BAD_REQUEST,
            RelayError::Multipart { status, .. } => *status,
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Upstream { status, .. } => *status,
            RelayError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show the caller.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::MissingFile => self.to_string(),
            RelayError::Multipart { message, .. } => format!("Invalid upload: {}", message),
            RelayError::Configuration(_) => {
                "Server configuration error: OCR API key not found".to_string()
            }
            RelayError::Upstream { .. } => "Error processing image with OCR service".to_string(),
            RelayError::Transport(e) if e.is_timeout() => {
                "OCR service timed out. Please try again.".to_string()
            }
            RelayError::Transport(_) => {
                "Could not reach OCR service. Please try again.".to_string()
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            RelayError::Upstream { details, .. } => details.clone(),
            // reqwest puts the request URL in its Display output
            RelayError::Transport(e) => Some(redact_url(e)),
            _ => None,
        }
    }
}

fn redact_url(e: &reqwest::Error) -> String {
    let msg = e.to_string();
    match e.url() {
        Some(url) => msg.replace(url.as_str(), "<upstream>"),
        None => msg,
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Configuration(_) => tracing::error!("Relay misconfigured: {}", self),
            RelayError::Transport(e) => tracing::error!("Transport error: {}", e),
            RelayError::Upstream { status, details } => {
                tracing::warn!("Upstream error ({}): {:?}", status, details)
            }
            RelayError::MissingFile | RelayError::Multipart { .. } => {
                tracing::debug!("Client error: {}", self)
            }
        }

        let status = self.status_code();
        let body = ExtractionResponse::error(self.user_message(), self.details());
        (status, Json(body)).into_response()
    }
}

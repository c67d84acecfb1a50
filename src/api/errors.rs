//! Storefront API error types

use thiserror::Error;

/// Errors returned by storefront API calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Unauthorized (HTTP 401)")]
    Unauthorized,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// How a failure affects the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The session can no longer be trusted and must be torn down.
    Fatal,
    /// Report to the user; the session is left as it was.
    Recoverable,
}

impl ApiError {
    /// Classify the error for profile fetches, where a 401 ends the session.
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Unauthorized => ErrorClass::Fatal,
            _ => ErrorClass::Recoverable,
        }
    }

    /// HTTP status code, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build from a non-success status and the raw response body.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }
        let message = serde_json::from_str::<crate::types::ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "request failed".to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            });
        ApiError::Status { status, message }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidUrl(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

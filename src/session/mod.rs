//! Client-side session lifecycle: token store, expiry decoding, alarms and
//! the controller that ties them together

mod alarms;
mod controller;
mod expiry;
mod token_store;

pub use alarms::{AlarmFired, AlarmKind, AlarmScheduler};
pub use controller::{NavigationReceiver, RegisterOutcome, SessionController};
pub use expiry::{check_expiry, decode_expiry, ExpiryCheck};
pub use token_store::TokenStore;

use crate::api::{ApiError, ErrorClass};
use crate::types::ForcedLogoutReason;
use thiserror::Error;

/// Errors surfaced by session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("No active session")]
    NotAuthenticated,

    #[error("Session ended: {0}")]
    Ended(ForcedLogoutReason),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Superseded by a newer session change")]
    Superseded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Whether the error tore the session down.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Api(e) => e.class() == ErrorClass::Fatal,
            SessionError::Ended(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::Api(ApiError::Unauthorized).is_fatal());
        assert!(SessionError::Ended(ForcedLogoutReason::TokenExpired).is_fatal());
        assert!(!SessionError::Api(ApiError::Status {
            status: 500,
            message: "boom".into()
        })
        .is_fatal());
        assert!(!SessionError::Cancelled.is_fatal());
    }
}

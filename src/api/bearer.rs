//! Outbound-request default `Authorization` header

use parking_lot::RwLock;
use std::sync::Arc;

/// Bearer token attached to every outbound API request once set.
///
/// Owned by one session context and shared (cheap clone) with the API client
/// of that context only. There is no process-wide default header.
#[derive(Clone, Default)]
pub struct BearerSlot {
    token: Arc<RwLock<Option<String>>>,
}

impl BearerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }

    /// `Authorization` header value, if a token is set.
    pub fn header_value(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }
}

impl std::fmt::Debug for BearerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

//! Bearer token persistence

use crate::api::BearerSlot;
use crate::config::StorageConfig;
use crate::storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds the single session token of one session context.
///
/// Storage failures never escape: a failed read is an absent token and a
/// failed write leaves the token live in memory only.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
    bearer: BearerSlot,
    token_key: String,
    pending_email_key: String,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>, bearer: BearerSlot, config: &StorageConfig) -> Self {
        Self {
            store,
            bearer,
            token_key: config.token_key.clone(),
            pending_email_key: config.pending_email_key.clone(),
        }
    }

    /// The persisted token, if any.
    pub fn get(&self) -> Option<String> {
        match self.store.get(&self.token_key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Could not read session token: {}", e);
                None
            }
        }
    }

    /// Read the persisted token and install it as the outbound bearer header.
    pub fn load(&self) -> Option<String> {
        let token = self.get();
        match &token {
            Some(token) => self.bearer.set(token),
            None => self.bearer.clear(),
        }
        token
    }

    /// Persist `token` and authenticate subsequent API calls with it.
    pub fn set(&self, token: &str) {
        if let Err(e) = self.store.set(&self.token_key, token) {
            warn!("Could not persist session token, keeping it in memory: {}", e);
        }
        self.bearer.set(token);
        debug!("Session token stored");
    }

    /// Remove the token and the bearer header. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.token_key) {
            warn!("Could not remove persisted session token: {}", e);
        }
        self.bearer.clear();
    }

    /// The token outbound calls currently carry, regardless of whether it
    /// could be persisted.
    pub fn current(&self) -> Option<String> {
        self.bearer.token()
    }

    /// Whether outbound calls currently carry a bearer token.
    pub fn is_active(&self) -> bool {
        self.bearer.is_set()
    }

    pub fn bearer(&self) -> &BearerSlot {
        &self.bearer
    }

    pub fn pending_verification_email(&self) -> Option<String> {
        self.store.get(&self.pending_email_key).ok().flatten()
    }

    pub fn set_pending_verification_email(&self, email: &str) {
        if let Err(e) = self.store.set(&self.pending_email_key, email) {
            warn!("Could not persist pending verification email: {}", e);
        }
    }

    pub fn clear_pending_verification_email(&self) {
        if let Err(e) = self.store.remove(&self.pending_email_key) {
            warn!("Could not clear pending verification email: {}", e);
        }
    }
}

//! Shared test infrastructure for integration tests
//!
//! Provides a scriptable in-process storefront backend (`FakeApi`), a
//! harness wiring it to a `SessionController`, and JWT builders.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use storefront_session::api::{ApiError, BearerSlot, SessionApi};
use storefront_session::config::{SessionSettings, StorageConfig};
use storefront_session::session::{NavigationReceiver, SessionController, TokenStore};
use storefront_session::storage::{KeyValueStore, MemoryStore};
use storefront_session::types::{
    AuthResponse, Credentials, ProfileUpdate, Registration, UserId, UserProfile,
};
use tokio::sync::Semaphore;

/// One recorded backend call, with the bearer header it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { email: String },
    Register { email: String },
    Logout { bearer: Option<String> },
    FetchUser { bearer: Option<String> },
    UpdateUser { bearer: Option<String> },
    DeleteUser { password: String },
}

/// Scriptable storefront backend.
///
/// Profile fetches pop scripted results first and fall back to `profile`.
pub struct FakeApi {
    bearer: BearerSlot,
    calls: Mutex<Vec<Call>>,
    pub profile: Mutex<UserProfile>,
    fetch_results: Mutex<VecDeque<Result<UserProfile, ApiError>>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    pub login_result: Mutex<Result<AuthResponse, ApiError>>,
    pub register_result: Mutex<Result<AuthResponse, ApiError>>,
    pub logout_result: Mutex<Result<(), ApiError>>,
    pub update_error: Mutex<Option<ApiError>>,
    pub delete_error: Mutex<Option<ApiError>>,
}

impl FakeApi {
    pub fn new(bearer: BearerSlot) -> Self {
        Self {
            bearer,
            calls: Mutex::new(Vec::new()),
            profile: Mutex::new(profile(1, "Ada Lovelace", "ada@example.com")),
            fetch_results: Mutex::new(VecDeque::new()),
            fetch_gate: Mutex::new(None),
            login_result: Mutex::new(Err(ApiError::Status {
                status: 422,
                message: "not scripted".into(),
            })),
            register_result: Mutex::new(Err(ApiError::Status {
                status: 422,
                message: "not scripted".into(),
            })),
            logout_result: Mutex::new(Ok(())),
            update_error: Mutex::new(None),
            delete_error: Mutex::new(None),
        }
    }

    /// Queue the result of the next profile fetch.
    pub fn push_fetch(&self, result: Result<UserProfile, ApiError>) {
        self.fetch_results.lock().push_back(result);
    }

    /// Hold profile fetches until the returned semaphore gets permits.
    pub fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.fetch_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::FetchUser { .. }))
            .count()
    }

    pub fn logout_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Logout { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.record(Call::Login {
            email: credentials.email.clone(),
        });
        self.login_result.lock().clone()
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        self.record(Call::Register {
            email: registration.email.clone(),
        });
        self.register_result.lock().clone()
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.record(Call::Logout {
            bearer: self.bearer.header_value(),
        });
        self.logout_result.lock().clone()
    }

    async fn fetch_user(&self) -> Result<UserProfile, ApiError> {
        self.record(Call::FetchUser {
            bearer: self.bearer.header_value(),
        });
        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        let scripted = self.fetch_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.profile.lock().clone()))
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.record(Call::UpdateUser {
            bearer: self.bearer.header_value(),
        });
        if let Some(err) = self.update_error.lock().clone() {
            return Err(err);
        }
        let mut profile = self.profile.lock();
        if let Some(name) = &update.name {
            profile.name = name.clone();
        }
        if let Some(email) = &update.email {
            profile.email = email.clone();
            profile.verified = false;
        }
        Ok(profile.clone())
    }

    async fn delete_user(&self, password: &str) -> Result<(), ApiError> {
        self.record(Call::DeleteUser {
            password: password.to_string(),
        });
        match self.delete_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A controller wired to a `FakeApi` and an in-memory store.
pub struct Harness {
    pub session: SessionController,
    pub nav: NavigationReceiver,
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryStore>,
    pub bearer: BearerSlot,
}

impl Harness {
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_store(settings, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(settings: SessionSettings, store: Arc<MemoryStore>) -> Self {
        let bearer = BearerSlot::new();
        let tokens = TokenStore::new(store.clone(), bearer.clone(), &StorageConfig::default());
        let api = Arc::new(FakeApi::new(bearer.clone()));
        let (session, nav) = SessionController::new(api.clone(), tokens, settings);
        Self {
            session,
            nav,
            api,
            store,
            bearer,
        }
    }

    /// The token as persisted under the default key.
    pub fn stored_token(&self) -> Option<String> {
        self.store.get("token").unwrap()
    }
}

pub fn profile(id: u64, name: &str, email: &str) -> UserProfile {
    UserProfile {
        id: UserId::Numeric(id),
        name: name.to_string(),
        email: email.to_string(),
        verified: true,
    }
}

/// HS256 JWT whose `exp` is `secs` from now (negative for the past).
pub fn jwt_expiring_in(secs: i64) -> String {
    let claims = json!({
        "sub": "1",
        "exp": Utc::now().timestamp() + secs,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"storefront-backend-secret"),
    )
    .unwrap()
}

/// Let spawned tasks (alarm timers, the alarm driver) run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

//! Storefront REST API: the calls the session core depends on

mod bearer;
mod client;
mod errors;

pub use bearer::BearerSlot;
pub use client::ApiClient;
pub use errors::{ApiError, ErrorClass};

use crate::types::{AuthResponse, Credentials, ProfileUpdate, Registration, UserProfile};
use async_trait::async_trait;

/// Remote operations used by the session controller.
///
/// Authenticated calls carry whatever bearer token the session's
/// [`BearerSlot`] holds at the time of the call.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `POST /login`
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    /// `POST /register`
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;

    /// `POST /logout`: invalidate the token server-side.
    async fn logout(&self) -> Result<(), ApiError>;

    /// `GET /user`: resolve the current token into a profile. Side-effect free.
    async fn fetch_user(&self) -> Result<UserProfile, ApiError>;

    /// `POST /user/update`
    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError>;

    /// `POST /user/delete`, re-authenticated with the account password.
    async fn delete_user(&self, password: &str) -> Result<(), ApiError>;
}

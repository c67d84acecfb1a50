//! Core types shared by the storefront API client and the session controller

use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier as issued by the storefront backend.
///
/// The backend has shipped both numeric and string ids over time, so both
/// are accepted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// Profile of the signed-in customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Whether the e-mail address has been verified.
    #[serde(default, alias = "email_verified", alias = "is_verified")]
    pub verified: bool,
}

/// User payloads come back either bare or wrapped in `{"user": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum UserEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl UserEnvelope {
    pub(crate) fn into_profile(self) -> UserProfile {
        match self {
            UserEnvelope::Wrapped { user } => user,
            UserEnvelope::Bare(user) => user,
        }
    }
}

/// Partial profile update. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// `POST /login` body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /register` body.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Response of `POST /login` and `POST /register`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Registration may not hand out a token until the e-mail is verified.
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /user/delete` body.
#[derive(Debug, Serialize)]
pub(crate) struct DeleteAccountRequest<'a> {
    pub password: &'a str,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state; identity not yet determined.
    Loading,
    Authenticated(UserProfile),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Navigation requested by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Default landing page after a successful login.
    Landing,
    /// Login page, optionally carrying the "session expired" indicator.
    Login { session_expired: bool },
    Home,
    /// "Check your inbox" page shown after registration.
    VerifyEmail,
}

/// Interaction events that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionEvent {
    PointerMove,
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl InteractionEvent {
    pub const ALL: [InteractionEvent; 5] = [
        InteractionEvent::PointerMove,
        InteractionEvent::PointerDown,
        InteractionEvent::KeyDown,
        InteractionEvent::Scroll,
        InteractionEvent::TouchStart,
    ];
}

/// Foreground/background visibility of the hosting tab or app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Why a session was torn down without the user asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedLogoutReason {
    Inactivity,
    TokenExpired,
    /// Idle window exceeded while the tab was in the background.
    IdleInBackground,
    Unauthorized,
    MalformedToken,
}

impl fmt::Display for ForcedLogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ForcedLogoutReason::Inactivity => "inactivity",
            ForcedLogoutReason::TokenExpired => "token expired",
            ForcedLogoutReason::IdleInBackground => "idle in background",
            ForcedLogoutReason::Unauthorized => "unauthorized",
            ForcedLogoutReason::MalformedToken => "malformed token",
        };
        f.write_str(s)
    }
}

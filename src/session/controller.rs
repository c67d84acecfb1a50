//! Session lifecycle controller
//!
//! Composes the token store, the profile fetcher (via [`SessionApi`]), the
//! inactivity and expiry alarms and the visibility reconciler into one state
//! machine:
//!
//! ```text
//!   Loading ──profile──▶ Authenticated
//!      │                     │
//!      └──no token / 401─────┴──logout / expiry / idle──▶ Unauthenticated
//! ```
//!
//! Every identity change (login, logout, forced logout, account deletion)
//! starts a new *epoch*. Remote results are applied only while the epoch they
//! were issued in is still current, and the previous epoch's cancellation
//! token is fired so its in-flight calls are abandoned.

use super::alarms::{AlarmFired, AlarmKind, AlarmScheduler};
use super::expiry::{check_expiry, ExpiryCheck};
use super::token_store::TokenStore;
use super::SessionError;
use crate::api::{ApiClient, ApiError, BearerSlot, ErrorClass, SessionApi};
use crate::config::{Config, SessionSettings};
use crate::storage::open_store;
use crate::types::{
    Credentials, ForcedLogoutReason, InteractionEvent, ProfileUpdate, Registration, Route,
    SessionState, UserProfile, Visibility,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Receiving end of the controller's navigation requests.
pub type NavigationReceiver = mpsc::UnboundedReceiver<Route>;

/// Result of [`SessionController::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The backend issued a token right away; the session is live.
    SignedIn(UserProfile),
    /// The account must verify its e-mail before it can log in.
    VerificationPending { email: String },
}

/// Client-side session controller.
///
/// Cheap to clone; all clones drive the same session. Must be created and
/// used inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Epoch {
    id: u64,
    cancel: CancellationToken,
}

/// Snapshot of the epoch a remote call was issued in.
#[derive(Clone)]
struct EpochGuard {
    id: u64,
    cancel: CancellationToken,
}

struct Inner {
    api: Arc<dyn SessionApi>,
    tokens: TokenStore,
    alarms: AlarmScheduler,
    settings: SessionSettings,
    state: watch::Sender<SessionState>,
    navigation: mpsc::UnboundedSender<Route>,
    epoch: Mutex<Epoch>,
    /// Sequence of the newest profile fetch or update; older results lose.
    profile_seq: AtomicU64,
    last_activity: Mutex<Instant>,
    last_rearm: Mutex<Option<Instant>>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(
        api: Arc<dyn SessionApi>,
        tokens: TokenStore,
        settings: SessionSettings,
    ) -> (Self, NavigationReceiver) {
        let (alarms, fired) = AlarmScheduler::new();
        let (navigation, nav_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Loading);
        let shutdown = CancellationToken::new();

        let inner = Arc::new(Inner {
            api,
            tokens,
            alarms,
            settings,
            state,
            navigation,
            epoch: Mutex::new(Epoch {
                id: 0,
                cancel: shutdown.child_token(),
            }),
            profile_seq: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            last_rearm: Mutex::new(None),
            shutdown: shutdown.clone(),
        });

        tokio::spawn(drive_alarms(Arc::downgrade(&inner), fired, shutdown));

        (Self { inner }, nav_rx)
    }

    /// Wire a controller from configuration: configured storage, a reqwest
    /// client and a bearer slot shared between the two.
    pub fn from_config(config: &Config) -> Result<(Self, NavigationReceiver), ApiError> {
        let bearer = BearerSlot::new();
        let store = open_store(&config.storage);
        let tokens = TokenStore::new(store, bearer.clone(), &config.storage);
        let api = ApiClient::new(config, bearer)?;
        Ok(Self::new(Arc::new(api), tokens, config.session.clone()))
    }

    // === Observation ===

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.state.borrow().profile().cloned()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn pending_verification_email(&self) -> Option<String> {
        self.inner.tokens.pending_verification_email()
    }

    pub fn is_alarm_armed(&self, kind: AlarmKind) -> bool {
        self.inner.alarms.is_armed(kind)
    }

    // === Transitions ===

    /// Resolve the persisted token (page load).
    pub async fn restore(&self) -> Result<SessionState, SessionError> {
        let inner = &self.inner;
        let Some(token) = inner.tokens.load() else {
            debug!("No persisted session token");
            inner.set_state(SessionState::Unauthenticated);
            return Ok(SessionState::Unauthenticated);
        };

        let guard = inner.advance_epoch();
        inner.set_state(SessionState::Loading);
        if let Err(reason) = inner.arm_timers(&token) {
            return Err(SessionError::Ended(reason));
        }

        self.fetch_profile(&guard).await?;
        Ok(self.state())
    }

    /// Start a session with `token`.
    ///
    /// When `profile` is supplied it is trusted as-is and no fetch is made.
    pub async fn login(
        &self,
        token: &str,
        profile: Option<UserProfile>,
    ) -> Result<UserProfile, SessionError> {
        let inner = &self.inner;
        let guard = inner.advance_epoch();
        inner.tokens.set(token);
        inner.tokens.clear_pending_verification_email();

        if let Err(reason) = inner.arm_timers(token) {
            return Err(SessionError::Ended(reason));
        }

        let profile = match profile {
            Some(profile) => {
                inner.profile_seq.fetch_add(1, Ordering::SeqCst);
                inner.set_state(SessionState::Authenticated(profile.clone()));
                profile
            }
            None => {
                inner.set_state(SessionState::Loading);
                self.fetch_profile(&guard).await?
            }
        };

        info!("Logged in as {}", profile.email);
        inner.navigate(Route::Landing);
        Ok(profile)
    }

    /// Authenticate with e-mail and password, then start the session.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<UserProfile, SessionError> {
        let guard = self.inner.current_epoch();
        let response = guarded(&guard.cancel, self.inner.api.login(credentials)).await?;
        let token = response.token.ok_or_else(|| {
            SessionError::InvalidResponse("login response carried no token".to_string())
        })?;
        self.login(&token, response.user).await
    }

    /// Create an account. Logs in directly when the backend returns a token,
    /// otherwise remembers the e-mail as pending verification.
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<RegisterOutcome, SessionError> {
        let inner = &self.inner;
        let guard = inner.current_epoch();
        let response = guarded(&guard.cancel, inner.api.register(registration)).await?;

        match response.token {
            Some(token) => {
                let profile = self.login(&token, response.user).await?;
                Ok(RegisterOutcome::SignedIn(profile))
            }
            None => {
                info!("Registered {}, awaiting e-mail verification", registration.email);
                inner
                    .tokens
                    .set_pending_verification_email(&registration.email);
                inner.navigate(Route::VerifyEmail);
                Ok(RegisterOutcome::VerificationPending {
                    email: registration.email.clone(),
                })
            }
        }
    }

    /// End the session. The remote call is best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let had_session = inner.has_session();
        let guard = inner.advance_epoch();
        inner.alarms.cancel_all();

        if inner.tokens.is_active() {
            match guarded(&guard.cancel, inner.api.logout()).await {
                Ok(()) => debug!("Remote session invalidated"),
                Err(e) => warn!("Remote logout failed, clearing local session anyway: {}", e),
            }
        }

        if !inner.is_current(&guard) {
            // a login completed while the remote call was in flight
            debug!("Session replaced during logout, keeping the newer one");
            return;
        }

        inner.teardown();
        if had_session {
            info!("Logged out");
            inner.navigate(Route::Login {
                session_expired: false,
            });
        }
    }

    /// Fetch the profile on demand.
    pub async fn refresh_profile(&self) -> Result<UserProfile, SessionError> {
        if !self.inner.tokens.is_active() {
            return Err(SessionError::NotAuthenticated);
        }
        let guard = self.inner.current_epoch();
        self.fetch_profile(&guard).await
    }

    /// Apply a partial profile update. The in-memory profile is replaced only
    /// by the server's answer; on failure it is left untouched.
    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, SessionError> {
        let inner = &self.inner;
        if !inner.state.borrow().is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }

        let guard = inner.current_epoch();
        // a fetch that started earlier must not overwrite this answer
        inner.profile_seq.fetch_add(1, Ordering::SeqCst);
        let profile = guarded(&guard.cancel, inner.api.update_user(update)).await?;

        if !inner.is_current(&guard) {
            return Err(SessionError::Superseded);
        }
        inner.set_state(SessionState::Authenticated(profile.clone()));
        debug!("Profile updated");
        Ok(profile)
    }

    /// Delete the account, re-authenticating with `password`.
    pub async fn delete_account(&self, password: &str) -> Result<(), SessionError> {
        let inner = &self.inner;
        if !inner.tokens.is_active() {
            return Err(SessionError::NotAuthenticated);
        }

        let guard = inner.current_epoch();
        guarded(&guard.cancel, inner.api.delete_user(password)).await?;

        if !inner.is_current(&guard) {
            return Err(SessionError::Superseded);
        }
        inner.advance_epoch();
        inner.teardown();
        info!("Account deleted");
        inner.navigate(Route::Home);
        Ok(())
    }

    /// Feed a user interaction. Re-arms the inactivity alarm.
    pub fn record_activity(&self, event: InteractionEvent) {
        let inner = &self.inner;
        if !inner.tokens.is_active() {
            return;
        }

        let now = Instant::now();
        *inner.last_activity.lock() = now;

        let throttle = inner.settings.activity_throttle;
        let mut last_rearm = inner.last_rearm.lock();
        if let Some(previous) = *last_rearm {
            if now.duration_since(previous) < throttle {
                trace!("{:?}: inactivity re-arm throttled", event);
                return;
            }
        }
        *last_rearm = Some(now);
        drop(last_rearm);

        trace!("{:?}: inactivity alarm re-armed", event);
        inner
            .alarms
            .arm(AlarmKind::Inactivity, inner.settings.inactivity_timeout);
    }

    /// Reconcile after the host tab/app changes visibility.
    ///
    /// The inactivity alarm is suspended while hidden and idle time is
    /// recomputed on return. The expiry alarm stays armed throughout.
    pub fn set_visibility(&self, visibility: Visibility) {
        let inner = &self.inner;
        let Some(token) = inner.tokens.current() else {
            return;
        };

        match visibility {
            Visibility::Hidden => {
                debug!("Host hidden, suspending inactivity alarm");
                inner.alarms.cancel(AlarmKind::Inactivity);
            }
            Visibility::Visible => {
                let idle = inner.last_activity.lock().elapsed();
                if idle > inner.settings.inactivity_timeout {
                    inner.force_logout(ForcedLogoutReason::IdleInBackground);
                    return;
                }
                debug!("Host visible after {:?} idle, re-arming alarms", idle);
                // forced logout (if any) already happened inside
                let _ = inner.arm_timers(&token);
            }
        }
    }

    /// Abandon all in-flight calls and alarms. Used when the hosting context
    /// is torn down; later remote calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.alarms.cancel_all();
    }

    async fn fetch_profile(&self, guard: &EpochGuard) -> Result<UserProfile, SessionError> {
        let inner = &self.inner;
        let seq = inner.profile_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let result = guarded(&guard.cancel, inner.api.fetch_user()).await;

        if matches!(result, Err(SessionError::Cancelled)) {
            return Err(SessionError::Cancelled);
        }
        if !inner.is_current(guard) || inner.profile_seq.load(Ordering::SeqCst) != seq {
            debug!("Discarding stale profile response");
            return Err(SessionError::Superseded);
        }

        match result {
            Ok(profile) => {
                inner.set_state(SessionState::Authenticated(profile.clone()));
                Ok(profile)
            }
            Err(SessionError::Api(e)) if e.class() == ErrorClass::Fatal => {
                inner.force_logout(ForcedLogoutReason::Unauthorized);
                Err(SessionError::Api(e))
            }
            Err(e) => {
                if inner.state.borrow().is_loading() {
                    // initial load settles; the token is kept for a retry
                    warn!("Initial profile fetch failed, token kept for retry: {}", e);
                    inner.set_state(SessionState::Unauthenticated);
                } else {
                    warn!("Profile fetch failed, session left unchanged: {}", e);
                }
                Err(e)
            }
        }
    }
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        let current = self.state.borrow();
        if previous != *current {
            debug!(
                "Session state: {} -> {}",
                state_name(&previous),
                state_name(&current)
            );
        }
    }

    fn navigate(&self, route: Route) {
        debug!("Navigation requested: {:?}", route);
        let _ = self.navigation.send(route);
    }

    fn has_session(&self) -> bool {
        self.tokens.is_active() || !matches!(*self.state.borrow(), SessionState::Unauthenticated)
    }

    fn current_epoch(&self) -> EpochGuard {
        let epoch = self.epoch.lock();
        EpochGuard {
            id: epoch.id,
            cancel: epoch.cancel.clone(),
        }
    }

    /// Start a new epoch, abandoning calls issued in the previous one.
    fn advance_epoch(&self) -> EpochGuard {
        let mut epoch = self.epoch.lock();
        epoch.cancel.cancel();
        epoch.id += 1;
        epoch.cancel = self.shutdown.child_token();
        EpochGuard {
            id: epoch.id,
            cancel: epoch.cancel.clone(),
        }
    }

    fn is_current(&self, guard: &EpochGuard) -> bool {
        self.epoch.lock().id == guard.id
    }

    /// Arm both alarms for `token`. Fails if the token ended the session
    /// on the spot.
    fn arm_timers(&self, token: &str) -> Result<(), ForcedLogoutReason> {
        self.arm_expiry(token)?;
        let now = Instant::now();
        *self.last_activity.lock() = now;
        *self.last_rearm.lock() = Some(now);
        self.alarms
            .arm(AlarmKind::Inactivity, self.settings.inactivity_timeout);
        Ok(())
    }

    fn arm_expiry(&self, token: &str) -> Result<(), ForcedLogoutReason> {
        match check_expiry(token, Utc::now()) {
            ExpiryCheck::ExpiresIn(remaining) => {
                debug!("Token expires in {:?}", remaining);
                self.alarms.arm(AlarmKind::Expiry, remaining);
                Ok(())
            }
            ExpiryCheck::Expired => {
                self.force_logout(ForcedLogoutReason::TokenExpired);
                Err(ForcedLogoutReason::TokenExpired)
            }
            ExpiryCheck::Undecodable if self.settings.logout_on_malformed_token => {
                self.force_logout(ForcedLogoutReason::MalformedToken);
                Err(ForcedLogoutReason::MalformedToken)
            }
            ExpiryCheck::Undecodable => {
                warn!("Session token expiry could not be decoded; no expiry alarm armed");
                self.alarms.cancel(AlarmKind::Expiry);
                Ok(())
            }
        }
    }

    fn on_inactivity_alarm(&self) {
        let idle = self.last_activity.lock().elapsed();
        let window = self.settings.inactivity_timeout;
        if idle < window {
            // throttled activity landed after the alarm was armed
            self.alarms.arm(AlarmKind::Inactivity, window - idle);
            return;
        }
        self.force_logout(ForcedLogoutReason::Inactivity);
    }

    /// Unconditional local teardown, redirecting to login with the
    /// session-expired indicator.
    fn force_logout(&self, reason: ForcedLogoutReason) {
        if !self.has_session() {
            return;
        }
        warn!("Forced logout: {}", reason);
        self.advance_epoch();
        self.teardown();
        self.navigate(Route::Login {
            session_expired: true,
        });
    }

    fn teardown(&self) {
        self.alarms.cancel_all();
        self.tokens.clear();
        *self.last_rearm.lock() = None;
        self.set_state(SessionState::Unauthenticated);
    }
}

fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Loading => "loading",
        SessionState::Authenticated(_) => "authenticated",
        SessionState::Unauthenticated => "unauthenticated",
    }
}

/// Run a remote call, abandoning it when `cancel` fires.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        result = call => result.map_err(SessionError::from),
    }
}

async fn drive_alarms(
    inner: Weak<Inner>,
    mut fired: mpsc::UnboundedReceiver<AlarmFired>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = fired.recv() => next,
        };
        let Some(alarm) = next else { break };
        let Some(inner) = inner.upgrade() else { break };

        if !inner.alarms.claim(alarm) {
            trace!("Ignoring stale {:?} alarm", alarm.kind);
            continue;
        }
        match alarm.kind {
            AlarmKind::Inactivity => inner.on_inactivity_alarm(),
            AlarmKind::Expiry => inner.force_logout(ForcedLogoutReason::TokenExpired),
        }
    }
    debug!("Session alarm driver stopped");
}

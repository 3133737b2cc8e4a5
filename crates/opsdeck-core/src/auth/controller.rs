//! Session lifecycle: login, validation, expiry tracking, refresh, logout.
//!
//! All state lives behind one mutex that is never held across an await.
//! Anything that completes asynchronously (a refresh, a validation pass)
//! re-checks the session epoch before applying itself, so a result that
//! lands after `logout()` or a newer login is dropped.

use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::gateway::AuthGateway;
use super::session::{SessionRecord, SessionState, SessionStatus};
use super::store::SessionStore;
use crate::clock::{with_timeout, Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::models::Credentials;

type SharedRefresh = Shared<BoxFuture<'static, Result<SessionState>>>;

struct ControllerState {
    session: SessionState,
    /// Bumped on every login and every teardown.
    epoch: u64,
    refresh: Option<SharedRefresh>,
    expiry_timer: Option<JoinHandle<()>>,
    debounce_timer: Option<JoinHandle<()>>,
}

impl ControllerState {
    fn cancel_timers(&mut self) {
        if let Some(timer) = self.expiry_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.debounce_timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    gateway: Arc<dyn AuthGateway>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<ControllerState>,
    state_tx: watch::Sender<SessionState>,
}

/// Single authority for whether the console is logged in, and as whom.
///
/// Cheap to clone; clones share state. Methods that start timers
/// (`login`, `initialize`, `check_auth`, `refresh`) must run inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn AuthGateway>, store: SessionStore, config: SessionConfig) -> Self {
        Self::with_clock(gateway, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<dyn AuthGateway>,
        store: SessionStore,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::unauthenticated());
        let state = ControllerState {
            session: SessionState::unauthenticated(),
            epoch: 0,
            refresh: None,
            expiry_timer: None,
            debounce_timer: None,
        };
        Self {
            inner: Arc::new(Inner {
                gateway,
                store,
                clock,
                config,
                state: Mutex::new(state),
                state_tx,
            }),
        }
    }

    /// Current session snapshot
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().session.status()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Whether the held token is within the refresh buffer of its expiry.
    /// Pure: no I/O.
    pub fn is_near_expiry(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .session
            .is_near_expiry(now, self.inner.config.refresh_buffer())
    }

    /// Restore a persisted session, validating it with the backend.
    ///
    /// Never fails: every error settles into `Unauthenticated`.
    pub async fn initialize(&self) -> SessionState {
        let inner = &self.inner;

        let record = match inner.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                None
            }
        };

        let Some(record) = record else {
            debug!("No stored session");
            let mut st = inner.state.lock();
            if st.session.is_authenticated() || st.session.status() == SessionStatus::Authenticating {
                return st.session.clone();
            }
            // Clears whatever half-record a failed load left behind
            inner.clear_locked(&mut st, SessionState::unauthenticated());
            return st.session.clone();
        };

        let epoch = {
            let mut st = inner.state.lock();
            if st.session.is_authenticated() {
                return st.session.clone();
            }
            st.session = SessionState::authenticating();
            inner.publish(&st);
            st.epoch
        };

        let result = with_timeout(
            inner.config.request_timeout(),
            inner.gateway.validate_token(&record.token),
        )
        .await;

        let mut st = inner.state.lock();
        if st.epoch != epoch || st.session.status() != SessionStatus::Authenticating {
            debug!("Session changed while restoring, keeping current state");
            return st.session.clone();
        }

        match result {
            Ok(true) => {
                info!(user = %record.user.email, "Restored stored session");
                let record = inner.reanchor_lapsed(record);
                inner.install_locked(&mut st, record)
            }
            Ok(false) => {
                info!("Stored token is no longer valid");
                inner.clear_locked(&mut st, SessionState::unauthenticated());
                st.session.clone()
            }
            Err(e) => {
                warn!(error = %e, "Could not validate stored token");
                inner.clear_locked(&mut st, SessionState::unauthenticated());
                st.session.clone()
            }
        }
    }

    /// Authenticate and persist the new session.
    ///
    /// On failure any existing session is left exactly as it was.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionState> {
        let inner = &self.inner;

        let epoch = {
            let mut st = inner.state.lock();
            if !st.session.is_authenticated() {
                // Supersedes a restore that is still validating
                st.epoch += 1;
                st.session = SessionState::authenticating();
                inner.publish(&st);
            }
            st.epoch
        };

        info!(email = %credentials.email, "Logging in");
        let result = with_timeout(inner.config.request_timeout(), inner.gateway.login(credentials)).await;

        let mut st = inner.state.lock();
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                inner.abandon_login_locked(&mut st, epoch);
                return Err(match e {
                    SessionError::AuthenticationFailed(_) | SessionError::NetworkError(_) => e,
                    other => SessionError::AuthenticationFailed(other.to_string()),
                });
            }
        };

        if st.epoch != epoch {
            debug!("Logged out while login was in flight, discarding result");
            return Err(SessionError::AuthenticationRequired);
        }

        let expires_at = response
            .expires_at
            .unwrap_or_else(|| inner.config.expiry_from(inner.clock.now()));
        let record = SessionRecord {
            token: response.token,
            user: response.user,
            expires_at: Some(expires_at),
        };

        if let Err(e) = inner.store.save(&record) {
            warn!(error = %e, "Failed to persist session");
            // The failed save may have disturbed the previous record
            if let Some(previous) = st.session.record() {
                if let Err(e) = inner.store.save(previous) {
                    warn!(error = %e, "Failed to restore previous session record");
                }
            }
            inner.abandon_login_locked(&mut st, epoch);
            return Err(e);
        }

        info!(user = %record.user.email, role = %record.user.role, "Login succeeded");
        // A refresh of the previous session must not overwrite this one
        st.epoch += 1;
        st.refresh = None;
        Ok(inner.install_locked(&mut st, record))
    }

    /// Drop the session. Idempotent, synchronous, valid from any state.
    pub fn logout(&self) {
        let mut st = self.inner.state.lock();
        let previous = st.session.status();
        self.inner.clear_locked(&mut st, SessionState::unauthenticated());
        info!(previous = %previous, "Logged out");
    }

    /// Exchange the current token for a fresh one.
    ///
    /// Concurrent callers share one gateway call and one outcome. Failure
    /// clears the session (`Expired`) and returns `RefreshFailed`.
    pub async fn refresh(&self) -> Result<SessionState> {
        let pending = {
            let mut st = self.inner.state.lock();
            self.inner.start_refresh_locked(&mut st)?
        };
        pending.await
    }

    /// Request re-validation. Calls within the debounce window collapse
    /// into one validation pass that runs after the window closes.
    ///
    /// Outside a tokio runtime the request is dropped with a warning.
    pub fn check_auth(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime, skipping session check");
            return;
        };
        let mut st = self.inner.state.lock();
        if let Some(pending) = st.debounce_timer.take() {
            pending.abort();
        }

        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.config.check_auth_debounce();
        st.debounce_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.validate().await;
            }
        }));
    }

    /// Validate the held token with the backend right away.
    pub async fn validate(&self) -> SessionStatus {
        self.inner.validate().await
    }

    /// Hand a downstream failure to the controller. An authentication-class
    /// error for the token currently held ends the session.
    ///
    /// Returns whether the session was cleared.
    pub fn report_auth_failure(&self, token: &str, error: &SessionError) -> bool {
        if !error.is_auth_error() {
            return false;
        }
        let mut st = self.inner.state.lock();
        if st.session.token() != Some(token) {
            debug!("Auth failure reported for a token no longer held");
            return false;
        }
        warn!(error = %error, "Backend rejected the session");
        self.inner.clear_locked(&mut st, SessionState::unauthenticated());
        true
    }

    /// Cancel timers without touching the session. Used at teardown.
    pub fn shutdown(&self) {
        self.inner.state.lock().cancel_timers();
        debug!("Session controller shut down");
    }

    #[cfg(test)]
    fn timers_active(&self) -> bool {
        let st = self.inner.state.lock();
        let running = |t: &Option<JoinHandle<()>>| t.as_ref().is_some_and(|h| !h.is_finished());
        running(&st.expiry_timer) || running(&st.debounce_timer)
    }
}

impl Inner {
    fn publish(&self, st: &ControllerState) {
        let previous = self.state_tx.send_replace(st.session.clone());
        if previous.status() != st.session.status() {
            info!(from = %previous.status(), to = %st.session.status(), "Session status changed");
        }
    }

    /// Adopt a record as the live session and start watching its expiry.
    fn install_locked(self: &Arc<Self>, st: &mut ControllerState, record: SessionRecord) -> SessionState {
        let now = self.clock.now();
        let mut session = SessionState::authenticated(record);
        if session.is_near_expiry(now, self.config.refresh_buffer()) {
            session.mark(SessionStatus::NearExpiry);
        }
        st.session = session;
        self.publish(st);
        self.ensure_expiry_checker(st);
        st.session.clone()
    }

    /// Tear the session down: timers, in-flight work, storage, state.
    fn clear_locked(&self, st: &mut ControllerState, next: SessionState) {
        st.cancel_timers();
        st.refresh = None;
        st.epoch += 1;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        st.session = next;
        self.publish(st);
    }

    /// Give a token the backend just accepted a fresh local lifetime when
    /// its recorded expiry has already passed.
    fn reanchor_lapsed(&self, mut record: SessionRecord) -> SessionRecord {
        let now = self.clock.now();
        if !record.is_expired(now) {
            return record;
        }
        let expires_at = self.config.expiry_from(now);
        debug!(expires_at = %expires_at, "Backend accepted a lapsed token, extending local expiry");
        record.expires_at = Some(expires_at);
        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, "Failed to persist extended expiry");
        }
        record
    }

    fn abandon_login_locked(&self, st: &mut ControllerState, epoch: u64) {
        if st.epoch == epoch && st.session.status() == SessionStatus::Authenticating {
            st.session = SessionState::unauthenticated();
            self.publish(st);
        }
    }

    fn start_refresh_locked(self: &Arc<Self>, st: &mut ControllerState) -> Result<SharedRefresh> {
        if let Some(pending) = &st.refresh {
            debug!("Joining in-flight refresh");
            return Ok(pending.clone());
        }

        let token = st
            .session
            .token()
            .ok_or(SessionError::AuthenticationRequired)?
            .to_string();
        st.session.mark(SessionStatus::Refreshing);
        self.publish(st);

        let epoch = st.epoch;
        let inner = Arc::clone(self);
        // Spawned so the refresh completes even if every caller goes away
        let task = tokio::spawn(async move { inner.run_refresh(token, epoch).await });
        let pending = async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Refresh task did not complete");
                Err(SessionError::AuthenticationRequired)
            })
        }
        .boxed()
        .shared();

        st.refresh = Some(pending.clone());
        Ok(pending)
    }

    async fn run_refresh(self: Arc<Self>, token: String, epoch: u64) -> Result<SessionState> {
        let result = with_timeout(self.config.request_timeout(), self.gateway.refresh(&token)).await;

        let mut st = self.state.lock();
        if st.epoch != epoch {
            debug!("Session ended while refreshing, discarding result");
            return Err(SessionError::AuthenticationRequired);
        }
        st.refresh = None;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.clear_locked(&mut st, SessionState::expired());
                return Err(match e {
                    SessionError::RefreshFailed(_) => e,
                    other => SessionError::RefreshFailed(other.to_string()),
                });
            }
        };

        let Some(user) = st.session.user().cloned() else {
            return Err(SessionError::AuthenticationRequired);
        };
        let expires_at = response
            .expires_at
            .unwrap_or_else(|| self.config.expiry_from(self.clock.now()));
        let record = SessionRecord {
            token: response.token,
            user,
            expires_at: Some(expires_at),
        };

        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, "Failed to persist refreshed token");
            self.clear_locked(&mut st, SessionState::expired());
            return Err(SessionError::RefreshFailed(e.to_string()));
        }

        info!(expires_at = %expires_at, "Session token refreshed");
        Ok(self.install_locked(&mut st, record))
    }

    async fn validate(self: &Arc<Self>) -> SessionStatus {
        let (token, epoch) = {
            let st = self.state.lock();
            match st.session.token() {
                Some(token) => (token.to_string(), st.epoch),
                None => return st.session.status(),
            }
        };

        let result = with_timeout(self.config.request_timeout(), self.gateway.validate_token(&token)).await;

        let mut st = self.state.lock();
        if st.epoch != epoch || st.session.token() != Some(token.as_str()) {
            debug!("Session changed during validation, ignoring result");
            return st.session.status();
        }

        match result {
            Ok(true) => {
                let now = self.clock.now();
                let lapsed = st.session.record().filter(|r| r.is_expired(now)).cloned();
                if let Some(record) = lapsed {
                    if st.session.status() != SessionStatus::Refreshing {
                        let record = self.reanchor_lapsed(record);
                        self.install_locked(&mut st, record);
                        return st.session.status();
                    }
                }
                if st.session.status() == SessionStatus::Authenticated
                    && st.session.is_near_expiry(now, self.config.refresh_buffer())
                {
                    st.session.mark(SessionStatus::NearExpiry);
                    self.publish(&st);
                }
                self.ensure_expiry_checker(&mut st);
            }
            Ok(false) => {
                info!("Token rejected by backend, logging out");
                self.clear_locked(&mut st, SessionState::unauthenticated());
            }
            Err(e) if e.is_auth_error() => {
                info!(error = %e, "Token rejected by backend, logging out");
                self.clear_locked(&mut st, SessionState::unauthenticated());
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed, keeping session");
            }
        }
        st.session.status()
    }

    fn ensure_expiry_checker(self: &Arc<Self>, st: &mut ControllerState) {
        if st.expiry_timer.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let period = self.config.expiry_check_interval();
        st.expiry_timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.check_expiry() {
                    break;
                }
            }
        }));
    }

    /// One tick of the background checker. Returns whether to keep running.
    fn check_expiry(self: &Arc<Self>) -> bool {
        let now = self.clock.now();
        let buffer = self.config.refresh_buffer();
        let mut st = self.state.lock();

        match st.session.status() {
            SessionStatus::Authenticated | SessionStatus::NearExpiry => {}
            SessionStatus::Refreshing => return true,
            _ => return false,
        }

        let (expired, near) = match st.session.record() {
            Some(record) => (record.is_expired(now), record.needs_refresh(now, buffer)),
            None => return false,
        };

        if expired {
            warn!("Session token expired");
            self.clear_locked(&mut st, SessionState::expired());
            return false;
        }

        if near {
            if st.session.status() == SessionStatus::Authenticated {
                st.session.mark(SessionStatus::NearExpiry);
                self.publish(&st);
            }
            if self.config.auto_refresh && st.refresh.is_none() {
                info!("Token near expiry, refreshing automatically");
                if let Err(e) = self.start_refresh_locked(&mut st) {
                    warn!(error = %e, "Could not start automatic refresh");
                }
            }
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_timers();
    }
}

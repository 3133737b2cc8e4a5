//! Scripted collaborators shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::auth::{AuthGateway, MemoryCredentialStore, SessionController, SessionStore};
use crate::clock::TokioClock;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::models::{Credentials, LoginResponse, RefreshResponse, User};

pub fn admin_user() -> User {
    User {
        id: "1".to_string(),
        email: "admin@x.com".to_string(),
        role: "admin".to_string(),
        display_name: None,
    }
}

pub fn admin_credentials() -> Credentials {
    Credentials::new("admin@x.com", "secret")
}

/// Auth Gateway whose answers are set by the test.
pub struct FakeGateway {
    pub login_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    /// `None` rejects the login
    login_token: Mutex<Option<String>>,
    login_expires_at: Mutex<Option<DateTime<Utc>>>,
    token_valid: AtomicBool,
    validate_error: Mutex<Option<SessionError>>,
    /// `None` rejects the refresh
    refresh_token: Mutex<Option<String>>,
    delay: Mutex<Duration>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            login_token: Mutex::new(Some("abc123".to_string())),
            login_expires_at: Mutex::new(None),
            token_valid: AtomicBool::new(true),
            validate_error: Mutex::new(None),
            refresh_token: Mutex::new(Some("def456".to_string())),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_login_token(&self, token: Option<&str>) {
        *self.login_token.lock() = token.map(str::to_string);
    }

    pub fn set_login_expires_at(&self, at: Option<DateTime<Utc>>) {
        *self.login_expires_at.lock() = at;
    }

    pub fn set_token_valid(&self, valid: bool) {
        self.token_valid.store(valid, Ordering::SeqCst);
    }

    pub fn set_validate_error(&self, error: Option<SessionError>) {
        *self.validate_error.lock() = error;
    }

    pub fn set_refresh_token(&self, token: Option<&str>) {
        *self.refresh_token.lock() = token.map(str::to_string);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let token = self.login_token.lock().clone();
        match token {
            Some(token) => Ok(LoginResponse {
                token,
                user: admin_user(),
                expires_at: *self.login_expires_at.lock(),
            }),
            None => Err(SessionError::AuthenticationFailed("Invalid credentials".to_string())),
        }
    }

    async fn validate_token(&self, _token: &str) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.validate_error.lock().clone() {
            return Err(err);
        }
        Ok(self.token_valid.load(Ordering::SeqCst))
    }

    async fn refresh(&self, _token: &str) -> Result<RefreshResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let token = self.refresh_token.lock().clone();
        match token {
            Some(token) => Ok(RefreshResponse {
                token,
                expires_at: None,
            }),
            None => Err(SessionError::RefreshFailed("refresh token revoked".to_string())),
        }
    }
}

/// Controller wired to a fake gateway, an in-memory store and tokio time.
pub struct Harness {
    pub controller: SessionController,
    pub gateway: Arc<FakeGateway>,
    pub backend: Arc<MemoryCredentialStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let backend = Arc::new(MemoryCredentialStore::new());
        let controller = SessionController::with_clock(
            gateway.clone(),
            SessionStore::new(backend.clone()),
            config,
            Arc::new(TokioClock::new()),
        );
        Self {
            controller,
            gateway,
            backend,
        }
    }

    pub fn store(&self) -> SessionStore {
        SessionStore::new(self.backend.clone())
    }
}

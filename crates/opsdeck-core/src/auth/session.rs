use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::User;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// Token still valid but about to lapse. Requests keep using it.
    NearExpiry,
    Refreshing,
    /// Refresh failed or the token ran out. Treated like `Unauthenticated`
    /// by consumers, kept distinct so the UI can explain why.
    Expired,
}

impl SessionStatus {
    /// Statuses in which a token is held
    pub fn holds_token(&self) -> bool {
        matches!(
            self,
            SessionStatus::Authenticated | SessionStatus::NearExpiry | SessionStatus::Refreshing
        )
    }

    pub fn requires_login(&self) -> bool {
        matches!(self, SessionStatus::Unauthenticated | SessionStatus::Expired)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Unauthenticated => write!(f, "unauthenticated"),
            SessionStatus::Authenticating => write!(f, "authenticating"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
            SessionStatus::NearExpiry => write!(f, "near expiry"),
            SessionStatus::Refreshing => write!(f, "refreshing"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Token and identity, always stored and cleared as one unit.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub user: User,
    /// `None` for records persisted without an expiry; those are only ever
    /// invalidated by explicit validation.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    /// Whether the token will lapse within `buffer`
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at.map(|at| now >= at - buffer).unwrap_or(false)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|at| at - now)
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.time_until_expiry(now).map(|d| d.num_minutes().max(0))
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Snapshot of the session as seen by consumers.
///
/// Only constructible through functions that pair a record with a
/// token-holding status, so "token present iff authenticated" holds for
/// every value of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    status: SessionStatus,
    record: Option<SessionRecord>,
}

impl SessionState {
    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            record: None,
        }
    }

    pub(crate) fn authenticating() -> Self {
        Self {
            status: SessionStatus::Authenticating,
            record: None,
        }
    }

    pub(crate) fn expired() -> Self {
        Self {
            status: SessionStatus::Expired,
            record: None,
        }
    }

    pub(crate) fn authenticated(record: SessionRecord) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            record: Some(record),
        }
    }

    /// Move between token-holding statuses. Ignored for any other status.
    pub(crate) fn mark(&mut self, status: SessionStatus) {
        if self.record.is_some() && status.holds_token() {
            self.status = status;
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.record.as_ref().map(|r| &r.user)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.record.as_ref().and_then(|r| r.expires_at)
    }

    pub fn is_authenticated(&self) -> bool {
        self.status.holds_token()
    }

    pub fn is_near_expiry(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.record
            .as_ref()
            .map(|r| r.needs_refresh(now, buffer))
            .unwrap_or(false)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

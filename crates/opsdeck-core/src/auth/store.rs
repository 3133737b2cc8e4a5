use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::credentials::CredentialStore;
use super::session::SessionRecord;
use crate::error::{Result, SessionError};
use crate::models::User;

/// Store key holding the bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Store key holding the serialized user record
pub const USER_KEY: &str = "auth_user";

#[derive(Serialize, Deserialize)]
struct StoredUser {
    #[serde(flatten)]
    user: User,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Whole-record access to the credential store.
///
/// The token and the user record live under two keys but are only ever
/// written, read and removed together through this type.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn CredentialStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
        Self { backend }
    }

    /// Load the persisted session, if a complete one exists.
    ///
    /// A half-written or unreadable record is cleared and reported as absent.
    pub fn load(&self) -> Result<Option<SessionRecord>> {
        let token = self.backend.get(TOKEN_KEY)?;
        let user = self.backend.get(USER_KEY)?;

        match (token, user) {
            (None, None) => Ok(None),
            (Some(token), Some(user_json)) => match serde_json::from_str::<StoredUser>(&user_json) {
                Ok(stored) => Ok(Some(SessionRecord {
                    token,
                    user: stored.user,
                    expires_at: stored.expires_at,
                })),
                Err(e) => {
                    warn!(error = %e, "Stored user record is unreadable, clearing session");
                    self.clear()?;
                    Ok(None)
                }
            },
            (token, user) => {
                warn!(
                    has_token = token.is_some(),
                    has_user = user.is_some(),
                    "Stored session is incomplete, clearing"
                );
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Persist a record. The user is written before the token so an
    /// interrupted save never leaves a token without its user.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let stored = StoredUser {
            user: record.user.clone(),
            expires_at: record.expires_at,
        };
        let user_json = serde_json::to_string(&stored)
            .map_err(|e| SessionError::Storage(format!("Failed to serialize user record: {}", e)))?;

        self.backend.set(USER_KEY, &user_json)?;
        if let Err(e) = self.backend.set(TOKEN_KEY, &record.token) {
            if let Err(rollback) = self.backend.remove(USER_KEY) {
                warn!(error = %rollback, "Failed to roll back user record");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove both keys. Both removals are attempted; the first error wins.
    pub fn clear(&self) -> Result<()> {
        let token = self.backend.remove(TOKEN_KEY);
        let user = self.backend.remove(USER_KEY);
        token.and(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::MemoryCredentialStore;

    fn record() -> SessionRecord {
        SessionRecord {
            token: "abc123".to_string(),
            user: User {
                id: "1".to_string(),
                email: "admin@x.com".to_string(),
                role: "admin".to_string(),
                display_name: Some("Admin".to_string()),
            },
            expires_at: Some(Utc::now()),
        }
    }

    /// Accepts user writes but refuses to store a token.
    #[derive(Default)]
    struct TokenRejectingStore {
        inner: MemoryCredentialStore,
    }

    impl CredentialStore for TokenRejectingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == TOKEN_KEY {
                return Err(SessionError::Storage("keychain locked".to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_save_load_clear() {
        let backend = Arc::new(MemoryCredentialStore::new());
        let store = SessionStore::new(backend.clone());

        assert!(store.load().unwrap().is_none());

        let rec = record();
        store.save(&rec).unwrap();
        assert_eq!(store.load().unwrap(), Some(rec));

        store.clear().unwrap();
        assert!(!backend.contains(TOKEN_KEY));
        assert!(!backend.contains(USER_KEY));
    }

    #[test]
    fn test_token_without_user_is_cleared() {
        let backend = Arc::new(MemoryCredentialStore::new());
        backend.set(TOKEN_KEY, "orphan").unwrap();

        let store = SessionStore::new(backend.clone());
        assert!(store.load().unwrap().is_none());
        assert!(!backend.contains(TOKEN_KEY));
    }

    #[test]
    fn test_unreadable_user_is_cleared() {
        let backend = Arc::new(MemoryCredentialStore::new());
        backend.set(TOKEN_KEY, "abc123").unwrap();
        backend.set(USER_KEY, "{not json").unwrap();

        let store = SessionStore::new(backend.clone());
        assert!(store.load().unwrap().is_none());
        assert!(!backend.contains(TOKEN_KEY));
        assert!(!backend.contains(USER_KEY));
    }

    #[test]
    fn test_record_without_expiry_loads() {
        let backend = Arc::new(MemoryCredentialStore::new());
        backend.set(TOKEN_KEY, "abc123").unwrap();
        backend
            .set(USER_KEY, r#"{"id":7,"email":"admin@x.com","role":"admin"}"#)
            .unwrap();

        let loaded = SessionStore::new(backend).load().unwrap().unwrap();
        assert_eq!(loaded.user.id, "7");
        assert_eq!(loaded.expires_at, None);
    }

    #[test]
    fn test_failed_token_write_rolls_back_user() {
        let backend = Arc::new(TokenRejectingStore::default());
        let store = SessionStore::new(backend.clone());

        assert!(matches!(store.save(&record()), Err(SessionError::Storage(_))));
        assert!(!backend.inner.contains(USER_KEY));
    }
}

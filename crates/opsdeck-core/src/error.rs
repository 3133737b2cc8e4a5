//! Error taxonomy shared by the session controller, the stats cache and
//! the HTTP layer.

use thiserror::Error;

/// Errors surfaced by session and statistics operations.
///
/// `Clone` because a single in-flight refresh or fetch hands its outcome to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Authentication required - no valid session")]
    AuthenticationRequired,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Statistics fetch failed: {0}")]
    CacheFetchError(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl SessionError {
    /// Errors that end the current session. These are never retried and
    /// always send the caller back to a login surface.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SessionError::AuthenticationRequired | SessionError::RefreshFailed(_)
        )
    }

    /// Transport-level failures the fetch layer may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::NetworkError(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_not_retryable() {
        let required = SessionError::AuthenticationRequired;
        let refresh = SessionError::RefreshFailed("revoked".to_string());

        assert!(required.is_auth_error());
        assert!(refresh.is_auth_error());
        assert!(!required.is_retryable());
        assert!(!refresh.is_retryable());
    }

    #[test]
    fn test_login_failure_is_not_session_ending() {
        // A rejected login must not tear down an existing session
        let err = SessionError::AuthenticationFailed("bad password".to_string());
        assert!(!err.is_auth_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_network_error_is_retryable() {
        let err = SessionError::NetworkError("connection reset".to_string());
        assert!(err.is_retryable());
        assert!(!err.is_auth_error());

        assert!(!SessionError::CacheFetchError("404".to_string()).is_retryable());
        assert!(!SessionError::Storage("locked".to_string()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SessionError::AuthenticationFailed("Invalid credentials".to_string()).to_string(),
            "Authentication failed: Invalid credentials"
        );
        assert_eq!(
            SessionError::NetworkError("timed out".to_string()).to_string(),
            "Network error: timed out"
        );
    }
}

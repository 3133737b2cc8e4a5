//! Authentication module for managing the console session.
//!
//! This module provides:
//! - `SessionController`: login, logout, validation, refresh and the
//!   background expiry checker
//! - `AuthGateway`: the remote authentication endpoints
//! - `CredentialStore`: where the token and user record are persisted
//!
//! Tokens are assumed to live 60 minutes unless the backend says otherwise,
//! and count as near expiry 5 minutes before that.

pub mod controller;
pub mod credentials;
pub mod gateway;
pub mod session;
pub mod store;

pub use controller::SessionController;
pub use credentials::{CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use gateway::{AuthGateway, HttpAuthGateway};
pub use session::{SessionRecord, SessionState, SessionStatus};
pub use store::{SessionStore, TOKEN_KEY, USER_KEY};

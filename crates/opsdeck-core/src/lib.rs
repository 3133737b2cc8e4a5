//! Core library for opsdeck.
//!
//! The load-bearing logic of the admin console: the session lifecycle
//! (login, validation, expiry tracking, refresh, forced logout) and the TTL
//! statistics cache every dashboard panel reads through. Front ends (the
//! `opsdeck` CLI) build a [`Console`] and drive it.

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod stats;

#[cfg(test)]
mod testing;

pub use app::Console;
pub use auth::{SessionController, SessionState, SessionStatus};
pub use cache::{GetOptions, StatsCache, StatsKey};
pub use config::Config;
pub use error::{Result, SessionError};
pub use stats::{StatsService, StatsSource, DEFAULT_ACTIVITY_DAYS};

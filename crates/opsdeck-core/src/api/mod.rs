//! REST API client module for the admin backend.
//!
//! This module provides the `ApiClient` for fetching dashboard, system and
//! activity statistics. Requests carry the session's bearer token; transient
//! failures are retried with exponential backoff.

pub mod client;
pub mod error;
pub mod retry;

pub use client::ApiClient;
pub use error::ApiError;
pub use retry::{with_retry, RetryPolicy};

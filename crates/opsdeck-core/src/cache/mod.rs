//! In-memory TTL cache for dashboard statistics.
//!
//! This module provides the `StatsCache` every dashboard panel reads through.
//! Entries are keyed by `StatsKey` (parameterised keys such as activity stats
//! for N days are distinct entries) and considered stale once older than the
//! cache's TTL, 5 minutes by default.

pub mod entry;
pub mod key;
pub mod stats;

pub use entry::CacheEntry;
pub use key::StatsKey;
pub use stats::{GetOptions, StatsCache};

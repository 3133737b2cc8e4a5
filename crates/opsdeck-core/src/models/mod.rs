//! Data models for the admin console backend.
//!
//! - `User`, `Credentials`: identity returned by the Auth Gateway and the
//!   login payload sent to it
//! - `LoginResponse`, `RefreshResponse`: Auth Gateway wire types
//! - Statistics snapshots: `DashboardStats`, `SystemMetrics`, `SystemStats`,
//!   `ActivityStats`, and the `StatsSnapshot` envelope stored in the cache

pub mod stats;
pub mod user;

pub use stats::{ActivityPoint, ActivityStats, DashboardStats, StatsSnapshot, SystemMetrics, SystemStats};
pub use user::{Credentials, LoginResponse, RefreshResponse, User};

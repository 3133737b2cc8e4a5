//! Typed statistics access for dashboard panels.
//!
//! `StatsService` reads every statistic through one shared `StatsCache`,
//! using the token held by the `SessionController`. Authentication failures
//! from the backend are handed back to the controller, which ends the
//! session; other failures only affect the panel that asked.
//!
//! Cached values belong to the token they were fetched under. The first
//! read under a different token, or with no session at all, drops them.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::auth::SessionController;
use crate::cache::{GetOptions, StatsCache, StatsKey};
use crate::error::{Result, SessionError};
use crate::models::{ActivityStats, DashboardStats, StatsSnapshot, SystemMetrics, SystemStats};

/// Default window for the activity chart
pub const DEFAULT_ACTIVITY_DAYS: u32 = 7;

/// Remote statistics calls, one per cache key.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn dashboard_stats(&self, token: &str) -> Result<DashboardStats>;
    async fn system_metrics(&self, token: &str) -> Result<SystemMetrics>;
    async fn system_stats(&self, token: &str) -> Result<SystemStats>;
    async fn activity_stats(&self, token: &str, days: u32) -> Result<ActivityStats>;
}

#[async_trait]
impl StatsSource for ApiClient {
    async fn dashboard_stats(&self, token: &str) -> Result<DashboardStats> {
        self.fetch_dashboard_stats(token).await
    }

    async fn system_metrics(&self, token: &str) -> Result<SystemMetrics> {
        self.fetch_system_metrics(token).await
    }

    async fn system_stats(&self, token: &str) -> Result<SystemStats> {
        self.fetch_system_stats(token).await
    }

    async fn activity_stats(&self, token: &str, days: u32) -> Result<ActivityStats> {
        self.fetch_activity_stats(token, days).await
    }
}

async fn fetch_snapshot(source: Arc<dyn StatsSource>, token: String, key: StatsKey) -> Result<StatsSnapshot> {
    match key {
        StatsKey::DashboardStats => source.dashboard_stats(&token).await.map(StatsSnapshot::Dashboard),
        StatsKey::SystemMetrics => source.system_metrics(&token).await.map(StatsSnapshot::SystemMetrics),
        StatsKey::SystemStats => source.system_stats(&token).await.map(StatsSnapshot::SystemStats),
        StatsKey::ActivityStats { days } => source
            .activity_stats(&token, days)
            .await
            .map(StatsSnapshot::Activity),
    }
}

fn unexpected(key: StatsKey, snapshot: &StatsSnapshot) -> SessionError {
    SessionError::CacheFetchError(format!("{} holds {} data", key, snapshot.kind()))
}

#[derive(Clone)]
pub struct StatsService {
    source: Arc<dyn StatsSource>,
    cache: StatsCache<StatsKey, StatsSnapshot>,
    session: SessionController,
    /// Token the cached values were fetched under
    owner: Arc<Mutex<Option<String>>>,
}

impl StatsService {
    pub fn new(
        source: Arc<dyn StatsSource>,
        cache: StatsCache<StatsKey, StatsSnapshot>,
        session: SessionController,
    ) -> Self {
        Self {
            source,
            cache,
            session,
            owner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache(&self) -> &StatsCache<StatsKey, StatsSnapshot> {
        &self.cache
    }

    /// Read `key` through the cache with the current session token.
    pub async fn fetch(&self, key: StatsKey, options: GetOptions) -> Result<StatsSnapshot> {
        let token = self.session.state().token().map(str::to_string);
        self.claim_cache(token.as_deref());
        let Some(token) = token else {
            return Err(SessionError::AuthenticationRequired);
        };

        let source = Arc::clone(&self.source);
        let fetch_token = token.clone();
        let result = self
            .cache
            .get(key, move || fetch_snapshot(source, fetch_token, key), options)
            .await;

        if let Err(e) = &result {
            debug!(key = %key, error = %e, "Statistics unavailable");
            if self.session.report_auth_failure(&token, e) {
                self.cache.clear_all();
            }
        }
        result
    }

    pub async fn dashboard_stats(&self, options: GetOptions) -> Result<DashboardStats> {
        let key = StatsKey::DashboardStats;
        match self.fetch(key, options).await? {
            StatsSnapshot::Dashboard(stats) => Ok(stats),
            other => Err(unexpected(key, &other)),
        }
    }

    pub async fn system_metrics(&self, options: GetOptions) -> Result<SystemMetrics> {
        let key = StatsKey::SystemMetrics;
        match self.fetch(key, options).await? {
            StatsSnapshot::SystemMetrics(metrics) => Ok(metrics),
            other => Err(unexpected(key, &other)),
        }
    }

    pub async fn system_stats(&self, options: GetOptions) -> Result<SystemStats> {
        let key = StatsKey::SystemStats;
        match self.fetch(key, options).await? {
            StatsSnapshot::SystemStats(stats) => Ok(stats),
            other => Err(unexpected(key, &other)),
        }
    }

    pub async fn activity_stats(&self, days: u32, options: GetOptions) -> Result<ActivityStats> {
        let key = StatsKey::ActivityStats { days };
        match self.fetch(key, options).await? {
            StatsSnapshot::Activity(stats) => Ok(stats),
            other => Err(unexpected(key, &other)),
        }
    }

    /// Hand the cache to `token`, dropping whatever another session left.
    fn claim_cache(&self, token: Option<&str>) {
        let mut owner = self.owner.lock();
        if owner.as_deref() == token {
            return;
        }
        if owner.is_some() {
            info!("Session changed, dropping cached statistics");
        }
        self.cache.clear_all();
        *owner = token.map(str::to_string);
    }

    /// Drop all cached statistics.
    pub fn invalidate(&self) {
        self.cache.clear_all();
    }

    /// End the session and forget everything fetched under it.
    pub fn logout(&self) {
        self.session.logout();
        self.cache.clear_all();
        info!("Statistics cache cleared on logout");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::auth::SessionStatus;
    use crate::testing::{admin_credentials, Harness};

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        tokens: Mutex<Vec<String>>,
        error: Mutex<Option<SessionError>>,
    }

    impl FakeSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn record(&self, token: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().push(token.to_string());
            match self.error.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl StatsSource for FakeSource {
        async fn dashboard_stats(&self, token: &str) -> Result<DashboardStats> {
            self.record(token)?;
            Ok(DashboardStats {
                total_users: 120,
                ..DashboardStats::default()
            })
        }

        async fn system_metrics(&self, token: &str) -> Result<SystemMetrics> {
            self.record(token)?;
            Ok(SystemMetrics::default())
        }

        async fn system_stats(&self, token: &str) -> Result<SystemStats> {
            self.record(token)?;
            Ok(SystemStats::default())
        }

        async fn activity_stats(&self, token: &str, days: u32) -> Result<ActivityStats> {
            self.record(token)?;
            Ok(ActivityStats {
                days,
                points: Vec::new(),
            })
        }
    }

    async fn logged_in() -> (Harness, Arc<FakeSource>, StatsService) {
        let h = Harness::new();
        h.controller.login(&admin_credentials()).await.unwrap();
        let source = Arc::new(FakeSource::default());
        let service = StatsService::new(source.clone(), StatsCache::default(), h.controller.clone());
        (h, source, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_panels_share_cached_stats() {
        let (_h, source, service) = logged_in().await;

        let first = service.dashboard_stats(GetOptions::default()).await.unwrap();
        let second = service.dashboard_stats(GetOptions::default()).await.unwrap();

        assert_eq!(first.total_users, 120);
        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert_eq!(source.tokens.lock().as_slice(), ["abc123"]);

        service.dashboard_stats(GetOptions::force()).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_windows_are_cached_separately() {
        let (_h, source, service) = logged_in().await;

        let week = service.activity_stats(7, GetOptions::default()).await.unwrap();
        let fortnight = service.activity_stats(14, GetOptions::default()).await.unwrap();
        service.activity_stats(7, GetOptions::default()).await.unwrap();

        assert_eq!(week.days, 7);
        assert_eq!(fortnight.days, 14);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_requires_login_without_fetching() {
        let (h, source, service) = logged_in().await;
        service.system_stats(GetOptions::default()).await.unwrap();
        h.controller.logout();

        let err = service.system_stats(GetOptions::default()).await.unwrap_err();

        assert_eq!(err, SessionError::AuthenticationRequired);
        assert_eq!(source.calls(), 1);
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_auth_failure_ends_session() {
        let (h, source, service) = logged_in().await;
        service.system_metrics(GetOptions::default()).await.unwrap();
        *source.error.lock() = Some(SessionError::AuthenticationRequired);

        let err = service.dashboard_stats(GetOptions::default()).await.unwrap_err();

        assert_eq!(err, SessionError::AuthenticationRequired);
        assert_eq!(h.controller.status(), SessionStatus::Unauthenticated);
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_only_affects_that_panel() {
        let (h, source, service) = logged_in().await;
        service.system_metrics(GetOptions::default()).await.unwrap();
        *source.error.lock() = Some(SessionError::CacheFetchError("Status 404".to_string()));

        let err = service.dashboard_stats(GetOptions::default()).await.unwrap_err();

        assert!(matches!(err, SessionError::CacheFetchError(_)));
        assert_eq!(h.controller.status(), SessionStatus::Authenticated);
        assert!(service.cache().peek(&StatsKey::SystemMetrics).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_session_never_sees_previous_stats() {
        let (h, source, service) = logged_in().await;
        service.dashboard_stats(GetOptions::default()).await.unwrap();

        h.controller.logout();
        h.gateway.set_login_token(Some("other-user-token"));
        h.controller.login(&admin_credentials()).await.unwrap();
        service.dashboard_stats(GetOptions::default()).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(source.tokens.lock().as_slice(), ["abc123", "other-user-token"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_token_refetches() {
        let (h, source, service) = logged_in().await;
        service.system_stats(GetOptions::default()).await.unwrap();

        h.controller.refresh().await.unwrap();
        service.system_stats(GetOptions::default()).await.unwrap();
        service.system_stats(GetOptions::default()).await.unwrap();

        assert_eq!(source.tokens.lock().as_slice(), ["abc123", "def456"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_cache() {
        let (h, _source, service) = logged_in().await;
        service.dashboard_stats(GetOptions::default()).await.unwrap();

        service.logout();

        assert!(service.cache().is_empty());
        assert_eq!(h.controller.status(), SessionStatus::Unauthenticated);
    }
}

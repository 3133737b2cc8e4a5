//! API client for the admin backend's statistics endpoints.
//!
//! The client holds no session state: every call takes the bearer token it
//! should use, so the session controller stays the only owner of the token.

use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::retry::{with_retry, RetryPolicy};
use super::ApiError;
use crate::error::{Result, SessionError};
use crate::models::{ActivityStats, DashboardStats, SystemMetrics, SystemStats};

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_once<T: DeserializeOwned>(&self, token: &str, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let text = response.text().await.map_err(ApiError::from)?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)).into()
        })
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, path: &str, query: &[(&str, String)]) -> Result<T> {
        with_retry(self.retry, path, || self.get_once(token, path, query)).await
    }

    pub async fn fetch_dashboard_stats(&self, token: &str) -> Result<DashboardStats> {
        self.get(token, "/admin/dashboard/stats", &[]).await
    }

    pub async fn fetch_system_metrics(&self, token: &str) -> Result<SystemMetrics> {
        self.get(token, "/admin/system/metrics", &[]).await
    }

    pub async fn fetch_system_stats(&self, token: &str) -> Result<SystemStats> {
        self.get(token, "/admin/system/stats", &[]).await
    }

    pub async fn fetch_activity_stats(&self, token: &str, days: u32) -> Result<ActivityStats> {
        let mut stats: ActivityStats = self
            .get(token, "/admin/activity/stats", &[("days", days.to_string())])
            .await?;
        if stats.days == 0 {
            stats.days = days;
        }
        Ok(stats)
    }
}

//! Wiring for the admin console.
//!
//! `Console` builds exactly one `SessionController` and one `StatsCache` from
//! a `Config` and hands them to everything that needs them.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info};

use crate::api::{ApiClient, RetryPolicy};
use crate::auth::{
    AuthGateway, CredentialStore, FileCredentialStore, HttpAuthGateway, KeyringCredentialStore,
    MemoryCredentialStore, SessionController, SessionStore,
};
use crate::cache::{StatsCache, StatsKey};
use crate::config::{Config, CredentialBackend};
use crate::models::StatsSnapshot;
use crate::stats::{StatsService, StatsSource};

pub struct Console {
    pub config: Config,
    pub session: SessionController,
    pub stats: StatsService,
}

impl Console {
    /// Build the console against the configured backend.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = credential_backend(&config)?;

        let client = Client::builder()
            .timeout(config.session.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let gateway: Arc<dyn AuthGateway> =
            Arc::new(HttpAuthGateway::with_client(client.clone(), config.api_base_url.clone()));
        let api = ApiClient::with_client(client, config.api_base_url.clone())
            .with_retry_policy(RetryPolicy::from_config(&config.stats));

        Ok(Self::with_parts(config, gateway, backend, Arc::new(api)))
    }

    /// Build the console from explicit collaborators.
    pub fn with_parts(
        config: Config,
        gateway: Arc<dyn AuthGateway>,
        backend: Arc<dyn CredentialStore>,
        source: Arc<dyn StatsSource>,
    ) -> Self {
        let session = SessionController::new(gateway, SessionStore::new(backend), config.session.clone());
        let cache: StatsCache<StatsKey, StatsSnapshot> =
            StatsCache::with_fetch_timeout(config.stats.ttl(), config.stats.fetch_timeout());
        let stats = StatsService::new(source, cache, session.clone());

        debug!(
            api = %config.api_base_url,
            backend = ?config.credential_backend,
            "Console wired"
        );
        Self { config, session, stats }
    }

    /// Cancel background timers. The persisted session is kept.
    pub fn shutdown(&self) {
        self.session.shutdown();
        info!("Console shut down");
    }
}

fn credential_backend(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.credential_backend {
        CredentialBackend::File => Arc::new(FileCredentialStore::new(config.credentials_path()?)),
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    };
    Ok(store)
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::error::{Result, SessionError};
use crate::models::{Credentials, LoginResponse, RefreshResponse};

/// Remote authentication endpoints.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials for a token. Rejection is `AuthenticationFailed`.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse>;

    /// `Ok(false)` means the backend considers the token invalid.
    async fn validate_token(&self, token: &str) -> Result<bool>;

    /// Exchange the current token for a new one. Rejection is `RefreshFailed`.
    async fn refresh(&self, token: &str) -> Result<RefreshResponse>;
}

/// Auth Gateway over the console's REST backend.
#[derive(Clone)]
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
}

impl HttpAuthGateway {
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
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(e: reqwest::Error) -> SessionError {
        ApiError::from(e).into()
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .header(header::ACCEPT, "application/json")
            .json(credentials)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = ApiError::message_from_body(&body);
            warn!(status = status.as_u16(), "Login rejected");
            return Err(SessionError::AuthenticationFailed(message));
        }

        response.json::<LoginResponse>().await.map_err(|e| {
            SessionError::AuthenticationFailed(format!("Failed to parse login response: {}", e))
        })
    }

    async fn validate_token(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/auth/validate-token"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        debug!(status = status.as_u16(), "Token validation response");
        Ok(status.is_success())
    }

    async fn refresh(&self, token: &str) -> Result<RefreshResponse> {
        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::RefreshFailed(format!(
                "Status {}: {}",
                status,
                ApiError::message_from_body(&body)
            )));
        }

        response.json::<RefreshResponse>().await.map_err(|e| {
            SessionError::RefreshFailed(format!("Failed to parse refresh response: {}", e))
        })
    }
}

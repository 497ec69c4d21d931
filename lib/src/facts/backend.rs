//! Verification backend REST client.
//!
//! Serves user facts, the user-update long poll and service properties
//! (the persisted per-guild settings).

use super::{FactProvider, UserFacts};
use crate::error::{FactError, FactResult};
use crate::id::UserId;
use crate::settings::{PropertySource, ServiceProperty};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use std::time::Duration;

/// Platform discriminator of Discord in the backend.
pub const DISCORD_PLATFORM_ID: u32 = 2;

/// Backend REST client
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    service: String,
    platform_id: u32,
}

impl BackendClient {
    /// Create a new client for one service registration
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        service: impl Into<String>,
    ) -> FactResult<Self> {
        // The update poll holds the connection open, so the timeout is generous.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FactError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            service: service.into(),
            platform_id: DISCORD_PLATFORM_ID,
        })
    }

    /// Use a different platform discriminator
    pub fn with_platform_id(mut self, platform_id: u32) -> Self {
        self.platform_id = platform_id;
        self
    }

    /// Platform discriminator used for lookups
    pub fn platform_id(&self) -> u32 {
        self.platform_id
    }

    fn build_headers(&self) -> FactResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|e| FactError::Parse(format!("Invalid backend token: {e}")))?,
        );
        Ok(headers)
    }

    async fn get(&self, url: String) -> FactResult<Response> {
        self.client
            .get(url)
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| FactError::Network(e.to_string()))
    }
}

async fn check_status(response: Response) -> FactResult<Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(FactError::NotFound);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(FactError::Server {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> FactResult<T> {
    response
        .json()
        .await
        .map_err(|e| FactError::Parse(e.to_string()))
}

#[async_trait]
impl FactProvider for BackendClient {
    async fn get_user(&self, user: &UserId) -> FactResult<UserFacts> {
        let url = format!(
            "{}/v1/platforms/{}/users/{}",
            self.base_url, self.platform_id, user
        );
        let response = check_status(self.get(url).await?).await?;
        parse(response).await
    }

    async fn next_update(&self) -> FactResult<Option<UserFacts>> {
        let url = format!("{}/v1/services/{}/user_updates", self.base_url, self.service);
        let response = self.get(url).await?;
        if response.status() == StatusCode::REQUEST_TIMEOUT {
            return Ok(None);
        }
        let response = check_status(response).await?;
        parse(response).await.map(Some)
    }
}

#[async_trait]
impl PropertySource for BackendClient {
    async fn properties(&self) -> FactResult<Vec<ServiceProperty>> {
        let url = format!("{}/v1/services/{}/properties", self.base_url, self.service);
        let response = check_status(self.get(url).await?).await?;
        parse(response).await
    }

    async fn put_property(&self, subject: &str, name: &str, value: &str) -> FactResult<()> {
        let url = format!(
            "{}/v1/services/{}/subjects/{}/properties/{}",
            self.base_url, self.service, subject, name
        );
        let response = self
            .client
            .put(url)
            .headers(self.build_headers()?)
            .json(&value)
            .send()
            .await
            .map_err(|e| FactError::Network(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BackendClient::new("http://backend/", "token", "svc").unwrap();
        assert_eq!(client.base_url, "http://backend");
        assert_eq!(client.platform_id(), DISCORD_PLATFORM_ID);
        assert_eq!(client.with_platform_id(7).platform_id(), 7);
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let client = BackendClient::new("http://backend", "secret", "svc").unwrap();
        let headers = client.build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let client = BackendClient::new("http://127.0.0.1:9", "t", "svc").unwrap();
        let err = client.get_user(&UserId::new("1")).await.unwrap_err();
        assert!(matches!(err, FactError::Network(_)));
    }
}

//! Minimal Guild Wars 2 API client.
//!
//! This crate covers the two public, unauthenticated endpoints the alliance
//! service needs:
//! - Guild lookup by ID (`/v2/guild/:id`)
//! - Current World vs. World matchups (`/v2/wvw/matches`)

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.guildwars2.com/v2";
const SCHEMA_VERSION: &str = "2022-03-23T19:00:00.000Z";

/// Errors that can occur when using the GW2 client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by the GW2 API")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Guild Wars 2 API client.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a client against the public API.
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root (mirrors, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The API root this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch public details of a guild.
    pub async fn guild(&self, id: &str) -> Result<Guild, Error> {
        let url = format!("{}/guild/{id}", self.base_url);
        self.get_json(&url, id).await
    }

    /// Fetch every currently running WvW matchup.
    pub async fn wvw_matches(&self) -> Result<Vec<Match>, Error> {
        let url = format!("{}/wvw/matches?ids=all", self.base_url);
        self.get_json(&url, "wvw/matches").await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
    ) -> Result<T, Error> {
        let response = self
            .client
            .get(url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(Error::RateLimited),
            StatusCode::NOT_FOUND => return Err(Error::NotFound(resource.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Api {
                    status: status.as_u16(),
                    message: error_text(&body),
                });
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("X-Schema-Version", HeaderValue::from_static(SCHEMA_VERSION));
        headers
    }
}

/// Public guild details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub tag: String,
}

/// One WvW matchup between three sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub all_worlds: Sides,
}

/// World IDs grouped by side. Each side is one linked group of worlds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sides {
    #[serde(default)]
    pub red: Vec<u32>,
    #[serde(default)]
    pub blue: Vec<u32>,
    #[serde(default)]
    pub green: Vec<u32>,
}

impl Sides {
    /// The three sides in a fixed order.
    pub fn groups(&self) -> [&[u32]; 3] {
        [&self.red, &self.blue, &self.green]
    }
}

// Error bodies look like `{"text": "no such id"}`.
#[derive(Deserialize)]
struct ApiErrorBody {
    text: String,
}

fn error_text(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.text)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Client::new().unwrap();
        assert_eq!(client.base_url(), API_BASE);
    }

    #[test]
    fn test_client_with_base_url() {
        let client = Client::new().unwrap().with_base_url("http://localhost:8080/v2/");
        assert_eq!(client.base_url(), "http://localhost:8080/v2");
    }

    #[test]
    fn test_parse_guild() {
        let json = r#"{
            "level": 69,
            "motd": "hello",
            "id": "116E0C0E-0035-44A9-BB22-4AE3E23127E5",
            "name": "Deep Wound",
            "tag": "DW",
            "emblem": {}
        }"#;
        let guild: Guild = serde_json::from_str(json).unwrap();
        assert_eq!(guild.name, "Deep Wound");
        assert_eq!(guild.tag, "DW");
    }

    #[test]
    fn test_parse_match() {
        let json = r#"[{
            "id": "2-1",
            "start_time": "2024-01-12T18:00:00Z",
            "end_time": "2024-01-19T18:00:00Z",
            "worlds": {"red": 2202, "blue": 2009, "green": 2003},
            "all_worlds": {"red": [2202, 2105], "blue": [2009, 2012], "green": [2003]}
        }]"#;
        let matches: Vec<Match> = serde_json::from_str(json).unwrap();
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.all_worlds.red, vec![2202, 2105]);
        assert_eq!(m.all_worlds.groups()[2], &[2003]);
        assert_eq!(
            m.end_time.unwrap().to_rfc3339(),
            "2024-01-19T18:00:00+00:00"
        );
    }

    #[test]
    fn test_parse_match_missing_end_time() {
        let json = r#"{"id": "1-1", "all_worlds": {"red": [1001]}}"#;
        let m: Match = serde_json::from_str(json).unwrap();
        assert!(m.end_time.is_none());
        assert!(m.all_worlds.blue.is_empty());
    }

    #[test]
    fn test_error_text() {
        assert_eq!(error_text(r#"{"text":"no such id"}"#), "no such id");
        assert_eq!(error_text("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = Client::new().unwrap().with_base_url("http://127.0.0.1:9");
        let err = client.guild("abc").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}

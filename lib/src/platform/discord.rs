//! Discord REST implementation of [`ChatPlatform`].

use super::{ChatPlatform, Member, Role};
use crate::error::{PlatformError, PlatformResult};
use crate::id::{GuildId, RoleId, UserId};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST client authenticated as a bot
#[derive(Clone)]
pub struct DiscordRest {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DiscordRest {
    /// Create a new client with a bot token
    pub fn new(token: impl Into<String>) -> PlatformResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PlatformError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_headers(&self) -> PlatformResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bot {}", self.token))
                .map_err(|e| PlatformError::Configuration(format!("Invalid bot token: {e}")))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> PlatformResult<Response> {
        let response = request
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .json::<ApiRateLimit>()
                .await
                .ok()
                .and_then(|r| r.delay());
            return Err(PlatformError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    fn member_role_url(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> String {
        format!(
            "{}/guilds/{guild}/members/{user}/roles/{role}",
            self.base_url
        )
    }
}

async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> PlatformResult<T> {
    response
        .json()
        .await
        .map_err(|e| PlatformError::Parse(e.to_string()))
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    async fn add_role(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> PlatformResult<()> {
        let url = self.member_role_url(guild, user, role);
        self.send(self.client.put(url)).await.map(|_| ())
    }

    async fn remove_role(
        &self,
        guild: &GuildId,
        user: &UserId,
        role: &RoleId,
    ) -> PlatformResult<()> {
        let url = self.member_role_url(guild, user, role);
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn set_nickname(&self, guild: &GuildId, user: &UserId, nick: &str) -> PlatformResult<()> {
        let url = format!("{}/guilds/{guild}/members/{user}", self.base_url);
        let body = serde_json::json!({ "nick": nick });
        self.send(self.client.patch(url).json(&body)).await.map(|_| ())
    }

    async fn list_roles(&self, guild: &GuildId) -> PlatformResult<Vec<Role>> {
        let url = format!("{}/guilds/{guild}/roles", self.base_url);
        let roles: Vec<ApiRole> = parse(self.send(self.client.get(url)).await?).await?;
        Ok(roles.into_iter().map(|r| Role::new(r.id, r.name)).collect())
    }

    async fn list_members(
        &self,
        guild: &GuildId,
        after: Option<&UserId>,
        limit: usize,
    ) -> PlatformResult<Vec<Member>> {
        let mut url = format!("{}/guilds/{guild}/members?limit={limit}", self.base_url);
        if let Some(after) = after {
            url.push_str(&format!("&after={after}"));
        }
        let members: Vec<ApiMember> = parse(self.send(self.client.get(url)).await?).await?;
        Ok(members.into_iter().map(Member::from).collect())
    }

    async fn member(&self, guild: &GuildId, user: &UserId) -> PlatformResult<Option<Member>> {
        let url = format!("{}/guilds/{guild}/members/{user}", self.base_url);
        match self.send(self.client.get(url)).await {
            Ok(response) => parse::<ApiMember>(response).await.map(|m| Some(m.into())),
            Err(PlatformError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn guilds(&self) -> PlatformResult<Vec<GuildId>> {
        let url = format!("{}/users/@me/guilds", self.base_url);
        let guilds: Vec<ApiGuild> = parse(self.send(self.client.get(url)).await?).await?;
        Ok(guilds.into_iter().map(|g| g.id).collect())
    }
}

// ============================================================================
// API types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiRole {
    id: RoleId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: UserId,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    user: ApiUser,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<RoleId>,
}

impl From<ApiMember> for Member {
    fn from(m: ApiMember) -> Self {
        Member {
            user_id: m.user.id,
            username: m.user.username,
            nick: m.nick,
            roles: m.roles,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiGuild {
    id: GuildId,
}

#[derive(Debug, Deserialize)]
struct ApiRateLimit {
    retry_after: f64,
}

impl ApiRateLimit {
    /// `None` when the value does not fit a `Duration`
    fn delay(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.retry_after.max(0.0)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member() {
        let json = r#"{
            "user": {"id": "80351110224678912", "username": "nelly"},
            "nick": "NOT API SUPPORT",
            "roles": ["41771983423143936"],
            "joined_at": "2015-04-26T06:26:56.936000+00:00"
        }"#;
        let member: Member = serde_json::from_str::<ApiMember>(json).unwrap().into();
        assert_eq!(member.user_id, UserId::new("80351110224678912"));
        assert_eq!(member.display_name(), "NOT API SUPPORT");
        assert_eq!(member.roles, vec![RoleId::new("41771983423143936")]);
    }

    #[test]
    fn test_parse_member_without_nick() {
        let json = r#"{"user": {"id": "1", "username": "plain"}, "nick": null, "roles": []}"#;
        let member: Member = serde_json::from_str::<ApiMember>(json).unwrap().into();
        assert_eq!(member.nick, None);
        assert_eq!(member.display_name(), "plain");
    }

    #[test]
    fn test_rate_limit_delay() {
        let parse = |json: &str| serde_json::from_str::<ApiRateLimit>(json).unwrap().delay();
        assert_eq!(parse(r#"{"retry_after": 1.5}"#), Some(Duration::from_millis(1500)));
        assert_eq!(parse(r#"{"retry_after": -3.0}"#), Some(Duration::ZERO));
        assert_eq!(parse(r#"{"retry_after": 1e300}"#), None);
    }

    #[test]
    fn test_member_role_url() {
        let client = DiscordRest::new("token")
            .unwrap()
            .with_base_url("http://localhost/api/");
        let url = client.member_role_url(&GuildId::new("1"), &UserId::new("2"), &RoleId::new("3"));
        assert_eq!(url, "http://localhost/api/guilds/1/members/2/roles/3");
    }

    #[test]
    fn test_bot_authorization_header() {
        let client = DiscordRest::new("abc").unwrap();
        let headers = client.build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bot abc");
    }
}

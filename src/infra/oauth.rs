use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{error, warn};

use crate::domain::{AuthError, OAuthProvider, OAuthProviderClient, ProviderUser};
use crate::security::config::AuthConfig;

const USER_AGENT: &str = "session-auth";
const BNET_REQUIRED_SCOPE: &str = "wow.profile";

fn http_client() -> Result<Client, AuthError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(AuthError::from)
}

#[derive(Deserialize)]
struct BnetCheckToken {
    #[serde(default)]
    scope: Vec<String>,
}

#[derive(Deserialize)]
struct BnetUserInfo {
    id: u64,
    battletag: String,
}

#[derive(Clone)]
pub struct BattleNetClient {
    http: Client,
    base_url: String,
    region: String,
}

impl BattleNetClient {
    pub fn new(base_url: impl Into<String>, region: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            region: region.into(),
        })
    }
}

#[async_trait]
impl OAuthProviderClient for BattleNetClient {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Bnet
    }

    async fn check_token_validity(&self, access_token: &str) -> Result<bool, AuthError> {
        let res = self
            .http
            .post(format!("{}/check_token", self.base_url))
            .query(&[("token", access_token), ("region", self.region.as_str())])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            error!(%status, body = %text, "battle.net check_token failed");
            return Err(AuthError::Provider(format!("check_token returned {status}")));
        }
        let body: BnetCheckToken = res.json().await?;
        Ok(body.scope.iter().any(|s| s == BNET_REQUIRED_SCOPE))
    }

    async fn get_user_info(&self, access_token: &str) -> Result<ProviderUser, AuthError> {
        let res = self
            .http
            .get(format!("{}/userinfo", self.base_url))
            .query(&[("region", self.region.as_str())])
            .bearer_auth(access_token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            error!(%status, body = %text, "battle.net userinfo failed");
            return Err(AuthError::Provider(format!("userinfo returned {status}")));
        }
        let info: BnetUserInfo = res.json().await?;
        Ok(ProviderUser {
            id: info.id.to_string(),
            username: info.battletag,
        })
    }
}

#[derive(Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
}

#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
}

impl DiscordClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn me(&self, access_token: &str) -> Result<Option<DiscordUser>, AuthError> {
        let res = self
            .http
            .get(format!("{}/users/@me", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        match res.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            status if status.is_success() => Ok(Some(res.json().await?)),
            status => {
                warn!(%status, "discord /users/@me failed");
                Err(AuthError::Provider(format!("users/@me returned {status}")))
            }
        }
    }
}

#[async_trait]
impl OAuthProviderClient for DiscordClient {
    fn provider(&self) -> OAuthProvider {
        OAuthProvider::Discord
    }

    async fn check_token_validity(&self, access_token: &str) -> Result<bool, AuthError> {
        Ok(self.me(access_token).await?.is_some())
    }

    async fn get_user_info(&self, access_token: &str) -> Result<ProviderUser, AuthError> {
        let user = self.me(access_token).await?.ok_or(AuthError::ProviderRejected)?;
        Ok(ProviderUser {
            id: user.id,
            username: user.username,
        })
    }
}

/// Provider clients keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<OAuthProvider, Arc<dyn OAuthProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::new()
            .with(Arc::new(BattleNetClient::new(&config.bnet_oauth_url, &config.bnet_region)?))
            .with(Arc::new(DiscordClient::new(&config.discord_api_url)?)))
    }

    pub fn with(mut self, client: Arc<dyn OAuthProviderClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: OAuthProvider) -> Result<Arc<dyn OAuthProviderClient>, AuthError> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or_else(|| AuthError::UnsupportedProvider(provider.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn bnet_token_needs_wow_profile_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check_token"))
            .and(query_param("token", "good"))
            .and(query_param("region", "eu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "scope": ["openid", "wow.profile"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/check_token"))
            .and(query_param("token", "narrow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scope": ["openid"] })))
            .mount(&server)
            .await;

        let client = BattleNetClient::new(server.uri(), "eu").unwrap();
        assert!(client.check_token_validity("good").await.unwrap());
        assert!(!client.check_token_validity("narrow").await.unwrap());
    }

    #[tokio::test]
    async fn bnet_upstream_failure_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check_token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = BattleNetClient::new(server.uri(), "eu").unwrap();
        let err = client.check_token_validity("any").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
    }

    #[tokio::test]
    async fn bnet_userinfo_maps_battletag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 123456,
                "battletag": "Jaina#1234"
            })))
            .mount(&server)
            .await;

        let client = BattleNetClient::new(format!("{}/", server.uri()), "eu").unwrap();
        let user = client.get_user_info("tok").await.unwrap();
        assert_eq!(user.id, "123456");
        assert_eq!(user.username, "Jaina#1234");
    }

    #[tokio::test]
    async fn discord_unauthorized_means_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("authorization", "Bearer ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "80351110224678912",
                "username": "nelly"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = DiscordClient::new(server.uri()).unwrap();
        assert!(client.check_token_validity("ok").await.unwrap());
        assert!(!client.check_token_validity("stale").await.unwrap());
        assert_eq!(client.get_user_info("ok").await.unwrap().username, "nelly");
        assert!(matches!(
            client.get_user_info("stale").await,
            Err(AuthError::ProviderRejected)
        ));
    }

    #[test]
    fn registry_reports_missing_provider() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(DiscordClient::new("http://localhost").unwrap()));
        assert!(registry.get(OAuthProvider::Discord).is_ok());
        assert!(matches!(
            registry.get(OAuthProvider::Bnet),
            Err(AuthError::UnsupportedProvider(p)) if p == "bnet"
        ));
    }
}

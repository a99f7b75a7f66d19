use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Third-party OAuth providers users can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Bnet,
    Discord,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Bnet => "bnet",
            OAuthProvider::Discord => "discord",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bnet" => Ok(OAuthProvider::Bnet),
            "discord" => Ok(OAuthProvider::Discord),
            other => Err(AuthError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Identity reported by the provider for an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub id: String,
    pub username: String,
}

/// Client for one OAuth provider. Only token validation and user lookup are needed.
#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    async fn check_token_validity(&self, access_token: &str) -> Result<bool, AuthError>;

    async fn get_user_info(&self, access_token: &str) -> Result<ProviderUser, AuthError>;
}

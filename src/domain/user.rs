use async_trait::async_trait;
use time::OffsetDateTime;

use super::error::AuthError;
use super::provider::OAuthProvider;

/// Provider identity and the access token it presented at login.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderGrant {
    pub provider: OAuthProvider,
    pub provider_user_id: String,
    pub provider_username: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: OffsetDateTime,
}

/// User accounts linked to provider identities.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolves the provider identity to an internal user id and stores the
    /// provider token, creating the user on first sign-in. One atomic step:
    /// concurrent first logins for the same identity yield the same user.
    async fn link_provider_account(&self, grant: &ProviderGrant) -> Result<String, AuthError>;

    async fn provider_token_expires_at(
        &self,
        user_id: &str,
        provider: OAuthProvider,
    ) -> Result<Option<OffsetDateTime>, AuthError>;
}

/// Role and permission lookup used to fill access-token claims.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError>;

    async fn permissions_for_roles(&self, roles: &[String]) -> Result<Vec<String>, AuthError>;
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::domain::{
    AccountDirectory, AuthError, ClientMeta, OAuthProvider, ProviderGrant, TokenFamilyRegistry,
};
use crate::infra::oauth::ProviderRegistry;
use crate::service::rotation::RotationProtocol;

/// Lifetime assumed for a provider token when the client does not report one.
const DEFAULT_PROVIDER_TOKEN_TTL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub provider: String,
    pub access_token: String,
    /// Provider token expiry, unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub refresh_token: String,
}

/// Exchanges a provider access token for a new session family.
#[derive(Clone)]
pub struct LoginWithProvider {
    providers: ProviderRegistry,
    accounts: Arc<dyn AccountDirectory>,
    families: Arc<dyn TokenFamilyRegistry>,
    rotation: RotationProtocol,
}

impl LoginWithProvider {
    pub fn new(
        providers: ProviderRegistry,
        accounts: Arc<dyn AccountDirectory>,
        families: Arc<dyn TokenFamilyRegistry>,
        rotation: RotationProtocol,
    ) -> Self {
        Self {
            providers,
            accounts,
            families,
            rotation,
        }
    }

    pub async fn execute(&self, req: LoginRequest, client: &ClientMeta) -> Result<LoginResponse, AuthError> {
        let provider: OAuthProvider = req.provider.parse()?;
        let access_token = req.access_token.trim();
        if access_token.is_empty() {
            return Err(AuthError::BadRequest("access_token is required".into()));
        }
        let now = OffsetDateTime::now_utc();
        let expires_at = match req.expires_at {
            Some(ts) => OffsetDateTime::from_unix_timestamp(ts)
                .map_err(|_| AuthError::BadRequest("expires_at is out of range".into()))?,
            None => now + DEFAULT_PROVIDER_TOKEN_TTL,
        };
        if expires_at <= now {
            return Err(AuthError::BadRequest("expires_at must be in the future".into()));
        }

        let provider_client = self.providers.get(provider)?;
        if !provider_client.check_token_validity(access_token).await? {
            warn!(%provider, "provider rejected access token at login");
            return Err(AuthError::ProviderRejected);
        }
        let profile = provider_client.get_user_info(access_token).await?;

        let user_id = self
            .accounts
            .link_provider_account(&ProviderGrant {
                provider,
                provider_user_id: profile.id,
                provider_username: profile.username,
                access_token: access_token.to_string(),
                refresh_token: None,
                expires_at,
            })
            .await?;

        let family_id = self
            .families
            .create_family(&user_id, provider, client.ip_address.as_deref())
            .await?;
        let issued = self
            .rotation
            .issue_initial_pair(&user_id, provider, &family_id, client)
            .await?;
        info!(user_id = %user_id, family_id = %family_id, %provider, "login succeeded");

        Ok(LoginResponse {
            refresh_token: issued.pair.refresh_token,
        })
    }
}

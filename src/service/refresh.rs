use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::domain::{AccountDirectory, AuthError, ClientMeta, OAuthProvider};
use crate::service::rotation::{RotationProtocol, TokenPair};

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub pair: TokenPair,
    pub provider: OAuthProvider,
    pub should_refresh_provider_token: bool,
}

/// `POST /auth/refresh`: one rotation attempt, never retried.
#[derive(Clone)]
pub struct RefreshSession {
    rotation: RotationProtocol,
    accounts: Arc<dyn AccountDirectory>,
    provider_refresh_window: Duration,
}

impl RefreshSession {
    pub fn new(rotation: RotationProtocol, accounts: Arc<dyn AccountDirectory>, window_secs: i64) -> Self {
        Self {
            rotation,
            accounts,
            provider_refresh_window: Duration::seconds(window_secs),
        }
    }

    pub async fn execute(&self, req: RefreshRequest, client: &ClientMeta) -> Result<RefreshResponse, AuthError> {
        let presented = req.refresh_token.trim();
        if presented.is_empty() {
            return Err(AuthError::BadRequest("refresh_token is required".into()));
        }

        let issued = self.rotation.rotate(presented, client).await?;
        let provider_expiry = self
            .accounts
            .provider_token_expires_at(&issued.user_id, issued.provider)
            .await?;
        let should_refresh_provider_token = provider_expiry
            .map(|at| at < OffsetDateTime::now_utc() + self.provider_refresh_window)
            .unwrap_or(false);

        Ok(RefreshResponse {
            pair: issued.pair,
            provider: issued.provider,
            should_refresh_provider_token,
        })
    }
}

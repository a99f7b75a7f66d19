use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::{
    AuthError, ClientMeta, NewRefreshToken, OAuthProvider, RefreshTokenRecord, RefreshTokenStore,
    RevocationReason, RoleDirectory, RotateOutcome,
};
use crate::security::jwt::{JwtManager, RefreshTokenClaims};

/// Signed access/refresh pair handed back to the client. Expiries are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub access_token_jti: String,
    pub refresh_token_jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub pair: TokenPair,
    pub user_id: String,
    pub provider: OAuthProvider,
    pub family_id: String,
}

/// Issues, rotates and revokes refresh tokens.
///
/// A record moves from active to either rotated or revoked and never back.
/// Presenting a rotated token again revokes its whole family.
#[derive(Clone)]
pub struct RotationProtocol {
    jwt: JwtManager,
    tokens: Arc<dyn RefreshTokenStore>,
    roles: Arc<dyn RoleDirectory>,
}

impl RotationProtocol {
    pub fn new(jwt: JwtManager, tokens: Arc<dyn RefreshTokenStore>, roles: Arc<dyn RoleDirectory>) -> Self {
        Self { jwt, tokens, roles }
    }

    /// First pair of a freshly created family, right after an OAuth login.
    pub async fn issue_initial_pair(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        family_id: &str,
        client: &ClientMeta,
    ) -> Result<IssuedTokens, AuthError> {
        let (issued, record) = self.mint(user_id, provider, family_id, client).await?;
        self.tokens.create(record).await?;
        info!(user_id, family_id, jti = %issued.pair.refresh_token_jti, "issued initial token pair");
        Ok(issued)
    }

    pub async fn rotate(&self, presented: &str, client: &ClientMeta) -> Result<IssuedTokens, AuthError> {
        let claims: RefreshTokenClaims = self.jwt.verify(presented)?;
        let record = self
            .tokens
            .find_by_jti(&claims.jti)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.revoked {
            return Err(AuthError::TokenRevoked);
        }
        if record.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::TokenExpired);
        }
        if record.is_rotated {
            let revoked = self
                .tokens
                .revoke_all_in_family(&record.family_id, RevocationReason::BreachDetected)
                .await?;
            warn!(
                family_id = %record.family_id,
                user_id = %record.user_id,
                jti = %record.jti,
                revoked,
                "refresh token reuse detected; family revoked"
            );
            return Err(AuthError::TokenReuseDetected {
                family_id: record.family_id,
            });
        }

        let (issued, successor) = self
            .mint(&record.user_id, record.provider, &record.family_id, client)
            .await?;
        match self.tokens.rotate(&record.jti, successor).await? {
            RotateOutcome::Rotated => {
                info!(
                    family_id = %record.family_id,
                    jti = %record.jti,
                    successor = %issued.pair.refresh_token_jti,
                    "refresh token rotated"
                );
                Ok(issued)
            }
            RotateOutcome::Conflict => {
                warn!(
                    family_id = %record.family_id,
                    jti = %record.jti,
                    "lost concurrent rotation; treating as reuse"
                );
                Err(AuthError::TokenReuseDetected {
                    family_id: record.family_id,
                })
            }
        }
    }

    pub async fn revoke(&self, jti: &str, reason: RevocationReason) -> Result<(), AuthError> {
        self.tokens.revoke(jti, reason).await?;
        info!(jti, %reason, "refresh token revoked");
        Ok(())
    }

    pub async fn revoke_family(&self, family_id: &str, reason: RevocationReason) -> Result<u64, AuthError> {
        let revoked = self.tokens.revoke_all_in_family(family_id, reason).await?;
        info!(family_id, %reason, revoked, "token family revoked");
        Ok(revoked)
    }

    pub async fn revoke_user(&self, user_id: &str) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all_for_user(user_id, RevocationReason::LogoutAll)
            .await?;
        info!(user_id, revoked, "all sessions revoked for user");
        Ok(revoked)
    }

    /// Logout: revokes the family the presented refresh token belongs to.
    pub async fn end_session(&self, presented: &str) -> Result<u64, AuthError> {
        let claims: RefreshTokenClaims = self.jwt.verify(presented)?;
        self.revoke_family(&claims.family_id, RevocationReason::Manual).await
    }

    pub async fn family_records(&self, family_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        self.tokens.list_family(family_id).await
    }

    async fn mint(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        family_id: &str,
        client: &ClientMeta,
    ) -> Result<(IssuedTokens, NewRefreshToken), AuthError> {
        let roles = self.roles.roles_for_user(user_id).await?;
        let permissions = self.roles.permissions_for_roles(&roles).await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let access = self.jwt.access_claims(user_id, provider, roles, permissions, now);
        let refresh = self.jwt.refresh_claims(user_id, provider, family_id, now);
        // Persisted expiry comes from the signed claim, never a second computation.
        let expires_at = OffsetDateTime::from_unix_timestamp(refresh.exp)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        let pair = TokenPair {
            access_token: self.jwt.issue(&access)?,
            refresh_token: self.jwt.issue(&refresh)?,
            access_token_expiry: access.exp,
            refresh_token_expiry: refresh.exp,
            access_token_jti: access.jti,
            refresh_token_jti: refresh.jti.clone(),
        };
        let record = NewRefreshToken {
            jti: refresh.jti,
            user_id: user_id.to_string(),
            family_id: family_id.to_string(),
            provider,
            expires_at,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            device_fingerprint: client.device_fingerprint(),
        };
        let issued = IssuedTokens {
            pair,
            user_id: user_id.to_string(),
            provider,
            family_id: family_id.to_string(),
        };
        Ok((issued, record))
    }
}

use async_trait::async_trait;

use super::error::AuthError;
use super::family::TokenFamily;
use super::provider::OAuthProvider;
use super::token::{NewRefreshToken, RefreshTokenRecord, RevocationReason, RotateOutcome};

/// Durable storage for refresh-token records.
///
/// Records are never updated freely: the only mutations are the conditional
/// rotate transition and the idempotent revoke transitions below, so callers
/// never need their own locking.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Inserts a new active record. Fails with [`AuthError::Conflict`] if the jti exists.
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError>;

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Conditional write: succeeds only if the record is neither rotated nor
    /// revoked. Of any number of concurrent callers, at most one gets
    /// [`RotateOutcome::Rotated`].
    async fn mark_rotated(&self, jti: &str, successor_jti: &str) -> Result<RotateOutcome, AuthError>;

    /// `mark_rotated(old_jti, successor.jti)` and `create(successor)` as one
    /// atomic unit, serialized against family cascades. On
    /// [`RotateOutcome::Conflict`] the successor is not written.
    async fn rotate(&self, old_jti: &str, successor: NewRefreshToken) -> Result<RotateOutcome, AuthError>;

    /// Idempotent; revoking an unknown or already revoked jti is a no-op.
    async fn revoke(&self, jti: &str, reason: RevocationReason) -> Result<(), AuthError>;

    /// Revokes every not-yet-revoked record of the family, returning how many changed.
    async fn revoke_all_in_family(&self, family_id: &str, reason: RevocationReason) -> Result<u64, AuthError>;

    async fn revoke_all_for_user(&self, user_id: &str, reason: RevocationReason) -> Result<u64, AuthError>;

    /// Every record of the family, oldest first.
    async fn list_family(&self, family_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError>;
}

/// Creates and looks up token families.
#[async_trait]
pub trait TokenFamilyRegistry: Send + Sync {
    async fn create_family(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        original_ip: Option<&str>,
    ) -> Result<String, AuthError>;

    async fn find_family(&self, family_id: &str) -> Result<Option<TokenFamily>, AuthError>;
}

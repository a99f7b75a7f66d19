use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::AuthError;
use super::provider::OAuthProvider;

/// Why a refresh token was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Manual,
    BreachDetected,
    LogoutAll,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Manual => "manual",
            RevocationReason::BreachDetected => "breach_detected",
            RevocationReason::LogoutAll => "logout_all",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RevocationReason::Manual),
            "breach_detected" => Ok(RevocationReason::BreachDetected),
            "logout_all" => Ok(RevocationReason::LogoutAll),
            other => Err(AuthError::BadRequest(format!("unknown revocation reason '{other}'"))),
        }
    }
}

/// One node in a family's rotation chain, as persisted.
///
/// Records are only ever changed through the store's rotate and revoke
/// transitions; both `is_rotated` and `revoked` are one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub jti: String,
    pub user_id: String,
    pub family_id: String,
    pub provider: OAuthProvider,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    pub revoked: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    pub revoked_reason: Option<RevocationReason>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
    pub is_rotated: bool,
    pub rotated_to: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Neither rotated nor revoked: the tip that may still be rotated.
    pub fn is_active_tip(&self) -> bool {
        !self.is_rotated && !self.revoked
    }
}

/// Insert payload for a fresh chain node. The store assigns `id`/`created_at`
/// and the record always starts active.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRefreshToken {
    pub jti: String,
    pub user_id: String,
    pub family_id: String,
    pub provider: OAuthProvider,
    pub expires_at: OffsetDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl NewRefreshToken {
    pub fn into_record(self, now: OffsetDateTime) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            jti: self.jti,
            user_id: self.user_id,
            family_id: self.family_id,
            provider: self.provider,
            expires_at: self.expires_at,
            created_at: now,
            last_used_at: None,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            device_fingerprint: self.device_fingerprint,
            is_rotated: false,
            rotated_to: None,
        }
    }
}

/// Result of the conditional "mark rotated" write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// The record was already rotated or revoked; nothing was written.
    Conflict,
}

/// Where a request came from. Stored alongside each refresh token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    pub fn device_fingerprint(&self) -> Option<String> {
        if self.ip_address.is_none() && self.user_agent.is_none() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.user_agent.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        hasher.update(self.ip_address.as_deref().unwrap_or("").as_bytes());
        Some(hex::encode(hasher.finalize()))
    }
}

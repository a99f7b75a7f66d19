use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::provider::OAuthProvider;

/// Anchor for every refresh token rotated out of one login event.
/// Families are append-only: created once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFamily {
    pub id: String,
    pub user_id: String,
    pub provider: OAuthProvider,
    pub original_ip_address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

use async_trait::async_trait;
use sqlx::Row;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{AccountDirectory, AuthError, OAuthProvider, ProviderGrant, RoleDirectory};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct PgAccountDirectory {
    db: Db,
}

impl PgAccountDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn link_provider_account(&self, grant: &ProviderGrant) -> Result<String, AuthError> {
        let mut tx = self.db.begin().await?;

        let existing = sqlx::query(
            "UPDATE oauth_providers SET
                 provider_username = $3,
                 access_token = $4,
                 refresh_token = $5,
                 token_expires_at = $6,
                 updated_at = now(),
                 last_sync_at = now()
             WHERE provider = $1 AND provider_user_id = $2
             RETURNING user_id",
        )
        .bind(grant.provider.as_str())
        .bind(&grant.provider_user_id)
        .bind(&grant.provider_username)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(grant.expires_at)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            let user_id: String = row.try_get("user_id")?;
            tx.commit().await?;
            return Ok(user_id);
        }

        let candidate = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO users (id, user_name) VALUES ($1, $2)")
            .bind(&candidate)
            .bind(&grant.provider_username)
            .execute(&mut *tx)
            .await?;

        // A concurrent first login for the same identity blocks here until it
        // commits, then the upsert resolves to the user it created.
        let row = sqlx::query(
            "INSERT INTO oauth_providers (user_id, provider, provider_user_id, provider_username,
                 access_token, refresh_token, token_expires_at, updated_at, last_sync_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
             ON CONFLICT (provider, provider_user_id) DO UPDATE SET
                 provider_username = EXCLUDED.provider_username,
                 access_token = EXCLUDED.access_token,
                 refresh_token = EXCLUDED.refresh_token,
                 token_expires_at = EXCLUDED.token_expires_at,
                 updated_at = now(),
                 last_sync_at = now()
             RETURNING user_id",
        )
        .bind(&candidate)
        .bind(grant.provider.as_str())
        .bind(&grant.provider_user_id)
        .bind(&grant.provider_username)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(grant.expires_at)
        .fetch_one(&mut *tx)
        .await?;
        let user_id: String = row.try_get("user_id")?;

        if user_id == candidate {
            info!(user_id = %user_id, provider = %grant.provider, "created user on first sign-in");
        } else {
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(&candidate)
                .execute(&mut *tx)
                .await?;
            debug!(user_id = %user_id, provider = %grant.provider, "first sign-in raced; joined existing user");
        }
        tx.commit().await?;
        Ok(user_id)
    }

    async fn provider_token_expires_at(
        &self,
        user_id: &str,
        provider: OAuthProvider,
    ) -> Result<Option<OffsetDateTime>, AuthError> {
        let row = sqlx::query(
            "SELECT token_expires_at FROM oauth_providers WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(|r| r.try_get("token_expires_at"))
            .transpose()
            .map_err(AuthError::from)
    }
}

#[derive(Clone)]
pub struct PgRoleDirectory {
    db: Db,
}

impl PgRoleDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RoleDirectory for PgRoleDirectory {
    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query("SELECT role FROM member_roles WHERE user_id = $1 ORDER BY role")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        rows.iter()
            .map(|r| r.try_get("role").map_err(AuthError::from))
            .collect()
    }

    async fn permissions_for_roles(&self, roles: &[String]) -> Result<Vec<String>, AuthError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT DISTINCT permission FROM role_permissions WHERE role = ANY($1) ORDER BY permission",
        )
        .bind(roles)
        .fetch_all(&self.db)
        .await?;
        rows.iter()
            .map(|r| r.try_get("permission").map_err(AuthError::from))
            .collect()
    }
}

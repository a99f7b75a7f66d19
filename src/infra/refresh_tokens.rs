use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgExecutor, Row};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    AuthError, NewRefreshToken, OAuthProvider, RefreshTokenRecord, RefreshTokenStore,
    RevocationReason, RotateOutcome, TokenFamily, TokenFamilyRegistry,
};
use crate::infra::db::Db;

const TOKEN_COLUMNS: &str = "id, user_id, token_jti, family_id, provider, expires_at, created_at, \
     last_used_at, revoked, revoked_at, revoked_reason, ip_address, user_agent, \
     device_fingerprint, is_rotated, rotated_to_jti";

// Matches exactly one row for exactly one caller: the conditional write rotation hinges on.
const MARK_ROTATED_SQL: &str = "UPDATE refresh_tokens
     SET is_rotated = true, rotated_to_jti = $2, last_used_at = now()
     WHERE token_jti = $1 AND is_rotated = false AND revoked = false";

const LOCK_FAMILY_SQL: &str = "SELECT id FROM token_families WHERE id = $1 FOR UPDATE";

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    db: Db,
}

impl PgRefreshTokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

async fn insert_token<'e, E: PgExecutor<'e>>(
    executor: E,
    token: NewRefreshToken,
) -> Result<RefreshTokenRecord, AuthError> {
    let record = token.into_record(OffsetDateTime::now_utc());
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_jti, family_id, provider, expires_at, created_at,
             ip_address, user_agent, device_fingerprint, revoked, is_rotated)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, false)",
    )
    .bind(record.id)
    .bind(&record.user_id)
    .bind(&record.jti)
    .bind(&record.family_id)
    .bind(record.provider.as_str())
    .bind(record.expires_at)
    .bind(record.created_at)
    .bind(&record.ip_address)
    .bind(&record.user_agent)
    .bind(&record.device_fingerprint)
    .execute(executor)
    .await?;
    Ok(record)
}

fn record_from_row(row: &PgRow) -> Result<RefreshTokenRecord, AuthError> {
    let provider: String = row.try_get("provider")?;
    let reason: Option<String> = row.try_get("revoked_reason")?;
    Ok(RefreshTokenRecord {
        id: row.try_get::<Uuid, _>("id")?,
        jti: row.try_get("token_jti")?,
        user_id: row.try_get("user_id")?,
        family_id: row.try_get("family_id")?,
        provider: provider
            .parse()
            .map_err(|_| AuthError::Storage(format!("unknown provider '{provider}' in refresh_tokens")))?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        last_used_at: row.try_get("last_used_at")?,
        revoked: row.try_get("revoked")?,
        revoked_at: row.try_get("revoked_at")?,
        revoked_reason: reason
            .map(|r| r.parse())
            .transpose()
            .map_err(|e: AuthError| AuthError::Storage(e.to_string()))?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        device_fingerprint: row.try_get("device_fingerprint")?,
        is_rotated: row.try_get("is_rotated")?,
        rotated_to: row.try_get("rotated_to_jti")?,
    })
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError> {
        insert_token(&self.db, token).await
    }

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query(&format!("SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_jti = $1"))
            .bind(jti)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn mark_rotated(&self, jti: &str, successor_jti: &str) -> Result<RotateOutcome, AuthError> {
        let result = sqlx::query(MARK_ROTATED_SQL)
            .bind(jti)
            .bind(successor_jti)
            .execute(&self.db)
            .await?;
        Ok(if result.rows_affected() == 1 {
            RotateOutcome::Rotated
        } else {
            RotateOutcome::Conflict
        })
    }

    async fn rotate(&self, old_jti: &str, successor: NewRefreshToken) -> Result<RotateOutcome, AuthError> {
        let mut tx = self.db.begin().await?;
        sqlx::query(LOCK_FAMILY_SQL)
            .bind(&successor.family_id)
            .fetch_optional(&mut *tx)
            .await?;

        let result = sqlx::query(MARK_ROTATED_SQL)
            .bind(old_jti)
            .bind(&successor.jti)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            debug!(jti = old_jti, "conditional rotate lost");
            return Ok(RotateOutcome::Conflict);
        }

        insert_token(&mut *tx, successor).await?;
        tx.commit().await?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, jti: &str, reason: RevocationReason) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked = true, revoked_at = now(), revoked_reason = $2
             WHERE token_jti = $1 AND revoked = false",
        )
        .bind(jti)
        .bind(reason.as_str())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all_in_family(&self, family_id: &str, reason: RevocationReason) -> Result<u64, AuthError> {
        let mut tx = self.db.begin().await?;
        sqlx::query(LOCK_FAMILY_SQL)
            .bind(family_id)
            .fetch_optional(&mut *tx)
            .await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true, revoked_at = now(), revoked_reason = $2
             WHERE family_id = $1 AND revoked = false",
        )
        .bind(family_id)
        .bind(reason.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: &str, reason: RevocationReason) -> Result<u64, AuthError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SELECT id FROM token_families WHERE user_id = $1 ORDER BY id FOR UPDATE")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true, revoked_at = now(), revoked_reason = $2
             WHERE user_id = $1 AND revoked = false",
        )
        .bind(user_id)
        .bind(reason.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_family(&self, family_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let rows = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE family_id = $1 ORDER BY created_at, id"
        ))
        .bind(family_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[derive(Clone)]
pub struct PgTokenFamilyRegistry {
    db: Db,
}

impl PgTokenFamilyRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenFamilyRegistry for PgTokenFamilyRegistry {
    async fn create_family(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        original_ip: Option<&str>,
    ) -> Result<String, AuthError> {
        let family_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO token_families (id, user_id, provider, original_ip_address, created_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(&family_id)
        .bind(user_id)
        .bind(provider.as_str())
        .bind(original_ip)
        .execute(&self.db)
        .await
        .map_err(|e| AuthError::Storage(format!("failed to create token family: {e}")))?;
        Ok(family_id)
    }

    async fn find_family(&self, family_id: &str) -> Result<Option<TokenFamily>, AuthError> {
        let row = sqlx::query(
            "SELECT id, user_id, provider, original_ip_address, created_at
             FROM token_families WHERE id = $1",
        )
        .bind(family_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let provider: String = row.try_get("provider")?;
        Ok(Some(TokenFamily {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            provider: provider
                .parse()
                .map_err(|_| AuthError::Storage(format!("unknown provider '{provider}' in token_families")))?,
            original_ip_address: row.try_get("original_ip_address")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::db::test_pool;
    use std::sync::Arc;
    use time::Duration;

    fn token(user_id: &str, family_id: &str) -> NewRefreshToken {
        NewRefreshToken {
            jti: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            family_id: family_id.into(),
            provider: OAuthProvider::Bnet,
            expires_at: OffsetDateTime::now_utc() + Duration::days(30),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("launcher/2.1".into()),
            device_fingerprint: None,
        }
    }

    async fn family(db: &Db) -> (String, String) {
        let user_id = Uuid::new_v4().to_string();
        let family_id = PgTokenFamilyRegistry::new(db.clone())
            .create_family(&user_id, OAuthProvider::Bnet, Some("10.0.0.1"))
            .await
            .unwrap();
        (user_id, family_id)
    }

    #[tokio::test]
    async fn records_round_trip_through_postgres() {
        let Some(db) = test_pool().await else { return };
        let store = PgRefreshTokenStore::new(db.clone());
        let (user_id, family_id) = family(&db).await;

        let created = store.create(token(&user_id, &family_id)).await.unwrap();
        let found = store.find_by_jti(&created.jti).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.family_id, family_id);
        assert_eq!(found.user_agent.as_deref(), Some("launcher/2.1"));
        assert!(!found.is_rotated && !found.revoked);
        assert!(store.find_by_jti("missing").await.unwrap().is_none());

        let registered = PgTokenFamilyRegistry::new(db)
            .find_family(&family_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(registered.user_id, user_id);
        assert_eq!(registered.original_ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn mark_rotated_succeeds_once() {
        let Some(db) = test_pool().await else { return };
        let store = PgRefreshTokenStore::new(db.clone());
        let (user_id, family_id) = family(&db).await;
        let created = store.create(token(&user_id, &family_id)).await.unwrap();

        assert_eq!(store.mark_rotated(&created.jti, "next-a").await.unwrap(), RotateOutcome::Rotated);
        assert_eq!(store.mark_rotated(&created.jti, "next-b").await.unwrap(), RotateOutcome::Conflict);
        let record = store.find_by_jti(&created.jti).await.unwrap().unwrap();
        assert_eq!(record.rotated_to.as_deref(), Some("next-a"));
        assert!(record.last_used_at.is_some());
    }

    #[tokio::test]
    async fn revoked_token_cannot_be_rotated() {
        let Some(db) = test_pool().await else { return };
        let store = PgRefreshTokenStore::new(db.clone());
        let (user_id, family_id) = family(&db).await;
        let created = store.create(token(&user_id, &family_id)).await.unwrap();

        store.revoke(&created.jti, RevocationReason::Manual).await.unwrap();
        let outcome = store.rotate(&created.jti, token(&user_id, &family_id)).await.unwrap();
        assert_eq!(outcome, RotateOutcome::Conflict);
        assert_eq!(store.list_family(&family_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_rotations_leave_one_successor() {
        let Some(db) = test_pool().await else { return };
        let store = Arc::new(PgRefreshTokenStore::new(db.clone()));
        let (user_id, family_id) = family(&db).await;
        let created = store.create(token(&user_id, &family_id)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            let jti = created.jti.clone();
            let successor = token(&user_id, &family_id);
            handles.push(tokio::spawn(async move { store.rotate(&jti, successor).await.unwrap() }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() == RotateOutcome::Rotated {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let records = store.list_family(&family_id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.is_active_tip()).count(), 1);
    }

    #[tokio::test]
    async fn cascades_count_only_unrevoked_tokens() {
        let Some(db) = test_pool().await else { return };
        let store = PgRefreshTokenStore::new(db.clone());
        let (user_id, family_id) = family(&db).await;
        let first = store.create(token(&user_id, &family_id)).await.unwrap();
        assert_eq!(
            store.rotate(&first.jti, token(&user_id, &family_id)).await.unwrap(),
            RotateOutcome::Rotated
        );

        let revoked = store
            .revoke_all_in_family(&family_id, RevocationReason::BreachDetected)
            .await
            .unwrap();
        assert_eq!(revoked, 2);
        let again = store
            .revoke_all_in_family(&family_id, RevocationReason::Manual)
            .await
            .unwrap();
        assert_eq!(again, 0);
        let records = store.list_family(&family_id).await.unwrap();
        assert!(records
            .iter()
            .all(|r| r.revoked_reason == Some(RevocationReason::BreachDetected)));

        let registry = PgTokenFamilyRegistry::new(db);
        let other = registry
            .create_family(&user_id, OAuthProvider::Bnet, None)
            .await
            .unwrap();
        store.create(token(&user_id, &other)).await.unwrap();
        store.create(token(&user_id, &other)).await.unwrap();
        let revoked = store
            .revoke_all_for_user(&user_id, RevocationReason::LogoutAll)
            .await
            .unwrap();
        assert_eq!(revoked, 2);
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    AccountDirectory, AuthError, NewRefreshToken, OAuthProvider, ProviderGrant, RefreshTokenRecord,
    RefreshTokenStore, RevocationReason, RoleDirectory, RotateOutcome, TokenFamily,
    TokenFamilyRegistry,
};

#[derive(Default)]
struct Tables {
    tokens: Vec<RefreshTokenRecord>,
    by_jti: HashMap<String, usize>,
    families: HashMap<String, TokenFamily>,
    identities: HashMap<(OAuthProvider, String), String>,
    grants: HashMap<(String, OAuthProvider), ProviderGrant>,
    member_roles: HashMap<String, Vec<String>>,
    role_permissions: HashMap<String, Vec<String>>,
}

impl Tables {
    fn insert(&mut self, token: NewRefreshToken, now: OffsetDateTime) -> Result<RefreshTokenRecord, AuthError> {
        if self.by_jti.contains_key(&token.jti) {
            return Err(AuthError::Conflict(format!("jti {} already exists", token.jti)));
        }
        let record = token.into_record(now);
        self.by_jti.insert(record.jti.clone(), self.tokens.len());
        self.tokens.push(record.clone());
        Ok(record)
    }

    fn get_mut(&mut self, jti: &str) -> Option<&mut RefreshTokenRecord> {
        let idx = *self.by_jti.get(jti)?;
        self.tokens.get_mut(idx)
    }

    fn mark_rotated(&mut self, jti: &str, successor_jti: &str, now: OffsetDateTime) -> RotateOutcome {
        match self.get_mut(jti) {
            Some(record) if record.is_active_tip() => {
                record.is_rotated = true;
                record.rotated_to = Some(successor_jti.to_string());
                record.last_used_at = Some(now);
                RotateOutcome::Rotated
            }
            _ => RotateOutcome::Conflict,
        }
    }

    fn revoke_where<F>(&mut self, reason: RevocationReason, now: OffsetDateTime, filter: F) -> u64
    where
        F: Fn(&RefreshTokenRecord) -> bool,
    {
        let mut count = 0;
        for record in self.tokens.iter_mut().filter(|r| !r.revoked && filter(&**r)) {
            revoke_record(record, reason, now);
            count += 1;
        }
        count
    }
}

fn revoke_record(record: &mut RefreshTokenRecord, reason: RevocationReason, now: OffsetDateTime) {
    record.revoked = true;
    record.revoked_at = Some(now);
    record.revoked_reason = Some(reason);
}

/// Process-local storage for every table the service needs.
///
/// All tables sit behind a single mutex and each trait call is one critical
/// section, which gives the same atomicity the Postgres backend gets from
/// conditional updates and family row locks.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AuthError> {
        self.tables
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".into()))
    }

    #[cfg(test)]
    pub fn assign_role(&self, user_id: &str, role: &str) -> Result<(), AuthError> {
        let mut tables = self.lock()?;
        let roles = tables.member_roles.entry(user_id.to_string()).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn grant_permission(&self, role: &str, permission: &str) -> Result<(), AuthError> {
        let mut tables = self.lock()?;
        let perms = tables.role_permissions.entry(role.to_string()).or_default();
        if !perms.iter().any(|p| p == permission) {
            perms.push(permission.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AuthError> {
        self.lock()?.insert(token, OffsetDateTime::now_utc())
    }

    async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let tables = self.lock()?;
        Ok(tables.by_jti.get(jti).and_then(|&idx| tables.tokens.get(idx)).cloned())
    }

    async fn mark_rotated(&self, jti: &str, successor_jti: &str) -> Result<RotateOutcome, AuthError> {
        Ok(self.lock()?.mark_rotated(jti, successor_jti, OffsetDateTime::now_utc()))
    }

    async fn rotate(&self, old_jti: &str, successor: NewRefreshToken) -> Result<RotateOutcome, AuthError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.lock()?;
        if tables.by_jti.contains_key(&successor.jti) {
            return Err(AuthError::Conflict(format!("jti {} already exists", successor.jti)));
        }
        if tables.mark_rotated(old_jti, &successor.jti, now) == RotateOutcome::Conflict {
            return Ok(RotateOutcome::Conflict);
        }
        tables.insert(successor, now)?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, jti: &str, reason: RevocationReason) -> Result<(), AuthError> {
        let mut tables = self.lock()?;
        if let Some(record) = tables.get_mut(jti) {
            if !record.revoked {
                revoke_record(record, reason, OffsetDateTime::now_utc());
            }
        }
        Ok(())
    }

    async fn revoke_all_in_family(&self, family_id: &str, reason: RevocationReason) -> Result<u64, AuthError> {
        let now = OffsetDateTime::now_utc();
        Ok(self.lock()?.revoke_where(reason, now, |r| r.family_id == family_id))
    }

    async fn revoke_all_for_user(&self, user_id: &str, reason: RevocationReason) -> Result<u64, AuthError> {
        let now = OffsetDateTime::now_utc();
        Ok(self.lock()?.revoke_where(reason, now, |r| r.user_id == user_id))
    }

    async fn list_family(&self, family_id: &str) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let tables = self.lock()?;
        Ok(tables
            .tokens
            .iter()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TokenFamilyRegistry for MemoryStore {
    async fn create_family(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        original_ip: Option<&str>,
    ) -> Result<String, AuthError> {
        let family = TokenFamily {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            provider,
            original_ip_address: original_ip.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        };
        let id = family.id.clone();
        self.lock()?.families.insert(id.clone(), family);
        Ok(id)
    }

    async fn find_family(&self, family_id: &str) -> Result<Option<TokenFamily>, AuthError> {
        Ok(self.lock()?.families.get(family_id).cloned())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn link_provider_account(&self, grant: &ProviderGrant) -> Result<String, AuthError> {
        let mut tables = self.lock()?;
        let user_id = tables
            .identities
            .entry((grant.provider, grant.provider_user_id.clone()))
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        tables
            .grants
            .insert((user_id.clone(), grant.provider), grant.clone());
        Ok(user_id)
    }

    async fn provider_token_expires_at(
        &self,
        user_id: &str,
        provider: OAuthProvider,
    ) -> Result<Option<OffsetDateTime>, AuthError> {
        Ok(self
            .lock()?
            .grants
            .get(&(user_id.to_string(), provider))
            .map(|g| g.expires_at))
    }
}

#[async_trait]
impl RoleDirectory for MemoryStore {
    async fn roles_for_user(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        Ok(self.lock()?.member_roles.get(user_id).cloned().unwrap_or_default())
    }

    async fn permissions_for_roles(&self, roles: &[String]) -> Result<Vec<String>, AuthError> {
        let tables = self.lock()?;
        let mut permissions: Vec<String> = Vec::new();
        for perm in roles
            .iter()
            .filter_map(|role| tables.role_permissions.get(role))
            .flatten()
        {
            if !permissions.contains(perm) {
                permissions.push(perm.clone());
            }
        }
        Ok(permissions)
    }
}

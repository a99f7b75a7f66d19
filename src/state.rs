use std::sync::Arc;

use crate::domain::{AccountDirectory, RefreshTokenStore, RoleDirectory, TokenFamilyRegistry};
use crate::infra::accounts::{PgAccountDirectory, PgRoleDirectory};
use crate::infra::db::Db;
use crate::infra::memory::MemoryStore;
use crate::infra::oauth::ProviderRegistry;
use crate::infra::refresh_tokens::{PgRefreshTokenStore, PgTokenFamilyRegistry};
use crate::security::config::AuthConfig;
use crate::security::jwt::JwtManager;
use crate::security::rate_limit::RateLimiter;
use crate::service::{LoginWithProvider, RefreshSession, RotationProtocol};

/// The storage seams the services are built on.
#[derive(Clone)]
pub struct Storage {
    pub tokens: Arc<dyn RefreshTokenStore>,
    pub families: Arc<dyn TokenFamilyRegistry>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub roles: Arc<dyn RoleDirectory>,
}

impl Storage {
    pub fn postgres(db: Db) -> Self {
        Self {
            tokens: Arc::new(PgRefreshTokenStore::new(db.clone())),
            families: Arc::new(PgTokenFamilyRegistry::new(db.clone())),
            accounts: Arc::new(PgAccountDirectory::new(db.clone())),
            roles: Arc::new(PgRoleDirectory::new(db)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tokens: store.clone(),
            families: store.clone(),
            accounts: store.clone(),
            roles: store,
        }
    }
}

pub struct AppState {
    pub jwt: JwtManager,
    pub rotation: RotationProtocol,
    pub login: LoginWithProvider,
    pub refresh: RefreshSession,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AuthConfig, storage: Storage, providers: ProviderRegistry) -> Arc<Self> {
        let jwt = JwtManager::from_config(&config);
        let rotation = RotationProtocol::new(jwt.clone(), storage.tokens, storage.roles);
        let login = LoginWithProvider::new(
            providers,
            storage.accounts.clone(),
            storage.families,
            rotation.clone(),
        );
        let refresh = RefreshSession::new(
            rotation.clone(),
            storage.accounts,
            config.provider_refresh_window_secs,
        );
        let rate_limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window_secs);

        Arc::new(Self {
            jwt,
            rotation,
            login,
            refresh,
            rate_limiter,
        })
    }
}

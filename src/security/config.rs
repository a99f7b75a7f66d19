use std::net::SocketAddr;

use tracing::warn;

use crate::security::jwt::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Clone)]
pub struct AuthConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_kid: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// A provider token expiring within this window is reported as needing refresh.
    pub provider_refresh_window_secs: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub bnet_oauth_url: String,
    pub bnet_region: String,
    pub discord_api_url: String,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let jwt_secret = env_string("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using an insecure development secret");
            DEV_SECRET.to_string()
        });
        let jwt_refresh_secret =
            env_string("JWT_REFRESH_SECRET").unwrap_or_else(|| jwt_secret.clone());

        let bind_addr = env_string("BIND_ADDR")
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!(value = %v, "BIND_ADDR is not a socket address; using default");
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        AuthConfig {
            bind_addr,
            database_url: env_string("DATABASE_URL"),
            database_max_connections: env_num("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
            jwt_secret,
            jwt_refresh_secret,
            jwt_kid: env_string("JWT_KID").unwrap_or_else(|| "default".into()),
            access_token_ttl_secs: env_num("ACCESS_TOKEN_TTL_SECS").unwrap_or(ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl_secs: env_num("REFRESH_TOKEN_TTL_SECS").unwrap_or(REFRESH_TOKEN_TTL_SECS),
            provider_refresh_window_secs: env_num("PROVIDER_REFRESH_WINDOW_SECS").unwrap_or(300),
            rate_limit_max_requests: env_num("RATE_LIMIT_MAX_REQUESTS").unwrap_or(30),
            rate_limit_window_secs: env_num("RATE_LIMIT_WINDOW_SECS").unwrap_or(60),
            bnet_oauth_url: env_string("BNET_OAUTH_URL")
                .unwrap_or_else(|| "https://oauth.battle.net".into()),
            bnet_region: env_string("BNET_REGION").unwrap_or_else(|| "eu".into()),
            discord_api_url: env_string("DISCORD_API_URL")
                .unwrap_or_else(|| "https://discord.com/api".into()),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Non-negative number that fits `T`; anything else is ignored with a warning.
fn env_num<T: TryFrom<u64>>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    let Ok(value) = raw.parse::<u64>() else {
        warn!(key, value = %raw, "ignoring non-numeric environment value");
        return None;
    };
    match T::try_from(value) {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value, "ignoring out-of-range environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_fall_back_to_defaults() {
        let config = AuthConfig::from_env();
        if std::env::var("ACCESS_TOKEN_TTL_SECS").is_err() {
            assert_eq!(config.access_token_ttl_secs, 900);
        }
        if std::env::var("REFRESH_TOKEN_TTL_SECS").is_err() {
            assert_eq!(config.refresh_token_ttl_secs, 2_592_000);
        }
        if std::env::var("JWT_REFRESH_SECRET").is_err() {
            assert_eq!(config.jwt_refresh_secret, config.jwt_secret);
        }
    }

    #[test]
    fn env_num_ignores_garbage() {
        std::env::set_var("SESSION_AUTH_TEST_NUMBER", "not-a-number");
        assert_eq!(env_num::<u64>("SESSION_AUTH_TEST_NUMBER"), None);
        std::env::set_var("SESSION_AUTH_TEST_NUMBER", "-5");
        assert_eq!(env_num::<i64>("SESSION_AUTH_TEST_NUMBER"), None);
        std::env::set_var("SESSION_AUTH_TEST_NUMBER", " 42 ");
        assert_eq!(env_num::<u32>("SESSION_AUTH_TEST_NUMBER"), Some(42));
        std::env::remove_var("SESSION_AUTH_TEST_NUMBER");
    }

    #[test]
    fn env_num_rejects_values_that_do_not_fit() {
        std::env::set_var("SESSION_AUTH_TEST_WIDE", "18446744073709551615");
        assert_eq!(env_num::<i64>("SESSION_AUTH_TEST_WIDE"), None);
        assert_eq!(env_num::<u64>("SESSION_AUTH_TEST_WIDE"), Some(u64::MAX));
        std::env::set_var("SESSION_AUTH_TEST_WIDE", "4294967296");
        assert_eq!(env_num::<u32>("SESSION_AUTH_TEST_WIDE"), None);
        std::env::remove_var("SESSION_AUTH_TEST_WIDE");
    }
}

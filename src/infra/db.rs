use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

pub type Db = sqlx::PgPool;

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .with_context(|| "failed to connect to database; check DATABASE_URL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .with_context(|| "failed to apply database migrations")?;
    info!(max_connections, "database ready");
    Ok(pool)
}

/// Migrated pool for the Postgres-backed tests; `None` skips them when
/// `DATABASE_URL` is unset.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<Db> {
    let url = std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty())?;
    Some(connect(&url, 8).await.expect("connect to DATABASE_URL"))
}

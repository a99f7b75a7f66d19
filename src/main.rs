mod domain;
mod infra;
mod middleware;
mod routes;
mod security;
mod service;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use infra::memory::MemoryStore;
use infra::oauth::ProviderRegistry;
use security::config::AuthConfig;
use state::{AppState, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AuthConfig::from_env();
    let storage = match &config.database_url {
        Some(url) => Storage::postgres(infra::db::connect(url, config.database_max_connections).await?),
        None => {
            warn!("DATABASE_URL not set; sessions are kept in memory and lost on restart");
            Storage::memory(Arc::new(MemoryStore::new()))
        }
    };
    let providers = ProviderRegistry::from_config(&config)?;

    let addr = config.bind_addr;
    let shared_state = AppState::new(config, storage, providers);
    let app = routes::app(shared_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

//! Shop Ledger - catalog and order ledger service

use anyhow::Result;
use shop_ledger::{api, config::Config, services::Catalog, MemoryStore, PgStore, Store};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections, config.lock_timeout).await?;
            store.migrate().await?;
            serve(store, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            serve(MemoryStore::with_lock_timeout(config.lock_timeout), &config).await
        }
    }
}

async fn serve<S: Store>(store: S, config: &Config) -> Result<()> {
    let state = api::AppState::new(Arc::new(store));
    spawn_discount_sweep(state.catalog.clone(), config.discount_sweep_interval);
    let app = api::router(state);

    tracing::info!("Shop ledger listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

/// Periodic counterpart of the lazy expiry done on every price read.
fn spawn_discount_sweep<S: Store>(catalog: Arc<Catalog<S>>, every: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            tick.tick().await;
            if let Err(e) = catalog.clear_expired_discounts().await {
                tracing::warn!(error = %e, "discount sweep failed");
            }
        }
    });
}

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use research_platform::app_state::AppState;
use research_platform::build_router;
use research_platform::config::Config;
use research_platform::db::memory::MemoryStore;
use research_platform::db::postgres::PgStore;
use research_platform::db::queries::accounts::ensure_bootstrap_admin;
use research_platform::db::store::Store;
use research_platform::utils::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to the database")?;
            store.migrate().await.context("failed to apply the database schema")?;
            info!("using postgres store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set, data is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(store.as_ref(), admin)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create the bootstrap administrator: {e}"))?;
    }

    let addr = config.bind_addr;
    let app = build_router(AppState::new(store, config));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "research platform listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received ctrl-c, shutting down");
}

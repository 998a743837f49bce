//! coin_shop - Merch Shop Coin Backend
//!
//! Users log in, hold coins, send them to each other and spend them on merch.
//! Every balance change is recorded in an append-only ledger.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coin_shop::api::{build_router, AppState};
use coin_shop::auth::{PasswordHasher, TokenManager};
use coin_shop::config::StorageBackend;
use coin_shop::domain::{Balance, Catalog};
use coin_shop::jobs::ReconciliationJob;
use coin_shop::store::{LedgerStore, MemoryStore, PgStore};
use coin_shop::{db, Config};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coin_shop=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Services built over one concrete store
struct Wiring {
    state: AppState,
    ledger: Arc<dyn LedgerStore>,
}

fn wire<S: LedgerStore + 'static>(
    store: Arc<S>,
    config: &Config,
    catalog: Arc<Catalog>,
) -> anyhow::Result<Wiring> {
    let tokens = Arc::new(TokenManager::new(&config.jwt_secret, config.jwt_ttl_secs));
    let initial_coins = Balance::new(config.initial_coins)?;

    let ledger: Arc<dyn LedgerStore> = store.clone();
    let state = AppState::new(store, catalog, tokens, PasswordHasher::default(), initial_coins);

    Ok(Wiring { state, ledger })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = config.bind_address().parse()?;

    tracing::info!(
        backend = ?config.storage_backend,
        environment = %config.environment,
        "Starting coin_shop server"
    );

    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading catalog");
            Catalog::from_json_file(path)?
        }
        None => Catalog::merch(),
    });
    tracing::info!(items = catalog.len(), "Catalog ready");

    let mut pool: Option<PgPool> = None;
    let wiring = match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

            tracing::info!("Connecting to database...");
            let pg = db::connect(url, config.database_max_connections).await?;
            db::verify_connection(&pg).await?;

            // Verify database schema
            if !db::check_schema(&pg).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            pool = Some(pg.clone());
            wire(Arc::new(PgStore::new(pg)), &config, Arc::clone(&catalog))?
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on shutdown");
            wire(Arc::new(MemoryStore::new()), &config, Arc::clone(&catalog))?
        }
    };

    let job = (config.reconcile_interval_secs > 0).then(|| {
        ReconciliationJob::new(
            Arc::clone(&wiring.ledger),
            Duration::from_secs(config.reconcile_interval_secs),
        )
        .start()
    });

    let app = build_router(wiring.state, &config.cors_allowed_origins);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(job) = job {
        job.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

//! # spinfeed-gateway
//!
//! Gateway binary: wires the store, admission gate, ingester, dispatcher,
//! heartbeat monitor, and HTTP transports together and runs until a
//! shutdown signal.

#![deny(unsafe_code)]

mod providers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use spinfeed_auth::{AccessGate, EntitlementResolver, TokenVerifier};
use spinfeed_ingest::{Ingester, IngesterConfig};
use spinfeed_server::{
    AppState, ChaChaSealer, ConnectionRegistry, ConnectionState, Dispatcher, PayloadSealer,
    PlainSealer, ServerConfig, ShutdownCoordinator, run_heartbeat, router,
};
use spinfeed_settings::{AuthMode, FeedMode, SpinfeedSettings};
use spinfeed_store::{ChangeNotifier, ConnectionConfig};

use providers::{NotifierWaker, SqliteChangeSource, SqliteHistorySource, SqliteSubscriptionStore};

/// Outcome-feed gateway.
#[derive(Parser, Debug)]
#[command(name = "spinfeed-gateway", about = "Outcome-feed fan-out gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn server_config_from(settings: &SpinfeedSettings, cli: &Cli) -> ServerConfig {
    ServerConfig {
        host: cli.host.clone().unwrap_or_else(|| settings.server.host.clone()),
        port: cli.port.unwrap_or(settings.server.port),
        max_connections: settings.server.max_connections,
        heartbeat_interval: Duration::from_millis(settings.server.heartbeat_interval_ms),
        heartbeat_timeout_factor: settings.server.heartbeat_timeout_factor,
        ..ServerConfig::default()
    }
}

fn ingester_config_from(settings: &SpinfeedSettings) -> IngesterConfig {
    IngesterConfig {
        poll_interval: Duration::from_millis(settings.ingest.poll_interval_ms),
        retry_delay: Duration::from_millis(settings.ingest.retry_delay_ms),
        batch_limit: settings.ingest.batch_limit,
    }
}

fn build_sealer(settings: &SpinfeedSettings) -> Result<Arc<dyn PayloadSealer>> {
    if settings.seal.enabled {
        let path = PathBuf::from(&settings.seal.key_path);
        let sealer = ChaChaSealer::from_key_file(&path)
            .with_context(|| format!("failed to load seal key from {}", path.display()))?;
        tracing::info!(key_path = %path.display(), "payload sealing enabled");
        Ok(Arc::new(sealer))
    } else {
        Ok(Arc::new(PlainSealer))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings_path = spinfeed_settings::settings_path();
    let settings = spinfeed_settings::load_settings_from_path(&settings_path)
        .unwrap_or_else(|e| {
            tracing::warn!(path = %settings_path.display(), error = %e, "settings load failed, using defaults");
            SpinfeedSettings::default()
        });

    if settings.auth.jwt_secret.is_empty() {
        match settings.auth.mode {
            AuthMode::Strict => {
                bail!("strict admission requires SPINFEED_JWT_SECRET (or auth.jwtSecret)")
            }
            AuthMode::Degraded => {
                tracing::warn!("no JWT secret configured, only anonymous admissions will succeed");
            }
        }
    }

    // Store
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.store.db_path));
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let pool = spinfeed_store::new_file(
        &db_path.to_string_lossy(),
        &ConnectionConfig {
            pool_size: settings.store.pool_size,
            ..ConnectionConfig::default()
        },
    )
    .context("failed to open database")?;
    {
        let conn = pool.get().context("failed to get a store connection")?;
        spinfeed_store::run_migrations(&conn).context("failed to run migrations")?;
    }
    let notifier = ChangeNotifier::new();

    // Admission
    let resolver = EntitlementResolver::new(
        Arc::new(SqliteSubscriptionStore::new(pool.clone())),
        settings.tiers.clone(),
        Duration::from_millis(settings.auth.resolve_timeout_ms),
    );
    let gate = Arc::new(AccessGate::new(
        settings.auth.mode,
        TokenVerifier::new(&settings.auth.jwt_secret),
        resolver,
    ));

    // Live side
    let config = Arc::new(server_config_from(&settings, &args));
    let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
    let sealer = build_sealer(&settings)?;
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), sealer.clone()));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    // Ingester: cursors primed to the feed tail so a restart does not
    // replay history.
    let mut ingester = Ingester::new(
        Arc::new(SqliteChangeSource::new(pool.clone())),
        dispatcher,
        ingester_config_from(&settings),
    );
    ingester
        .prime_cursors()
        .await
        .context("failed to prime ingest cursors")?;
    let waker = match settings.ingest.mode {
        FeedMode::Poll => None,
        FeedMode::Notified => Some(
            Arc::new(NotifierWaker(notifier.clone())) as Arc<dyn spinfeed_ingest::ChangeWaker>
        ),
    };
    let ingest_cancel = shutdown.child_token();
    let ingest_handle = tokio::spawn(ingester.run(waker, ingest_cancel.clone()));

    // Heartbeat monitor
    let heartbeat_cancel = shutdown.child_token();
    let heartbeat_handle = tokio::spawn({
        let registry = registry.clone();
        let config = config.clone();
        let cancel = heartbeat_cancel.clone();
        async move {
            let _ = run_heartbeat(
                registry,
                config.heartbeat_interval,
                config.heartbeat_timeout_factor,
                cancel,
            )
            .await;
        }
    });

    // HTTP
    let state = AppState {
        registry: registry.clone(),
        gate,
        history: Arc::new(SqliteHistorySource::new(pool)),
        sealer,
        shutdown: shutdown.clone(),
        config: config.clone(),
        start_time: std::time::Instant::now(),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    let addr = listener.local_addr().context("failed to read bound address")?;
    tracing::info!(%addr, db = %db_path.display(), mode = ?settings.auth.mode, "spinfeed gateway listening");

    let serve_token = shutdown.token();
    let server_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(serve_token.cancelled_owned())
            .await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    // Ordered drain: stop ingestion first so no new events enter the
    // dispatcher, then the heartbeat, then close the transports.
    ingest_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), ingest_handle).await;
    heartbeat_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    for conn in registry.all_connections() {
        conn.close(ConnectionState::ClosedByPolicy);
        registry.unregister(conn.id());
    }
    shutdown
        .graceful_shutdown(vec![server_handle], Some(Duration::from_secs(5)))
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

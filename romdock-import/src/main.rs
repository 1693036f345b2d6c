//! romdock-import - ROM import service
//!
//! Watches `<root>/Imports`, identifies dropped games and files them into
//! `<root>/ROMs/<system>`. Serves a small HTTP control surface for scans,
//! conflict resolution and an event stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use romdock_common::config::{load_toml_config, resolve_config_path, resolve_root_folder};
use romdock_common::events::EventBus;
use romdock_import::config::ImportConfig;
use romdock_import::db::{self, OpenVgdb, ReferenceDatabase, SqliteCatalog, UnavailableReference};
use romdock_import::models::{system::load_systems, SystemRegistry};
use romdock_import::services::{
    DirectoryWatcher, FileMediaCache, ImportContext, ImportOrchestrator,
};
use romdock_import::AppState;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for romdock-import
#[derive(Parser, Debug)]
#[command(name = "romdock-import")]
#[command(about = "ROM import and identification service")]
#[command(version)]
struct Args {
    /// Root folder holding Imports/, Conflicts/, ROMs/ and caches
    #[arg(short, long, env = "ROMDOCK_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "ROMDOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the HTTP control surface, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting romdock-import");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve root folder and folder layout
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let mut config = ImportConfig::resolve(&root_folder, &toml_config)
        .context("Invalid import configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config
        .layout
        .ensure_dirs()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    // Step 2: Systems
    let systems = load_systems(&config.layout.systems_file).context("Failed to load systems")?;
    let registry = Arc::new(SystemRegistry::new(systems, &config.layout.roms));
    info!(systems = registry.snapshot().len(), "System registry ready");

    // Step 3: Catalog and reference database
    let pool = db::init_database_pool(&config.layout.catalog_db)
        .await
        .context("Failed to open catalog database")?;
    info!("Catalog: {}", config.layout.catalog_db.display());

    let reference: Arc<dyn ReferenceDatabase> = match OpenVgdb::open(&config.reference_db).await {
        Ok(reference) => {
            info!("Reference database: {}", config.reference_db.display());
            Arc::new(reference)
        }
        Err(e) => {
            warn!("Reference database not available, metadata lookups will be retried later: {}", e);
            Arc::new(UnavailableReference::new(&config.reference_db))
        }
    };

    // Step 4: Pipeline
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("romdock/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let event_bus = EventBus::new(256);
    info!(capacity = event_bus.capacity(), "Event bus ready");

    let orchestrator = Arc::new(ImportOrchestrator::new(ImportContext {
        config: config.clone(),
        registry,
        catalog: Arc::new(SqliteCatalog::new(pool)),
        reference,
        media_cache: Arc::new(FileMediaCache::new(&config.layout.artwork_cache)),
        event_bus: event_bus.clone(),
        http,
    }));

    // Step 5: Drop folder watcher feeding batches to the orchestrator
    let shutdown = CancellationToken::new();
    let (batch_tx, mut batch_rx) = mpsc::channel::<Vec<PathBuf>>(64);
    let watcher = DirectoryWatcher::new(&config.layout.imports, config.stability_interval, event_bus);
    let watcher_handle = watcher
        .start(batch_tx, shutdown.clone())
        .await
        .context("Failed to start directory watcher")?;

    let state = AppState::new(Arc::clone(&orchestrator));
    let consumer_state = state.clone();
    let consumer = tokio::spawn(async move {
        while let Some(paths) = batch_rx.recv().await {
            let report = consumer_state.orchestrator.import_batch(paths).await;
            consumer_state
                .batch_reports
                .write()
                .await
                .insert(report.batch_id, report);
        }
    });

    // Step 6: HTTP
    let app = romdock_import::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Batches in flight run to completion; the watcher stops taking new ones
    shutdown.cancel();
    if let Err(e) = watcher_handle.await {
        warn!("Directory watcher task ended abnormally: {}", e);
    }
    if let Err(e) = consumer.await {
        warn!("Import task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

//! # Kassa Terminal
//!
//! Headless daemon that keeps one terminal's local store in sync with the
//! shared store.
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load `sync.toml` (path from `KASSA_CONFIG`, else the platform config dir)
//! 3. Open the local store (`KASSA_DB_PATH` overrides the configured path)
//! 4. Build the sync context and run its startup sequence
//! 5. Wait for Ctrl-C or SIGTERM, then shut down

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use kassa_db::{Database, DbConfig};
use kassa_sync::{SyncConfig, SyncContext, SyncEventEmitter, SyncStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("Starting Kassa terminal");

    let config_path = std::env::var_os("KASSA_CONFIG").map(PathBuf::from);
    let config = SyncConfig::load(config_path)?;
    info!(
        device = %config.device.id,
        name = %config.device.name,
        role = %config.device.role,
        "Configuration loaded"
    );

    let db_path = std::env::var_os("KASSA_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.database_path());
    info!(path = %db_path.display(), "Opening local store");
    let db = Arc::new(Database::new(DbConfig::new(db_path)).await?);

    let context = SyncContext::build(config, db, Arc::new(LogEmitter)).await?;
    match context.init().await {
        Some(report) if report.success => info!(
            applied = report.queue_applied,
            imported = report.imported,
            "Network mode"
        ),
        Some(report) => warn!(error = ?report.error, "Autostart failed, local mode"),
        None => info!("Local mode"),
    }

    shutdown_signal().await;
    context.shutdown().await;
    info!("Kassa terminal stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kassa=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

/// Writes sync notifications to the log.
struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        info!(
            mode = %status.mode,
            connection = %status.connection_state,
            pending = status.pending_count,
            address = ?status.server_address,
            "Sync status"
        );
    }

    fn emit_progress(&self, pending: usize, applied: usize) {
        info!(pending, applied, "Queue progress");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(retryable, "Sync error: {message}");
    }
}

//! # Sync Context
//!
//! Application-lifetime bundle of the sync services, built once by the
//! startup sequence and torn down by `shutdown`.

use std::sync::Arc;

use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::manager::{NoOpEmitter, SyncEventEmitter, SyncManager, SyncReport};
use crate::settings::SettingsStore;
use kassa_db::Database;

pub struct SyncContext {
    config: SyncConfig,
    settings: Arc<SettingsStore>,
    db: Arc<Database>,
    manager: SyncManager,
}

impl SyncContext {
    /// Opens `settings.json` under the configured data dir and wires the
    /// sync services around `db`. Nothing touches the network yet.
    pub async fn build(
        config: SyncConfig,
        db: Arc<Database>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> SyncResult<Self> {
        let settings = Arc::new(SettingsStore::open(config.settings_path()).await?);
        Self::with_settings(config, settings, db, emitter).await
    }

    pub async fn with_settings(
        config: SyncConfig,
        settings: Arc<SettingsStore>,
        db: Arc<Database>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> SyncResult<Self> {
        let manager =
            SyncManager::with_emitter(config.clone(), settings.clone(), db.clone(), emitter).await?;
        Ok(Self {
            config,
            settings,
            db,
            manager,
        })
    }

    /// [`build`](Self::build) followed by [`init`](Self::init), with no
    /// status sink.
    pub async fn start(config: SyncConfig, db: Arc<Database>) -> SyncResult<Self> {
        let context = Self::build(config, db, Arc::new(NoOpEmitter)).await?;
        context.init().await;
        Ok(context)
    }

    /// Runs the manager's startup sequence (autostart probe).
    pub async fn init(&self) -> Option<SyncReport> {
        info!(device = %self.config.device.name, "Initializing sync layer");
        self.manager.init().await
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        self.db.close().await;
        info!("Sync layer stopped");
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }
}

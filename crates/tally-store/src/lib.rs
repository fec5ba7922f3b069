// ABOUTME: Persistence layer for tally: SQLite engine actor, CRUD facade, live queries, and settings.
// ABOUTME: The Tally context wires these together once at startup and owns the settings cache.

pub mod config;
pub mod crud;
pub mod engine;
pub mod error;
pub mod live;
pub mod logger;
pub mod purge;
pub mod settings;
pub mod sqlite;
pub mod transfer;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tally_core::{Category, LiveQuery, Record};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use config::{ConfigError, TallyConfig};
pub use crud::RecordService;
pub use engine::{ChangeEvent, ChangeKind, EngineHandle};
pub use error::{StoreError, StoreResult};
pub use live::{LiveQueries, Subscription};
pub use logger::RecordLogger;
pub use purge::LogPurger;
pub use settings::Settings;
pub use sqlite::RecordTable;
pub use transfer::{APP_NAME, ExportEnvelope, ImportSummary};

/// The application data layer. Built once at startup and shared by
/// reference; there is no global state.
pub struct Tally {
    engine: EngineHandle,
    settings: Arc<Settings>,
    records: RecordService,
    live: LiveQueries,
    logger: RecordLogger,
    purger: Arc<LogPurger>,
}

impl Tally {
    /// Open the file-backed store described by `config` and initialize settings.
    pub async fn open(config: &TallyConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.home)?;
        let path = config.db_path();
        let engine = EngineHandle::open(&path, config.channel_capacity)?;
        info!(path = %path.display(), "store opened");
        Self::assemble(engine).await
    }

    /// Open a private in-memory store and initialize settings.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let engine = EngineHandle::open_in_memory(256)?;
        Self::assemble(engine).await
    }

    async fn assemble(engine: EngineHandle) -> StoreResult<Self> {
        let settings = Arc::new(Settings::new(engine.clone()));
        settings.initialize().await?;
        Ok(Self {
            records: RecordService::new(engine.clone(), Arc::clone(&settings)),
            live: LiveQueries::new(engine.clone()),
            logger: RecordLogger::new(engine.clone(), Arc::clone(&settings)),
            purger: Arc::new(LogPurger::new(engine.clone(), Arc::clone(&settings))),
            engine,
            settings,
        })
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn records(&self) -> &RecordService {
        &self.records
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn logger(&self) -> &RecordLogger {
        &self.logger
    }

    pub fn subscribe<N, E>(&self, query: LiveQuery, on_next: N, on_error: E) -> Subscription
    where
        N: Fn(Vec<Record>) + Send + Sync + 'static,
        E: Fn(StoreError) + Send + Sync + 'static,
    {
        self.live.subscribe(query, on_next, on_error)
    }

    pub async fn purge_expired_logs(&self) -> StoreResult<usize> {
        self.purger.purge_expired_logs().await
    }

    /// Start the periodic log purger.
    pub fn spawn_purger(&self, period: Duration) -> JoinHandle<()> {
        Arc::clone(&self.purger).spawn(period)
    }

    pub async fn export_records(&self, categories: &[Category]) -> StoreResult<ExportEnvelope> {
        transfer::export_records(&self.records, categories).await
    }

    pub async fn import_records(&self, document: Value) -> StoreResult<ImportSummary> {
        transfer::import_records(&self.records, document).await
    }

    /// Irreversibly delete every record and close the store. The settings
    /// cache is wiped with it; every later operation fails with StoreClosed.
    pub async fn delete_store(&self) -> StoreResult<()> {
        // The engine is closed whether or not its files came off disk.
        let result = self.engine.delete_store().await;
        self.settings.reset();
        match &result {
            Ok(()) => info!("store deleted; settings cache cleared"),
            Err(e) => warn!(error = %e, "store closed but not fully deleted; settings cache cleared"),
        }
        result
    }
}

//! Application state wiring the engine together.
//!
//! AppState holds the database pool and loaded configuration used by
//! every CLI command. Commands construct the orchestrator on demand,
//! pinned to the concrete infra implementations.

use std::path::PathBuf;

use syllog_infra::config::{database_url, default_data_dir, load_global_config, paradigm_dir};
use syllog_infra::sqlite::DatabasePool;
use syllog_types::config::GlobalConfig;

/// Shared application state for CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub config: GlobalConfig,
}

impl AppState {
    /// Initialize the application state: resolve the data directory,
    /// load configuration, connect to the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = default_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::create_dir_all(paradigm_dir(&data_dir)).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        Ok(Self {
            data_dir,
            db_pool,
            config,
        })
    }
}

pub mod config;
pub mod db;
pub mod errors;
pub mod goals;
pub mod metrics;
pub mod models;
pub mod redaction;
pub mod remote;
pub mod roles;
pub mod storage;

use crate::config::AppConfig;
use crate::db::SqliteKeyValueStore;
use crate::errors::{AppError, AppResult};
use crate::metrics::MetricsStore;
use crate::models::{Feature, Resolution, Role};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Everything the host shell needs to serve the metrics screens.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub metrics: Arc<MetricsStore<Arc<SqliteKeyValueStore>>>,
}

impl AppState {
    pub fn resolve_view(&self, role: Option<&Role>, feature: Feature) -> Resolution {
        roles::resolve_view(role, feature)
    }
}

/// Opens on-device storage and, if configured, file logging.
pub fn bootstrap(config: AppConfig) -> AppResult<AppState> {
    std::fs::create_dir_all(&config.data_dir)?;

    if config.log_to_file {
        init_tracing(&config.log_dir(), &config.log_filter).map_err(AppError::Internal)?;
    }

    let storage = Arc::new(SqliteKeyValueStore::new(&config.database_path())?);
    tracing::info!(
        db_path = %storage.db_path().display(),
        storage_key = %config.metrics_storage_key,
        "coach companion storage ready"
    );

    let metrics = MetricsStore::with_key(storage, config.metrics_storage_key.clone());
    Ok(AppState {
        config,
        metrics: Arc::new(metrics),
    })
}

pub fn bootstrap_from_file(config_path: &Path) -> AppResult<AppState> {
    bootstrap(AppConfig::load(config_path)?)
}

pub fn init_tracing(log_dir: &Path, default_filter: &str) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "coach-companion.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

/// Flattens an error for the UI layer, flagging the ones worth a retry prompt.
pub fn to_client_error(error: &AppError) -> String {
    if error.is_retryable() {
        format!("{} (retryable)", error)
    } else {
        error.to_string()
    }
}

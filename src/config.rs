use crate::errors::{AppError, AppResult};
use crate::metrics::METRICS_STORAGE_KEY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "coach-companion.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub metrics_storage_key: String,
    pub log_filter: String,
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("coach-companion-data"),
            metrics_storage_key: METRICS_STORAGE_KEY.to_string(),
            log_filter: "info".to_string(),
            log_to_file: true,
        }
    }
}

impl AppConfig {
    /// Reads a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|error| AppError::Config(error.to_string()))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    fn validate(&self) -> AppResult<()> {
        if self.metrics_storage_key.trim().is_empty() {
            return Err(AppError::Config("metricsStorageKey must not be empty".to_string()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(AppError::Config("dataDir must not be empty".to_string()));
        }
        Ok(())
    }
}

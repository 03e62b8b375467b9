use crate::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("PERSISTENCE_FAILURE: {0}")]
    Persistence(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("REMOTE_FAILURE: {0}")]
    Remote(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Failures the user can reasonably retry from a notification.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Remote(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::NotFound(what) => Self::NotFound(what),
            other => Self::Remote(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("no row in {0}")]
    NotFound(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Equality predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.column) == Some(&self.value)
    }
}

/// Hosted backend reachable by generic queries. `columns` is a
/// comma-separated projection, `*` for whole rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Vec<Record>, RemoteError>;

    async fn insert(&self, table: &str, record: Record) -> Result<Record, RemoteError>;

    /// Exactly one matching row; zero rows is `NotFound`.
    async fn single(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Record, RemoteError> {
        let mut rows = self.select(table, columns, filters).await?;
        match rows.len() {
            0 => Err(RemoteError::NotFound(table.to_string())),
            1 => Ok(rows.remove(0)),
            count => Err(RemoteError::Query(format!(
                "expected a single row from {}, got {}",
                table, count
            ))),
        }
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn select(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Vec<Record>, RemoteError> {
        (**self).select(table, columns, filters).await
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, RemoteError> {
        (**self).insert(table, record).await
    }

    async fn single(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Record, RemoteError> {
        (**self).single(table, columns, filters).await
    }
}

pub fn project(record: &Record, columns: &str) -> Record {
    let columns = columns.trim();
    if columns.is_empty() || columns == "*" {
        return record.clone();
    }

    columns
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .filter_map(|column| record.get(column).map(|value| (column.to_string(), value.clone())))
        .collect()
}

/// Table-per-vec fake of the hosted backend.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    unavailable: Mutex<bool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().await = unavailable;
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.lock().await.get(table).map(Vec::len).unwrap_or(0)
    }

    async fn check_available(&self) -> Result<(), RemoteError> {
        if *self.unavailable.lock().await {
            return Err(RemoteError::Unavailable("memory backend offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Vec<Record>, RemoteError> {
        self.check_available().await?;
        let tables = self.tables.lock().await;
        let rows: Vec<Record> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|filter| filter.matches(row)))
                    .map(|row| project(row, columns))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, RemoteError> {
        self.check_available().await?;
        if !record.contains_key("id") {
            record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let mut tables = self.tables.lock().await;
        tables.entry(table.to_string()).or_default().push(record.clone());
        Ok(record)
    }
}

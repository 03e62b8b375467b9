use crate::errors::{AppError, AppResult};
use crate::models::{Metric, MetricData, MetricEntry, MetricTrend, MetricType};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const METRICS_STORAGE_KEY: &str = "@coach_companion/metrics";

/// Persisted health metrics, stored as one JSON blob under a single key.
///
/// Nothing is cached between calls: every operation re-reads the blob, and
/// every mutation rewrites the whole map. Two concurrent mutations therefore
/// race and the later write wins.
#[derive(Debug)]
pub struct MetricsStore<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStore> MetricsStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, METRICS_STORAGE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Returns every known metric. Never fails: storage or parse errors are
    /// logged and the default set is returned for this call only.
    pub async fn get_metrics(&self) -> MetricData {
        match self.storage.get(&self.key).await {
            Ok(Some(raw)) => match merge_with_defaults(&raw, MergeMode::Lenient) {
                Ok(data) => data,
                Err(error) => {
                    tracing::warn!(key = %self.key, error = %error, "stored metrics are unreadable; using defaults");
                    MetricData::defaults()
                }
            },
            Ok(None) => {
                let defaults = MetricData::defaults();
                if let Err(error) = self.persist(&defaults).await {
                    tracing::warn!(key = %self.key, error = %error, "failed to initialize default metrics");
                }
                defaults
            }
            Err(error) => {
                tracing::error!(key = %self.key, error = %error, "failed to read metrics; using defaults");
                MetricData::defaults()
            }
        }
    }

    pub async fn get_metric(&self, metric: MetricType) -> Metric {
        self.get_metrics()
            .await
            .get(metric)
            .cloned()
            .unwrap_or_else(|| metric.default_metric())
    }

    /// Replaces the stored definition and history for `metric_type`.
    pub async fn save_metric(&self, metric_type: MetricType, metric: Metric) -> AppResult<()> {
        self.mutate_metric(metric_type, move |stored| {
            *stored = metric;
            true
        })
        .await
    }

    pub async fn add_metric_entry(
        &self,
        metric_type: MetricType,
        value: f64,
        date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> AppResult<MetricEntry> {
        if !value.is_finite() {
            return Err(AppError::InvalidInput(format!(
                "{} value must be a finite number",
                metric_type
            )));
        }

        let now = Utc::now();
        let entry = MetricEntry {
            id: Uuid::new_v4().to_string(),
            value,
            date: date.unwrap_or(now),
            notes: notes.filter(|text| !text.trim().is_empty()),
            created_at: now,
        };

        let appended = entry.clone();
        self.mutate_metric(metric_type, move |metric| {
            metric.entries.push(appended);
            true
        })
        .await?;

        tracing::debug!(metric = %metric_type, entry_id = %entry.id, "metric entry added");
        Ok(entry)
    }

    /// Removes one entry. Unknown ids are a no-op.
    pub async fn delete_metric_entry(&self, metric_type: MetricType, entry_id: &str) -> AppResult<()> {
        self.mutate_metric(metric_type, |metric| {
            let before = metric.entries.len();
            metric.entries.retain(|entry| entry.id != entry_id);
            if metric.entries.len() == before {
                tracing::debug!(metric = %metric_type, entry_id = %entry_id, "no metric entry to delete");
                return false;
            }
            true
        })
        .await
    }

    /// Drops the persisted blob; the next read re-initializes defaults.
    pub async fn clear_all_metrics(&self) -> AppResult<()> {
        self.storage.remove(&self.key).await.map_err(|error| {
            tracing::error!(key = %self.key, error = %error, "failed to clear metrics");
            as_persistence(error)
        })
    }

    pub async fn metric_trend(&self, metric_type: MetricType) -> MetricTrend {
        let metric = self.get_metric(metric_type).await;
        let first_value = metric.first_entry().map(|entry| entry.value);
        let change = match (first_value, metric.current_value) {
            (Some(first), Some(current)) => Some(current - first),
            _ => None,
        };

        MetricTrend {
            metric: metric_type,
            first_value,
            current_value: metric.current_value,
            change,
            entry_count: metric.entries.len(),
        }
    }

    /// Applies `change` to one metric of a strictly-read snapshot and writes
    /// the whole map back. `change` returns `false` to skip the write.
    async fn mutate_metric<F>(&self, metric_type: MetricType, change: F) -> AppResult<()>
    where
        F: FnOnce(&mut Metric) -> bool,
    {
        let result = async move {
            let mut data = self.load_for_write().await?;
            let mut metric = data
                .get(metric_type)
                .cloned()
                .unwrap_or_else(|| metric_type.default_metric());
            if !change(&mut metric) {
                return Ok(());
            }
            metric.id = metric_type;
            metric.fill_definition_gaps();
            metric.normalize();
            data.insert(metric_type, metric);
            self.persist(&data).await
        }
        .await;

        if let Err(error) = &result {
            tracing::error!(metric = %metric_type, error = %error, "failed to write metric");
        }
        result
    }

    /// Strict read used before a whole-map rewrite. Unlike `get_metrics`, an
    /// unreadable blob or metric aborts the write instead of being replaced
    /// by defaults.
    async fn load_for_write(&self) -> AppResult<MetricData> {
        match self.storage.get(&self.key).await.map_err(as_persistence)? {
            Some(raw) => merge_with_defaults(&raw, MergeMode::Strict)
                .map_err(|error| AppError::Persistence(format!("stored metrics are unreadable: {}", error))),
            None => Ok(MetricData::defaults()),
        }
    }

    async fn persist(&self, data: &MetricData) -> AppResult<()> {
        let raw = serde_json::to_string(data)?;
        self.storage.set(&self.key, &raw).await.map_err(as_persistence)
    }
}

fn as_persistence(error: AppError) -> AppError {
    match error {
        AppError::Persistence(message) => AppError::Persistence(message),
        other => AppError::Persistence(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// A malformed metric falls back to its default.
    Lenient,
    /// A malformed metric fails the whole read.
    Strict,
}

/// Overlays each persisted metric on the default set. Unknown keys are
/// dropped and blank definition fields are filled from the built-ins.
fn merge_with_defaults(raw: &str, mode: MergeMode) -> AppResult<MetricData> {
    let persisted: Map<String, Value> = serde_json::from_str(raw)?;
    let mut data = MetricData::defaults();

    for (key, mut value) in persisted {
        let Some(metric_type) = MetricType::parse(&key) else {
            tracing::debug!(key = %key, "ignoring unknown stored metric");
            continue;
        };

        if let Value::Object(fields) = &mut value {
            fields.insert("id".to_string(), Value::from(metric_type.as_str()));
        }

        match serde_json::from_value::<Metric>(value) {
            Ok(mut metric) => {
                metric.fill_definition_gaps();
                data.insert(metric_type, metric);
            }
            Err(error) if mode == MergeMode::Strict => {
                return Err(AppError::Persistence(format!(
                    "stored {} metric is malformed: {}",
                    metric_type, error
                )));
            }
            Err(error) => {
                tracing::warn!(metric = %metric_type, error = %error, "stored metric is malformed; using default");
            }
        }
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::{MetricsStore, METRICS_STORAGE_KEY};
    use crate::errors::AppError;
    use crate::models::{MetricData, MetricEntry, MetricType};
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn store() -> (Arc<MemoryKeyValueStore>, MetricsStore<Arc<MemoryKeyValueStore>>) {
        let storage = Arc::new(MemoryKeyValueStore::new());
        (storage.clone(), MetricsStore::new(storage))
    }

    #[tokio::test]
    async fn first_read_initializes_defaults() {
        let (storage, metrics) = store();
        let data = metrics.get_metrics().await;

        assert_eq!(data, MetricData::defaults());
        assert!(data.iter().all(|(_, metric)| metric.entries.is_empty()));
        assert!(storage.contains(METRICS_STORAGE_KEY).await);
    }

    #[tokio::test]
    async fn added_entry_becomes_current() {
        let (_, metrics) = store();
        metrics
            .add_metric_entry(MetricType::Weight, 72.5, Some(day(2024, 1, 1)), None)
            .await
            .expect("add entry");

        let weight = metrics.get_metric(MetricType::Weight).await;
        assert_eq!(weight.entries.len(), 1);
        assert_eq!(weight.entries[0].value, 72.5);
        assert_eq!(weight.current_value, Some(72.5));
        assert_eq!(weight.last_updated, Some(day(2024, 1, 1)));
    }

    #[tokio::test]
    async fn back_dated_entry_does_not_become_current() {
        let (_, metrics) = store();
        metrics
            .add_metric_entry(MetricType::Weight, 70.0, Some(day(2024, 2, 1)), None)
            .await
            .expect("add february");
        metrics
            .add_metric_entry(MetricType::Weight, 74.0, Some(day(2024, 1, 1)), Some("late log".to_string()))
            .await
            .expect("add january");

        let weight = metrics.get_metric(MetricType::Weight).await;
        let dates: Vec<_> = weight.entries.iter().map(|entry| entry.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 1), day(2024, 2, 1)]);
        assert_eq!(weight.current_value, Some(70.0));
        assert_eq!(weight.last_updated, Some(day(2024, 2, 1)));
        assert_eq!(weight.entries[0].notes.as_deref(), Some("late log"));
    }

    #[tokio::test]
    async fn deleting_unknown_entry_is_a_no_op() {
        let (_, metrics) = store();
        metrics
            .add_metric_entry(MetricType::Weight, 72.5, Some(day(2024, 1, 1)), None)
            .await
            .expect("add entry");
        let before = metrics.get_metric(MetricType::Weight).await;

        metrics
            .delete_metric_entry(MetricType::Weight, "nonexistent-id")
            .await
            .expect("delete unknown id");

        assert_eq!(metrics.get_metric(MetricType::Weight).await, before);
    }

    #[tokio::test]
    async fn deleting_latest_entry_recomputes_current() {
        let (_, metrics) = store();
        metrics
            .add_metric_entry(MetricType::Steps, 8_000.0, Some(day(2024, 3, 1)), None)
            .await
            .expect("add first");
        let latest = metrics
            .add_metric_entry(MetricType::Steps, 12_000.0, Some(day(2024, 3, 2)), None)
            .await
            .expect("add second");

        metrics
            .delete_metric_entry(MetricType::Steps, &latest.id)
            .await
            .expect("delete latest");

        let steps = metrics.get_metric(MetricType::Steps).await;
        assert_eq!(steps.entries.len(), 1);
        assert_eq!(steps.current_value, Some(8_000.0));
        assert_eq!(steps.last_updated, Some(day(2024, 3, 1)));
    }

    #[tokio::test]
    async fn deleting_last_entry_clears_current() {
        let (_, metrics) = store();
        let entry = metrics
            .add_metric_entry(MetricType::BodyFat, 18.2, None, None)
            .await
            .expect("add entry");

        metrics
            .delete_metric_entry(MetricType::BodyFat, &entry.id)
            .await
            .expect("delete entry");

        let body_fat = metrics.get_metric(MetricType::BodyFat).await;
        assert!(body_fat.entries.is_empty());
        assert_eq!(body_fat.current_value, None);
        assert_eq!(body_fat.last_updated, None);
    }

    #[tokio::test]
    async fn clear_resets_to_defaults() {
        let (storage, metrics) = store();
        metrics
            .add_metric_entry(MetricType::WaterIntake, 500.0, None, None)
            .await
            .expect("add entry");

        metrics.clear_all_metrics().await.expect("clear");
        assert!(!storage.contains(METRICS_STORAGE_KEY).await);
        assert_eq!(metrics.get_metrics().await, MetricData::defaults());
    }

    #[tokio::test]
    async fn missing_metric_types_are_filled_from_defaults() {
        let (storage, metrics) = store();
        let legacy = serde_json::json!({
            "weight": {
                "id": "weight",
                "name": "Weight",
                "unit": "lb",
                "icon": "scale",
                "entries": [{
                    "id": "e1",
                    "value": 160.0,
                    "date": "2023-06-01T00:00:00Z",
                    "created_at": "2023-06-01T00:00:00Z"
                }],
                "currentValue": 160.0,
                "lastUpdated": "2023-06-01T00:00:00Z"
            },
            "retired_metric": { "id": "retired_metric" }
        });
        storage
            .set(METRICS_STORAGE_KEY, &legacy.to_string())
            .await
            .expect("seed legacy blob");

        let data = metrics.get_metrics().await;
        assert_eq!(data.len(), MetricType::ALL.len());
        let weight = data.get(MetricType::Weight).expect("weight");
        assert_eq!(weight.unit, "lb");
        assert_eq!(weight.current_value, Some(160.0));
        let sleep = data.get(MetricType::Sleep).expect("sleep filled in");
        assert!(sleep.entries.is_empty());
    }

    #[tokio::test]
    async fn malformed_blob_reads_as_defaults_without_rewriting() {
        let (storage, metrics) = store();
        storage.set(METRICS_STORAGE_KEY, "{not json").await.expect("seed");

        assert_eq!(metrics.get_metrics().await, MetricData::defaults());
        assert_eq!(
            storage.get(METRICS_STORAGE_KEY).await.expect("get").as_deref(),
            Some("{not json")
        );

        let result = metrics.add_metric_entry(MetricType::Weight, 70.0, None, None).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(
            storage.get(METRICS_STORAGE_KEY).await.expect("get").as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn read_failure_falls_back_to_defaults() {
        let (storage, metrics) = store();
        storage.set_fail_reads(true);
        assert_eq!(metrics.get_metrics().await, MetricData::defaults());
        assert!(metrics.get_metric(MetricType::Calories).await.entries.is_empty());
    }

    #[tokio::test]
    async fn write_failures_are_reported() {
        let (storage, metrics) = store();
        storage.set_fail_writes(true);

        let added = metrics.add_metric_entry(MetricType::Weight, 70.0, None, None).await;
        assert!(matches!(added, Err(AppError::Persistence(_))));
        let saved = metrics
            .save_metric(MetricType::Sleep, MetricType::Sleep.default_metric())
            .await;
        assert!(matches!(saved, Err(AppError::Persistence(_))));
        assert!(matches!(metrics.clear_all_metrics().await, Err(AppError::Persistence(_))));
    }

    #[tokio::test]
    async fn non_finite_values_are_rejected() {
        let (storage, metrics) = store();
        let result = metrics.add_metric_entry(MetricType::Weight, f64::NAN, None, None).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(!storage.contains(METRICS_STORAGE_KEY).await);
    }

    #[tokio::test]
    async fn save_metric_keeps_key_and_id_aligned() {
        let (_, metrics) = store();
        let mut renamed = MetricType::Waist.default_metric();
        renamed.id = MetricType::Bmi;
        renamed.unit = "in".to_string();

        metrics.save_metric(MetricType::Waist, renamed).await.expect("save");

        let waist = metrics.get_metric(MetricType::Waist).await;
        assert_eq!(waist.id, MetricType::Waist);
        assert_eq!(waist.unit, "in");
        assert_eq!(metrics.get_metric(MetricType::Bmi).await, MetricType::Bmi.default_metric());
    }

    #[tokio::test]
    async fn trend_reports_change_since_first_entry() {
        let (_, metrics) = store();
        assert_eq!(metrics.metric_trend(MetricType::Weight).await.change, None);

        metrics
            .add_metric_entry(MetricType::Weight, 80.0, Some(day(2024, 1, 1)), None)
            .await
            .expect("add first");
        metrics
            .add_metric_entry(MetricType::Weight, 77.5, Some(day(2024, 2, 1)), None)
            .await
            .expect("add second");

        let trend = metrics.metric_trend(MetricType::Weight).await;
        assert_eq!(trend.first_value, Some(80.0));
        assert_eq!(trend.current_value, Some(77.5));
        assert_eq!(trend.change, Some(-2.5));
        assert_eq!(trend.entry_count, 2);
    }

    #[tokio::test]
    async fn custom_key_is_isolated() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let metrics = MetricsStore::with_key(storage.clone(), "user-42/metrics");
        metrics.get_metrics().await;
        assert!(storage.contains("user-42/metrics").await);
        assert!(!storage.contains(METRICS_STORAGE_KEY).await);
    }

    async fn stored_blob(storage: &MemoryKeyValueStore) -> serde_json::Value {
        let raw = storage
            .get(METRICS_STORAGE_KEY)
            .await
            .expect("get")
            .expect("blob present");
        serde_json::from_str(&raw).expect("stored blob is json")
    }

    #[tokio::test]
    async fn read_failure_during_add_keeps_history() {
        let (storage, metrics) = store();
        for (offset, value) in [80.0, 79.5, 79.2].into_iter().enumerate() {
            metrics
                .add_metric_entry(MetricType::Weight, value, Some(day(2024, 1, 1 + offset as u32)), None)
                .await
                .expect("seed entry");
        }

        storage.fail_next_reads(1);
        let result = metrics.add_metric_entry(MetricType::Weight, 79.0, None, None).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));

        let weight = metrics.get_metric(MetricType::Weight).await;
        assert_eq!(weight.entries.len(), 3);
        assert_eq!(weight.current_value, Some(79.2));
    }

    #[tokio::test]
    async fn read_failure_during_delete_is_reported() {
        let (storage, metrics) = store();
        let entry = metrics
            .add_metric_entry(MetricType::Sleep, 7.5, None, None)
            .await
            .expect("add entry");

        storage.fail_next_reads(1);
        let result = metrics.delete_metric_entry(MetricType::Sleep, &entry.id).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(metrics.get_metric(MetricType::Sleep).await.entries.len(), 1);
    }

    #[tokio::test]
    async fn legacy_metric_without_definition_fields_keeps_history() {
        let (storage, metrics) = store();
        let legacy = serde_json::json!({
            "weight": {
                "unit": "lb",
                "entries": [{
                    "id": "e1",
                    "value": 160.0,
                    "date": "2023-06-01T00:00:00Z",
                    "created_at": "2023-06-01T00:00:00Z"
                }],
                "currentValue": 160.0,
                "lastUpdated": "2023-06-01T00:00:00Z"
            }
        });
        storage
            .set(METRICS_STORAGE_KEY, &legacy.to_string())
            .await
            .expect("seed legacy blob");

        let weight = metrics.get_metric(MetricType::Weight).await;
        assert_eq!(weight.entries.len(), 1);
        assert_eq!(weight.name, "Weight");
        assert_eq!(weight.icon, "scale");
        assert_eq!(weight.unit, "lb");

        metrics
            .add_metric_entry(MetricType::Steps, 5_000.0, None, None)
            .await
            .expect("write another metric");

        let blob = stored_blob(&storage).await;
        assert_eq!(blob["weight"]["entries"].as_array().map(Vec::len), Some(1));
        assert_eq!(blob["weight"]["icon"], "scale");
        assert_eq!(blob["steps"]["entries"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn malformed_metric_blocks_writes_but_not_reads() {
        let (storage, metrics) = store();
        let blob = serde_json::json!({
            "weight": { "id": "weight", "entries": "not-a-list" },
            "steps": { "id": "steps", "name": "Steps", "unit": "steps", "icon": "footprints", "entries": [] }
        })
        .to_string();
        storage.set(METRICS_STORAGE_KEY, &blob).await.expect("seed");

        let data = metrics.get_metrics().await;
        assert_eq!(data.get(MetricType::Weight), Some(&MetricType::Weight.default_metric()));

        let result = metrics.add_metric_entry(MetricType::Steps, 5_000.0, None, None).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(
            storage.get(METRICS_STORAGE_KEY).await.expect("get").as_deref(),
            Some(blob.as_str())
        );
    }

    #[tokio::test]
    async fn save_metric_restores_ordering_and_current_value() {
        let (_, metrics) = store();
        let mut weight = MetricType::Weight.default_metric();
        weight.entries = vec![
            MetricEntry {
                id: "later".to_string(),
                value: 75.0,
                date: day(2024, 3, 1),
                notes: None,
                created_at: Utc::now(),
            },
            MetricEntry {
                id: "earlier".to_string(),
                value: 78.0,
                date: day(2024, 1, 1),
                notes: None,
                created_at: Utc::now(),
            },
        ];
        weight.current_value = Some(78.0);
        weight.last_updated = Some(day(2024, 1, 1));

        metrics.save_metric(MetricType::Weight, weight).await.expect("save");

        let stored = metrics.get_metric(MetricType::Weight).await;
        assert_eq!(stored.entries[0].id, "earlier");
        assert_eq!(stored.current_value, Some(75.0));
        assert_eq!(stored.last_updated, Some(day(2024, 3, 1)));
    }
}

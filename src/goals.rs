use crate::errors::{AppError, AppResult};
use crate::models::{DevicePlatform, Goal, GoalProgress, Metric, MetricType, NewGoal, Role};
use crate::redaction::Redactor;
use crate::remote::{Filter, Record, RecordStore, RemoteError};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

const PROFILES_TABLE: &str = "profiles";
const GOALS_TABLE: &str = "goals";
const PUSH_TOKENS_TABLE: &str = "push_tokens";

/// Per-user goals, profile role and device registration on the hosted backend.
#[derive(Debug)]
pub struct GoalsRepository<R> {
    remote: R,
    redactor: Redactor,
}

impl<R: RecordStore> GoalsRepository<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            redactor: Redactor::new(),
        }
    }

    /// `None` when the profile row is missing or has no role yet.
    pub async fn fetch_role(&self, user_id: &str) -> AppResult<Option<Role>> {
        let row = match self
            .remote
            .single(PROFILES_TABLE, "id, role", &[Filter::eq("id", user_id)])
            .await
        {
            Ok(row) => row,
            Err(RemoteError::NotFound(_)) => {
                tracing::info!(user_id = %user_id, "profile not found");
                return Ok(None);
            }
            Err(error) => {
                tracing::error!(user_id = %user_id, error = %self.scrub(&error), "failed to fetch profile role");
                return Err(error.into());
            }
        };

        Ok(Role::from_session_tag(row.get("role").and_then(Value::as_str)))
    }

    pub async fn list_goals(&self, user_id: &str) -> AppResult<Vec<Goal>> {
        let rows = self
            .remote
            .select(GOALS_TABLE, "*", &[Filter::eq("user_id", user_id)])
            .await
            .map_err(|error| {
                tracing::error!(user_id = %user_id, error = %self.scrub(&error), "failed to list goals");
                AppError::from(error)
            })?;

        let mut goals: Vec<Goal> = rows
            .into_iter()
            .filter_map(|row| match parse_goal(row) {
                Ok(goal) => Some(goal),
                Err(error) => {
                    tracing::warn!(user_id = %user_id, error = %self.scrub(&error), "skipping malformed goal row");
                    None
                }
            })
            .collect();
        goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(goals)
    }

    pub async fn goal_for_metric(&self, user_id: &str, metric: MetricType) -> AppResult<Option<Goal>> {
        let filters = [Filter::eq("user_id", user_id), Filter::eq("metric", metric.as_str())];
        match self.remote.single(GOALS_TABLE, "*", &filters).await {
            Ok(row) => parse_goal(row).map(Some),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(error) => {
                tracing::error!(user_id = %user_id, metric = %metric, error = %self.scrub(&error), "failed to fetch goal");
                Err(error.into())
            }
        }
    }

    pub async fn create_goal(&self, payload: NewGoal) -> AppResult<Goal> {
        if !payload.target_value.is_finite() || payload.start_value.is_some_and(|start| !start.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "{} goal values must be finite numbers",
                payload.metric
            )));
        }
        if payload.user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("goal requires a user id".to_string()));
        }

        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            user_id: payload.user_id,
            metric: payload.metric,
            target_value: payload.target_value,
            start_value: payload.start_value,
            deadline: payload.deadline,
            created_at: Utc::now(),
        };

        let record = match serde_json::to_value(&goal)? {
            Value::Object(record) => record,
            _ => return Err(AppError::Internal("goal did not serialize to an object".to_string())),
        };
        let stored = self.remote.insert(GOALS_TABLE, record).await.map_err(|error| {
            tracing::error!(user_id = %goal.user_id, error = %self.scrub(&error), "failed to create goal");
            AppError::from(error)
        })?;

        tracing::info!(user_id = %goal.user_id, metric = %goal.metric, goal_id = %goal.id, "goal created");
        parse_goal(stored)
    }

    /// Returns `true` when a new registration was stored.
    pub async fn register_push_token(&self, user_id: &str, token: &str, platform: DevicePlatform) -> AppResult<bool> {
        let masked = self.redactor.mask_token(token);
        let filters = [Filter::eq("user_id", user_id), Filter::eq("token", token)];
        let existing = self.remote.select(PUSH_TOKENS_TABLE, "id", &filters).await.map_err(|error| {
            tracing::error!(user_id = %user_id, token = %masked, error = %self.scrub(&error), "failed to look up push token");
            AppError::from(error)
        })?;

        if !existing.is_empty() {
            tracing::debug!(user_id = %user_id, token = %masked, "push token already registered");
            return Ok(false);
        }

        let mut record = Record::new();
        record.insert("user_id".to_string(), Value::from(user_id));
        record.insert("token".to_string(), Value::from(token));
        record.insert("platform".to_string(), Value::from(platform.as_str()));

        self.remote.insert(PUSH_TOKENS_TABLE, record).await.map_err(|error| {
            tracing::error!(user_id = %user_id, token = %masked, error = %self.scrub(&error), "failed to register push token");
            AppError::from(error)
        })?;

        tracing::info!(user_id = %user_id, token = %masked, platform = platform.as_str(), "push token registered");
        Ok(true)
    }

    /// Backend errors can echo request values, so they are redacted before logging.
    fn scrub(&self, error: &dyn std::fmt::Display) -> String {
        self.redactor.redact(&error.to_string()).content
    }
}

fn parse_goal(row: Record) -> AppResult<Goal> {
    serde_json::from_value(Value::Object(row))
        .map_err(|error| AppError::Remote(format!("malformed goal row: {}", error)))
}

/// Progress from the goal's start value (or the metric's first entry)
/// towards its target, clamped to `0.0..=1.0`.
pub fn goal_progress(goal: &Goal, metric: &Metric) -> GoalProgress {
    let current_value = metric.current_value;
    let start_value = goal
        .start_value
        .or_else(|| metric.first_entry().map(|entry| entry.value));

    let progress = match (start_value, current_value) {
        (Some(start), Some(current)) => {
            let span = goal.target_value - start;
            if span == 0.0 {
                Some(1.0)
            } else {
                Some(((current - start) / span).clamp(0.0, 1.0))
            }
        }
        _ => None,
    };

    GoalProgress {
        goal: goal.clone(),
        current_value,
        progress,
        achieved: progress.is_some_and(|value| value >= 1.0),
    }
}

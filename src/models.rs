use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─── Roles & Views ──────────────────────────────────────────────────────────

/// Account kind as reported by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Leads,
    Client,
    Trainer,
    Nutritionist,
    Admin,
    Hr,
    Unknown(String),
}

impl Role {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "leads" => Self::Leads,
            "client" => Self::Client,
            "trainer" => Self::Trainer,
            "nutritionist" => Self::Nutritionist,
            "admin" => Self::Admin,
            "hr" => Self::Hr,
            _ => Self::Unknown(tag.trim().to_string()),
        }
    }

    /// Parses an optional session tag. Missing and blank tags both mean the
    /// role has not been loaded yet.
    pub fn from_session_tag(tag: Option<&str>) -> Option<Self> {
        let tag = tag?;
        if tag.trim().is_empty() {
            return None;
        }
        Some(Self::from_tag(tag))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Leads => "leads",
            Self::Client => "client",
            Self::Trainer => "trainer",
            Self::Nutritionist => "nutritionist",
            Self::Admin => "admin",
            Self::Hr => "hr",
            Self::Unknown(tag) => tag.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::from_tag(&value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Today,
    Coaching,
    Inbox,
    Metrics,
    Profile,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Coaching => "coaching",
            Self::Inbox => "inbox",
            Self::Metrics => "metrics",
            Self::Profile => "profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewVariant {
    Client,
    Coach,
    Admin,
    Hr,
}

impl ViewVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Coach => "coach",
            Self::Admin => "admin",
            Self::Hr => "hr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescriptor {
    pub feature: Feature,
    pub variant: ViewVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Resolution {
    Loading,
    Restricted { reason: String },
    View(ViewDescriptor),
}

impl Resolution {
    /// `Loading` is the only resolution that may still change once the
    /// session finishes loading.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    pub fn view(&self) -> Option<&ViewDescriptor> {
        match self {
            Self::View(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

// ─── Metrics ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Weight,
    BodyFat,
    MuscleMass,
    Bmi,
    Waist,
    Steps,
    WaterIntake,
    Sleep,
    RestingHeartRate,
    Calories,
}

impl MetricType {
    pub const ALL: [MetricType; 10] = [
        Self::Weight,
        Self::BodyFat,
        Self::MuscleMass,
        Self::Bmi,
        Self::Waist,
        Self::Steps,
        Self::WaterIntake,
        Self::Sleep,
        Self::RestingHeartRate,
        Self::Calories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::BodyFat => "body_fat",
            Self::MuscleMass => "muscle_mass",
            Self::Bmi => "bmi",
            Self::Waist => "waist",
            Self::Steps => "steps",
            Self::WaterIntake => "water_intake",
            Self::Sleep => "sleep",
            Self::RestingHeartRate => "resting_heart_rate",
            Self::Calories => "calories",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.as_str() == value)
    }

    /// Display name, unit and icon used for a metric with no history.
    fn definition(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Weight => ("Weight", "kg", "scale"),
            Self::BodyFat => ("Body Fat", "%", "percent"),
            Self::MuscleMass => ("Muscle Mass", "kg", "dumbbell"),
            Self::Bmi => ("BMI", "kg/m²", "calculator"),
            Self::Waist => ("Waist", "cm", "ruler"),
            Self::Steps => ("Steps", "steps", "footprints"),
            Self::WaterIntake => ("Water Intake", "ml", "droplet"),
            Self::Sleep => ("Sleep", "h", "moon"),
            Self::RestingHeartRate => ("Resting Heart Rate", "bpm", "heart"),
            Self::Calories => ("Calories", "kcal", "flame"),
        }
    }

    pub fn default_metric(self) -> Metric {
        let (name, unit, icon) = self.definition();
        Metric {
            id: self,
            name: name.to_string(),
            unit: unit.to_string(),
            icon: icon.to_string(),
            entries: Vec::new(),
            current_value: None,
            last_updated: None,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub id: String,
    pub value: f64,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: MetricType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub entries: Vec<MetricEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Metric {
    /// Sorts entries by date and points `current_value`/`last_updated` at the
    /// latest-dated entry. Ties keep insertion order, so the later insert wins.
    pub fn normalize(&mut self) {
        self.entries.sort_by(|a, b| a.date.cmp(&b.date));
        match self.entries.last() {
            Some(latest) => {
                self.current_value = Some(latest.value);
                self.last_updated = Some(latest.date);
            }
            None => {
                self.current_value = None;
                self.last_updated = None;
            }
        }
    }

    /// Fills blank name, unit or icon from the built-in definition.
    pub fn fill_definition_gaps(&mut self) {
        let (name, unit, icon) = self.id.definition();
        for (field, fallback) in [(&mut self.name, name), (&mut self.unit, unit), (&mut self.icon, icon)] {
            if field.trim().is_empty() {
                *field = fallback.to_string();
            }
        }
    }

    pub fn first_entry(&self) -> Option<&MetricEntry> {
        self.entries.iter().min_by(|a, b| a.date.cmp(&b.date))
    }
}

/// Every known metric, keyed by type. Only constructible with the full set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricData(BTreeMap<MetricType, Metric>);

impl MetricData {
    pub fn defaults() -> Self {
        Self(
            MetricType::ALL
                .into_iter()
                .map(|metric| (metric, metric.default_metric()))
                .collect(),
        )
    }

    pub fn get(&self, metric: MetricType) -> Option<&Metric> {
        self.0.get(&metric)
    }

    pub fn insert(&mut self, metric: MetricType, value: Metric) {
        self.0.insert(metric, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricType, &Metric)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTrend {
    pub metric: MetricType,
    pub first_value: Option<f64>,
    pub current_value: Option<f64>,
    pub change: Option<f64>,
    pub entry_count: usize,
}

// ─── Goals & Profile ────────────────────────────────────────────────────────

/// Mirrors a row of the remote `goals` table, so fields keep the backend's
/// snake_case column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub metric: MetricType,
    pub target_value: f64,
    #[serde(default)]
    pub start_value: Option<f64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub user_id: String,
    pub metric: MetricType,
    pub target_value: f64,
    pub start_value: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub goal: Goal,
    pub current_value: Option<f64>,
    pub progress: Option<f64>,
    pub achieved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Ios,
    Android,
    Web,
}

impl DevicePlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: String,
    pub token: String,
    pub platform: DevicePlatform,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type Result<T> = anyhow::Result<T>;
pub type LeaderboardResult<T> = std::result::Result<T, LeaderboardError>;

/// Current on-disk layout of the leaderboard database.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_ENTRY_TITLE: &str = "Unnamed Benchmark";

// Performance metrics every analysis summary must carry.
pub const METRIC_AVG_RESPONSE_TIME: &str = "avg_response_time";
pub const METRIC_API_SUCCESS_RATE: &str = "api_success_rate";
pub const METRIC_EXECUTION_SUCCESS_RATE: &str = "execution_success_rate";
pub const METRIC_TEST_PASS_RATE: &str = "test_pass_rate";

pub const REQUIRED_METRICS: [&str; 4] = [
    METRIC_AVG_RESPONSE_TIME,
    METRIC_API_SUCCESS_RATE,
    METRIC_EXECUTION_SUCCESS_RATE,
    METRIC_TEST_PASS_RATE,
];

// Resource metrics attached to an entry by the resource monitor.
pub const RESOURCE_CPU_AVG_PERCENT: &str = "cpu_avg_percent";
pub const RESOURCE_CPU_MAX_PERCENT: &str = "cpu_max_percent";
pub const RESOURCE_MEMORY_AVG_GB: &str = "memory_avg_gb";
pub const RESOURCE_MEMORY_PEAK_GB: &str = "memory_peak_gb";
pub const RESOURCE_GPU_AVG_UTILIZATION: &str = "gpu_avg_utilization";
pub const RESOURCE_GPU_MAX_UTILIZATION: &str = "gpu_max_utilization";

// Well-known model metadata keys. Metadata stays free-form.
pub const META_PARAMETERS: &str = "parameters";
pub const META_VERSION: &str = "version";
pub const META_ARCHITECTURE: &str = "architecture";
pub const META_QUANTIZATION: &str = "quantization";

pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".benchboard")
}

/// Rates are reported as fractions by the analysis pipeline and stored as
/// percentages.
pub fn is_rate_metric(metric: &str) -> bool {
    metric.ends_with("_rate")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

pub fn metric_direction(metric: &str) -> MetricDirection {
    match metric {
        METRIC_AVG_RESPONSE_TIME
        | RESOURCE_CPU_AVG_PERCENT
        | RESOURCE_CPU_MAX_PERCENT
        | RESOURCE_MEMORY_AVG_GB
        | RESOURCE_MEMORY_PEAK_GB => MetricDirection::LowerIsBetter,
        _ => MetricDirection::HigherIsBetter,
    }
}

pub type MetricMap = BTreeMap<String, f64>;

/// Free-form model metadata (parameters, version, architecture, ...).
pub type ModelInfo = serde_json::Map<String, serde_json::Value>;

#[derive(thiserror::Error, Debug)]
pub enum LeaderboardError {
    #[error("leaderboard store {} is corrupt: {reason}", .path.display())]
    StoreCorrupt { path: PathBuf, reason: String },
    #[error("analysis file not found: {}", .0.display())]
    AnalysisSourceNotFound(PathBuf),
    #[error("invalid analysis summary in {source_ref}: {reason}")]
    AnalysisParse { source_ref: String, reason: String },
    #[error("leaderboard entry not found: {0}")]
    EntryNotFound(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("comparison needs at least two distinct models, got {0}")]
    InsufficientModels(usize),
    #[error("leaderboard store {} was modified by another writer since it was loaded", .path.display())]
    ConcurrentModification { path: PathBuf },
    #[error("leaderboard I/O failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LeaderboardError {
    pub fn parse(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AnalysisParse {
            source_ref: source_ref.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-bucket metric maps keyed by category, difficulty and language.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Breakdowns {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_category: BTreeMap<String, MetricMap>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_difficulty: BTreeMap<String, MetricMap>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_language: BTreeMap<String, MetricMap>,
}

impl Breakdowns {
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty() && self.by_difficulty.is_empty() && self.by_language.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub id: String,
    pub model_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_entry_title")]
    pub title: String,
    pub metrics: MetricMap,
    #[serde(default, skip_serializing_if = "Breakdowns::is_empty")]
    pub breakdowns: Breakdowns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_metrics: Option<MetricMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
    pub source_ref: String,
}

fn default_entry_title() -> String {
    DEFAULT_ENTRY_TITLE.to_string()
}

impl Entry {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn resource_metric(&self, name: &str) -> Option<f64> {
        self.resource_metrics.as_ref()?.get(name).copied()
    }

    /// Looks `name` up among performance metrics first, then resource metrics.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.metric(name).or_else(|| self.resource_metric(name))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

impl Aggregate {
    /// `None` for an empty input.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for value in values {
            count += 1;
            sum += value;
            max = max.max(value);
            min = min.min(value);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            mean: sum / count as f64,
            max,
            min,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub metadata: ModelInfo,
    #[serde(default)]
    pub aggregates: BTreeMap<String, Aggregate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_aggregates: BTreeMap<String, Aggregate>,
    pub entry_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Model {
    /// Mean of a performance metric, falling back to resource metrics.
    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.aggregates
            .get(metric)
            .or_else(|| self.resource_aggregates.get(metric))
            .map(|agg| agg.mean)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Database {
    pub schema_version: u32,
    pub last_updated: DateTime<Utc>,
    pub entries: Vec<Entry>,
    pub models: BTreeMap<String, Model>,
}

impl Database {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_updated: Utc::now(),
            entries: Vec::new(),
            models: BTreeMap::new(),
        }
    }

    pub fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entries_for<'a>(&'a self, model_name: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.model_name == model_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Directory holding the database; relative paths resolve against the workspace.
    pub leaderboard_dir: String,
    pub db_file: String,
    pub default_metric: String,
    pub top_n: usize,
    pub report_metrics: Vec<String>,
    pub history_metrics: Vec<String>,
    pub comparison_metrics: Vec<String>,
    pub verbose: bool,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        let standard: Vec<String> = [
            METRIC_TEST_PASS_RATE,
            METRIC_API_SUCCESS_RATE,
            METRIC_EXECUTION_SUCCESS_RATE,
            METRIC_AVG_RESPONSE_TIME,
        ]
        .iter()
        .map(|m| m.to_string())
        .collect();
        Self {
            leaderboard_dir: "benchmark_results/leaderboard".to_string(),
            db_file: "leaderboard_db.json".to_string(),
            default_metric: METRIC_TEST_PASS_RATE.to_string(),
            top_n: 10,
            report_metrics: standard.clone(),
            history_metrics: vec![
                METRIC_TEST_PASS_RATE.to_string(),
                METRIC_API_SUCCESS_RATE.to_string(),
            ],
            comparison_metrics: standard,
            verbose: false,
        }
    }
}

impl LeaderboardConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        let home = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())?;
        Some(Path::new(&home).join(".benchboard/settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    pub fn legacy_toml_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    /// Layers, lowest first: defaults, legacy TOML, user, project, project-local.
    pub fn load(workspace: &Path) -> Result<Self> {
        Self::load_with_user_settings(workspace, Self::user_settings_path().as_deref())
    }

    /// [`LeaderboardConfig::load`] with an explicit user settings file, or none.
    pub fn load_with_user_settings(workspace: &Path, user_settings: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let legacy = Self::legacy_toml_path(workspace);
        if legacy.exists() {
            let raw = fs::read_to_string(legacy)?;
            let legacy_cfg: LeaderboardConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(legacy_cfg)?);
        }

        let mut paths = Vec::new();
        if let Some(user) = user_settings {
            paths.push(user.to_path_buf());
        }
        paths.push(Self::project_settings_path(workspace));
        paths.push(Self::project_local_settings_path(workspace));

        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            merge_json_value(&mut merged, &value);
        }

        Ok(serde_json::from_value(merged)?)
    }

    pub fn ensure(workspace: &Path) -> Result<Self> {
        Self::ensure_with_user_settings(workspace, Self::user_settings_path().as_deref())
    }

    pub fn ensure_with_user_settings(
        workspace: &Path,
        user_settings: Option<&Path>,
    ) -> Result<Self> {
        let path = Self::project_settings_path(workspace);
        if path.exists()
            || Self::project_local_settings_path(workspace).exists()
            || Self::legacy_toml_path(workspace).exists()
            || user_settings.is_some_and(|p| p.exists())
        {
            return Self::load_with_user_settings(workspace, user_settings);
        }
        let cfg = Self::default();
        cfg.save(workspace)?;
        Ok(cfg)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::project_settings_path(workspace);
        fs::create_dir_all(
            path.parent()
                .ok_or_else(|| anyhow::anyhow!("invalid config path"))?,
        )?;
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn db_path(&self, workspace: &Path) -> PathBuf {
        let dir = Path::new(&self.leaderboard_dir);
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            workspace.join(dir)
        };
        dir.join(&self.db_file)
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

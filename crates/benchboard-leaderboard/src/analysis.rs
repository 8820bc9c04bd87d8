//! Ingestion of analysis summaries written by the benchmark pipeline.
//!
//! An analysis document looks like
//! `{"title": "...", "summary": {...}, "resource_metrics": {...}}`. Rates in
//! the summary are fractions in `[0, 1]` and are stored as percentages.

use benchboard_core::{
    Breakdowns, LeaderboardError, LeaderboardResult, MetricMap, REQUIRED_METRICS,
    RESOURCE_CPU_AVG_PERCENT, RESOURCE_CPU_MAX_PERCENT, RESOURCE_GPU_AVG_UTILIZATION,
    RESOURCE_GPU_MAX_UTILIZATION, RESOURCE_MEMORY_AVG_GB, RESOURCE_MEMORY_PEAK_GB,
    is_rate_metric,
};
use benchboard_observe::Observer;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const BREAKDOWN_KEYS: [&str; 3] = ["by_category", "by_difficulty", "by_language"];
const RESOURCE_KEY: &str = "resource_metrics";

/// A validated analysis summary, ready to become an entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisSummary {
    pub title: Option<String>,
    pub metrics: MetricMap,
    pub breakdowns: Breakdowns,
    pub resource_metrics: Option<MetricMap>,
}

impl AnalysisSummary {
    pub fn from_value(doc: &Value, source_ref: &str) -> LeaderboardResult<Self> {
        let fail = |reason: String| LeaderboardError::parse(source_ref, reason);

        let doc = doc
            .as_object()
            .ok_or_else(|| fail("analysis must be a JSON object".to_string()))?;
        let summary = doc
            .get("summary")
            .ok_or_else(|| fail("missing `summary`".to_string()))?
            .as_object()
            .ok_or_else(|| fail("`summary` must be an object".to_string()))?;

        let title = match doc.get("title") {
            None | Some(Value::Null) => None,
            Some(Value::String(title)) => Some(title.clone()),
            Some(_) => return Err(fail("`title` must be a string".to_string())),
        };

        for required in REQUIRED_METRICS {
            match summary.get(required) {
                None => return Err(fail(format!("missing required metric `{required}`"))),
                Some(value) if !value.is_number() => {
                    return Err(fail(format!("metric `{required}` must be numeric")));
                }
                Some(_) => {}
            }
        }

        let mut metrics = MetricMap::new();
        for (key, value) in summary {
            if BREAKDOWN_KEYS.contains(&key.as_str()) || key == RESOURCE_KEY {
                continue;
            }
            // Counters and labels that are not numbers are informational only.
            let Some(raw) = value.as_f64() else {
                continue;
            };
            metrics.insert(key.clone(), normalize_metric(key, raw).map_err(&fail)?);
        }

        let breakdowns = Breakdowns {
            by_category: parse_breakdown(summary, "by_category").map_err(&fail)?,
            by_difficulty: parse_breakdown(summary, "by_difficulty").map_err(&fail)?,
            by_language: parse_breakdown(summary, "by_language").map_err(&fail)?,
        };

        let resource_metrics = match doc.get(RESOURCE_KEY).or_else(|| summary.get(RESOURCE_KEY)) {
            None | Some(Value::Null) => None,
            Some(value) => parse_resource_map(value).map_err(&fail)?,
        };

        Ok(Self {
            title,
            metrics,
            breakdowns,
            resource_metrics,
        })
    }

    /// Re-checks invariants for summaries built by hand rather than parsed.
    pub fn validate(&self, source_ref: &str) -> LeaderboardResult<()> {
        let fail = |reason: String| LeaderboardError::parse(source_ref, reason);
        for required in REQUIRED_METRICS {
            if !self.metrics.contains_key(required) {
                return Err(fail(format!("missing required metric `{required}`")));
            }
        }
        let bucket_maps = self
            .breakdowns
            .by_category
            .values()
            .chain(self.breakdowns.by_difficulty.values())
            .chain(self.breakdowns.by_language.values());
        for map in std::iter::once(&self.metrics)
            .chain(self.resource_metrics.as_ref())
            .chain(bucket_maps)
        {
            for (key, value) in map {
                if !value.is_finite() || *value < 0.0 {
                    return Err(fail(format!(
                        "metric `{key}` must be a finite non-negative number, got {value}"
                    )));
                }
                if is_rate_metric(key) && *value > 100.0 {
                    return Err(fail(format!(
                        "rate `{key}` must be a percentage in [0, 100], got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Reads and validates the analysis file at `path`, attaching resource
/// metrics from the monitor's companion file when the analysis has none.
pub fn load_analysis(path: &Path, observer: &Observer) -> LeaderboardResult<AnalysisSummary> {
    let source_ref = path.to_string_lossy().to_string();
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(LeaderboardError::AnalysisSourceNotFound(path.to_path_buf()));
        }
        Err(err) => return Err(LeaderboardError::io(path, err)),
    };
    let doc: Value = serde_json::from_slice(&raw)
        .map_err(|err| LeaderboardError::parse(&source_ref, format!("invalid JSON: {err}")))?;
    let mut summary = AnalysisSummary::from_value(&doc, &source_ref)?;

    if summary.resource_metrics.is_none() {
        let companion = resource_companion_path(path);
        if companion.exists() {
            match read_monitor_file(&companion) {
                Some(metrics) => summary.resource_metrics = Some(metrics),
                None => observer.warn_log(&format!(
                    "found resource metrics file but couldn't parse it: {}",
                    companion.display()
                )),
            }
        }
    }
    Ok(summary)
}

/// `runs/analysis_demo.json` pairs with `runs/demo_resources.json`.
pub fn resource_companion_path(analysis_path: &Path) -> PathBuf {
    let stem = analysis_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().replace("analysis_", ""))
        .unwrap_or_default();
    analysis_path.with_file_name(format!("{stem}_resources.json"))
}

fn normalize_metric(key: &str, raw: f64) -> Result<f64, String> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(format!(
            "metric `{key}` must be a finite non-negative number, got {raw}"
        ));
    }
    if is_rate_metric(key) {
        if raw > 1.0 {
            return Err(format!("rate `{key}` must be a fraction in [0, 1], got {raw}"));
        }
        return Ok(raw * 100.0);
    }
    Ok(raw)
}

fn parse_breakdown(
    summary: &Map<String, Value>,
    key: &str,
) -> Result<BTreeMap<String, MetricMap>, String> {
    let buckets = match summary.get(key) {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(buckets)) => buckets,
        Some(_) => return Err(format!("`{key}` must be an object")),
    };
    let mut out = BTreeMap::new();
    for (bucket, values) in buckets {
        let values = values
            .as_object()
            .ok_or_else(|| format!("`{key}.{bucket}` must be an object"))?;
        let mut metrics = MetricMap::new();
        for (metric, value) in values {
            if let Some(raw) = value.as_f64() {
                metrics.insert(metric.clone(), normalize_metric(metric, raw)?);
            }
        }
        out.insert(bucket.clone(), metrics);
    }
    Ok(out)
}

fn parse_resource_map(value: &Value) -> Result<Option<MetricMap>, String> {
    let fields = value
        .as_object()
        .ok_or_else(|| format!("`{RESOURCE_KEY}` must be an object"))?;
    let mut out = MetricMap::new();
    for (key, value) in fields {
        let raw = value
            .as_f64()
            .ok_or_else(|| format!("resource metric `{key}` must be numeric"))?;
        if raw < 0.0 {
            return Err(format!("resource metric `{key}` must not be negative"));
        }
        out.insert(key.clone(), raw);
    }
    Ok((!out.is_empty()).then_some(out))
}

fn read_monitor_file(path: &Path) -> Option<MetricMap> {
    let raw = fs::read(path).ok()?;
    let doc: Value = serde_json::from_slice(&raw).ok()?;
    parse_monitor_stats(&doc)
}

/// Flattens resource-monitor statistics (`cpu.percent.mean`, ...) into
/// entry resource metrics. GPU figures come from `gpu.utilization` or the
/// first device listed under `gpu.devices`.
fn parse_monitor_stats(doc: &Value) -> Option<MetricMap> {
    let stat = |pointer: &str| doc.pointer(pointer).and_then(usable_stat);
    let mut out = MetricMap::new();
    out.insert(RESOURCE_CPU_AVG_PERCENT.to_string(), stat("/cpu/percent/mean")?);
    out.insert(RESOURCE_CPU_MAX_PERCENT.to_string(), stat("/cpu/percent/max")?);
    out.insert(RESOURCE_MEMORY_AVG_GB.to_string(), stat("/memory/used_gb/mean")?);
    out.insert(RESOURCE_MEMORY_PEAK_GB.to_string(), stat("/memory/used_gb/max")?);

    let gpu = doc.get("gpu");
    let utilization = gpu.and_then(|gpu| gpu.get("utilization")).or_else(|| {
        gpu.and_then(|gpu| gpu.get("devices"))
            .and_then(Value::as_object)
            .and_then(|devices| devices.values().next())
            .and_then(|device| device.get("utilization"))
    });
    if let Some(utilization) = utilization {
        let mean = utilization.get("mean").and_then(usable_stat);
        let max = utilization.get("max").and_then(usable_stat);
        if let (Some(mean), Some(max)) = (mean, max) {
            out.insert(RESOURCE_GPU_AVG_UTILIZATION.to_string(), mean);
            out.insert(RESOURCE_GPU_MAX_UTILIZATION.to_string(), max);
        }
    }
    Some(out)
}

fn usable_stat(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite() && *v >= 0.0)
}

use benchboard_core::{Database, LeaderboardError, LeaderboardResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One run of a model in time order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub entry_id: String,
    pub values: BTreeMap<String, Option<f64>>,
}

impl HistoryPoint {
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied().flatten()
    }
}

pub(crate) fn model_history(
    db: &Database,
    model_name: &str,
    metrics: &[&str],
) -> LeaderboardResult<Vec<HistoryPoint>> {
    let mut points: Vec<HistoryPoint> = db
        .entries_for(model_name)
        .map(|entry| HistoryPoint {
            timestamp: entry.timestamp,
            entry_id: entry.id.clone(),
            values: metrics
                .iter()
                .map(|metric| (metric.to_string(), entry.value(metric)))
                .collect(),
        })
        .collect();
    if points.is_empty() {
        return Err(LeaderboardError::UnknownModel(model_name.to_string()));
    }
    points.sort_by_key(|point| point.timestamp);
    Ok(points)
}

use benchboard_core::{
    Database, LeaderboardError, LeaderboardResult, MetricDirection, metric_direction,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Performance,
    Resource,
}

/// Raw means for one metric across the compared models; `None` where a
/// model never reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub metric: String,
    pub kind: MetricKind,
    pub direction: MetricDirection,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonMatrix {
    /// Requested order, duplicates removed.
    pub models: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonMatrix {
    pub fn row(&self, metric: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|row| row.metric == metric)
    }

    pub fn value(&self, metric: &str, model: &str) -> Option<f64> {
        self.row(metric)?.values.get(model).copied().flatten()
    }
}

pub(crate) fn compare_models(
    db: &Database,
    model_names: &[&str],
    metrics: &[&str],
    resource_metrics: &[&str],
) -> LeaderboardResult<ComparisonMatrix> {
    let mut models: Vec<String> = Vec::new();
    for name in model_names {
        if !db.models.contains_key(*name) {
            return Err(LeaderboardError::UnknownModel(name.to_string()));
        }
        if !models.iter().any(|seen| seen == name) {
            models.push(name.to_string());
        }
    }
    if models.len() < 2 {
        return Err(LeaderboardError::InsufficientModels(models.len()));
    }

    let row = |metric: &str, kind: MetricKind| {
        let values = models
            .iter()
            .map(|name| {
                let aggregates = db.models.get(name).map(|model| match kind {
                    MetricKind::Performance => &model.aggregates,
                    MetricKind::Resource => &model.resource_aggregates,
                });
                let mean = aggregates
                    .and_then(|aggregates| aggregates.get(metric))
                    .map(|agg| agg.mean);
                (name.clone(), mean)
            })
            .collect();
        ComparisonRow {
            metric: metric.to_string(),
            kind,
            direction: metric_direction(metric),
            values,
        }
    };

    let rows = metrics
        .iter()
        .map(|metric| row(*metric, MetricKind::Performance))
        .chain(
            resource_metrics
                .iter()
                .map(|metric| row(*metric, MetricKind::Resource)),
        )
        .collect();
    Ok(ComparisonMatrix { models, rows })
}

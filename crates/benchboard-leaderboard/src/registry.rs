//! Per-model aggregates. Models are a cache derived from the entry list and
//! are rebuilt from it after every mutation.

use crate::query::{apply_limit, cmp_present_desc};
use benchboard_core::{Aggregate, Database, Entry, MetricMap, Model, ModelInfo};
use std::collections::{BTreeMap, BTreeSet};

/// Rebuilds (or removes) the model record for `model_name`, keeping its metadata.
pub(crate) fn recompute(db: &mut Database, model_name: &str) {
    let rebuilt = {
        let entries: Vec<&Entry> = db.entries_for(model_name).collect();
        let first_seen = entries.iter().map(|e| e.timestamp).min();
        let last_seen = entries.iter().map(|e| e.timestamp).max();
        match (first_seen, last_seen) {
            (Some(first_seen), Some(last_seen)) => Some(Model {
                name: model_name.to_string(),
                metadata: db
                    .models
                    .get(model_name)
                    .map(|model| model.metadata.clone())
                    .unwrap_or_default(),
                aggregates: aggregate_by(&entries, |entry| Some(&entry.metrics)),
                resource_aggregates: aggregate_by(&entries, |entry| {
                    entry.resource_metrics.as_ref()
                }),
                entry_count: entries.len(),
                first_seen,
                last_seen,
            }),
            _ => None,
        }
    };
    match rebuilt {
        Some(model) => {
            db.models.insert(model_name.to_string(), model);
        }
        None => {
            db.models.remove(model_name);
        }
    }
}

/// Brings every model in line with the entry list, dropping orphans.
pub(crate) fn recompute_all(db: &mut Database) {
    let names: BTreeSet<String> = db
        .entries
        .iter()
        .map(|entry| entry.model_name.clone())
        .chain(db.models.keys().cloned())
        .collect();
    for name in names {
        recompute(db, &name);
    }
}

/// Field-wise overwrite; `null` in `info` never clears an existing value.
pub(crate) fn merge_metadata(metadata: &mut ModelInfo, info: &ModelInfo) {
    for (key, value) in info {
        if !value.is_null() {
            metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Descending by the metric's mean; ties by entry count (desc) then name.
/// Models without the metric go last.
pub(crate) fn list_models<'a>(
    db: &'a Database,
    sort_metric: &str,
    limit: Option<usize>,
) -> Vec<&'a Model> {
    let mut models: Vec<&Model> = db.models.values().collect();
    models.sort_by(|a, b| {
        cmp_present_desc(a.mean(sort_metric), b.mean(sort_metric))
            .then_with(|| b.entry_count.cmp(&a.entry_count))
            .then_with(|| a.name.cmp(&b.name))
    });
    apply_limit(&mut models, limit);
    models
}

fn aggregate_by<'a>(
    entries: &[&'a Entry],
    pick: impl Fn(&'a Entry) -> Option<&'a MetricMap>,
) -> BTreeMap<String, Aggregate> {
    let mut samples: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for &entry in entries {
        let Some(metrics) = pick(entry) else {
            continue;
        };
        for (metric, value) in metrics {
            samples.entry(metric.as_str()).or_default().push(*value);
        }
    }
    samples
        .into_iter()
        .filter_map(|(metric, values)| {
            Aggregate::from_values(values).map(|agg| (metric.to_string(), agg))
        })
        .collect()
}

//! Entry listing and resource rankings.

use benchboard_core::{Database, Entry, MetricDirection, metric_direction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Conjunctive entry filter. Unset fields match everything; bucket filters
/// match entries whose breakdown has that bucket. Dates are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub model_name: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl EntryFilter {
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        let day = entry.timestamp.date_naive();
        self.model_name
            .as_ref()
            .is_none_or(|name| &entry.model_name == name)
            && self
                .category
                .as_ref()
                .is_none_or(|c| entry.breakdowns.by_category.contains_key(c))
            && self
                .difficulty
                .as_ref()
                .is_none_or(|d| entry.breakdowns.by_difficulty.contains_key(d))
            && self
                .language
                .as_ref()
                .is_none_or(|l| entry.breakdowns.by_language.contains_key(l))
            && self.since.is_none_or(|since| day >= since)
            && self.until.is_none_or(|until| day <= until)
    }
}

/// One row of a resource-usage ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRanking {
    pub entry_id: String,
    pub model_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Filtered entries, descending by `sort_metric` (performance metrics first,
/// then resource metrics; missing last), then newest first, then insertion order.
pub(crate) fn list_entries<'a>(
    db: &'a Database,
    sort_metric: &str,
    limit: Option<usize>,
    filter: &EntryFilter,
) -> Vec<&'a Entry> {
    let mut hits: Vec<(usize, &Entry)> = db
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| filter.matches(entry))
        .collect();
    hits.sort_by(|(ia, a), (ib, b)| {
        cmp_present_desc(a.value(sort_metric), b.value(sort_metric))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| ia.cmp(ib))
    });
    let mut entries: Vec<&Entry> = hits.into_iter().map(|(_, entry)| entry).collect();
    apply_limit(&mut entries, limit);
    entries
}

/// Entries carrying resource metric `metric`, best first for its direction.
pub(crate) fn rank_resource_usage(
    db: &Database,
    metric: &str,
    limit: Option<usize>,
) -> Vec<ResourceRanking> {
    let direction = metric_direction(metric);
    let mut ranked: Vec<ResourceRanking> = db
        .entries
        .iter()
        .filter_map(|entry| {
            entry.resource_metric(metric).map(|value| ResourceRanking {
                entry_id: entry.id.clone(),
                model_name: entry.model_name.clone(),
                timestamp: entry.timestamp,
                value,
            })
        })
        .collect();
    // Stable sort keeps insertion order among ties.
    ranked.sort_by(|a, b| match direction {
        MetricDirection::LowerIsBetter => a.value.total_cmp(&b.value),
        MetricDirection::HigherIsBetter => b.value.total_cmp(&a.value),
    });
    apply_limit(&mut ranked, limit);
    ranked
}

/// Descending order with `None` after every present value.
pub(crate) fn cmp_present_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `None` and `Some(0)` leave the list untouched.
pub(crate) fn apply_limit<T>(items: &mut Vec<T>, limit: Option<usize>) {
    if let Some(limit) = limit.filter(|limit| *limit > 0) {
        items.truncate(limit);
    }
}

use crate::registry::list_models;
use benchboard_core::{Database, ModelInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Structured leaderboard snapshot; rendering is left to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardReport {
    pub generated_at: DateTime<Utc>,
    pub sort_metric: String,
    pub display_metrics: Vec<String>,
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// 1-based.
    pub rank: usize,
    pub model: String,
    pub metrics: BTreeMap<String, Option<f64>>,
    pub entry_count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub metadata: ModelInfo,
}

pub(crate) fn build_report(
    db: &Database,
    sort_metric: &str,
    top_n: usize,
    display_metrics: &[String],
    generated_at: DateTime<Utc>,
) -> LeaderboardReport {
    let rows = list_models(db, sort_metric, Some(top_n))
        .into_iter()
        .enumerate()
        .map(|(index, model)| ReportRow {
            rank: index + 1,
            model: model.name.clone(),
            metrics: display_metrics
                .iter()
                .map(|metric| (metric.clone(), model.mean(metric)))
                .collect(),
            entry_count: model.entry_count,
            first_seen: model.first_seen,
            last_seen: model.last_seen,
            metadata: model.metadata.clone(),
        })
        .collect();
    LeaderboardReport {
        generated_at,
        sort_metric: sort_metric.to_string(),
        display_metrics: display_metrics.to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assert_close, database_with};
    use chrono::TimeZone;

    fn metrics() -> Vec<String> {
        vec!["test_pass_rate".to_string(), "bleu".to_string()]
    }

    #[test]
    fn rows_follow_ranking_and_are_numbered() {
        let db = database_with(&[("A", 80.0), ("A", 90.0), ("B", 70.0), ("C", 95.0)]);
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).single().expect("time");
        let report = build_report(&db, "test_pass_rate", 2, &metrics(), at);

        assert_eq!(report.generated_at, at);
        assert_eq!(report.sort_metric, "test_pass_rate");
        assert_eq!(report.display_metrics, metrics());
        assert_eq!(report.rows.len(), 2);
        assert_eq!((report.rows[0].rank, report.rows[0].model.as_str()), (1, "C"));
        assert_eq!((report.rows[1].rank, report.rows[1].model.as_str()), (2, "A"));
        assert_close(
            report.rows[1].metrics["test_pass_rate"].expect("mean"),
            85.0,
        );
        assert_eq!(report.rows[1].metrics["bleu"], None);
        assert_eq!(report.rows[1].entry_count, 2);
    }

    #[test]
    fn same_state_and_time_give_identical_reports() {
        let db = database_with(&[("A", 80.0), ("B", 80.0)]);
        let at = Utc::now();
        let first = build_report(&db, "test_pass_rate", 10, &metrics(), at);
        let second = build_report(&db, "test_pass_rate", 10, &metrics(), at);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }

    #[test]
    fn empty_database_gives_empty_rows() {
        let report = build_report(&Database::empty(), "test_pass_rate", 10, &metrics(), Utc::now());
        assert!(report.rows.is_empty());
    }
}

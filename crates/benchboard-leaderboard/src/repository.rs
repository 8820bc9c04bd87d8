use crate::analysis::AnalysisSummary;
use crate::registry::{merge_metadata, recompute};
use benchboard_core::{
    DEFAULT_ENTRY_TITLE, Database, Entry, LeaderboardError, LeaderboardResult, ModelInfo,
};
use chrono::{DateTime, Utc};

/// Appends an entry built from `summary` and refreshes the owning model.
/// Returns the new entry id.
pub(crate) fn insert_entry(
    db: &mut Database,
    summary: AnalysisSummary,
    source_ref: &str,
    model_name: &str,
    model_info: Option<ModelInfo>,
    now: DateTime<Utc>,
) -> LeaderboardResult<String> {
    let model_name = model_name.trim();
    if model_name.is_empty() {
        return Err(LeaderboardError::parse(
            source_ref,
            "model name must not be empty",
        ));
    }
    summary.validate(source_ref)?;

    let id = next_entry_id(db, now);
    db.entries.push(Entry {
        id: id.clone(),
        model_name: model_name.to_string(),
        timestamp: now,
        title: summary
            .title
            .unwrap_or_else(|| DEFAULT_ENTRY_TITLE.to_string()),
        metrics: summary.metrics,
        breakdowns: summary.breakdowns,
        resource_metrics: summary.resource_metrics,
        model_info: model_info.clone(),
        source_ref: source_ref.to_string(),
    });
    recompute(db, model_name);

    if let Some(info) = model_info
        && let Some(model) = db.models.get_mut(model_name)
    {
        merge_metadata(&mut model.metadata, &info);
    }
    Ok(id)
}

/// Removes the entry and refreshes (or drops) its model.
pub(crate) fn remove_entry(db: &mut Database, entry_id: &str) -> LeaderboardResult<Entry> {
    let index = db
        .entries
        .iter()
        .position(|entry| entry.id == entry_id)
        .ok_or_else(|| LeaderboardError::EntryNotFound(entry_id.to_string()))?;
    let removed = db.entries.remove(index);
    recompute(db, &removed.model_name);
    Ok(removed)
}

pub(crate) fn find_entry<'a>(db: &'a Database, entry_id: &str) -> LeaderboardResult<&'a Entry> {
    db.entry(entry_id)
        .ok_or_else(|| LeaderboardError::EntryNotFound(entry_id.to_string()))
}

// `entry_<unix seconds>`, suffixed `_<n>` when several land in the same second.
fn next_entry_id(db: &Database, now: DateTime<Utc>) -> String {
    let base = format!("entry_{}", now.timestamp());
    if db.entry(&base).is_none() {
        return base;
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| db.entry(candidate).is_none())
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::summary_with_pass_rate;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("timestamp")
    }

    #[test]
    fn ids_are_unique_within_the_same_second() {
        let mut db = Database::empty();
        let now = at(1_700_000_000);
        let first = insert_entry(&mut db, summary_with_pass_rate(80.0), "a.json", "A", None, now)
            .expect("first");
        let second = insert_entry(&mut db, summary_with_pass_rate(90.0), "b.json", "A", None, now)
            .expect("second");
        let third = insert_entry(&mut db, summary_with_pass_rate(70.0), "c.json", "B", None, now)
            .expect("third");
        assert_eq!(first, "entry_1700000000");
        assert_eq!(second, "entry_1700000000_1");
        assert_eq!(third, "entry_1700000000_2");
    }

    #[test]
    fn entry_carries_title_source_and_info() {
        let mut db = Database::empty();
        let mut summary = summary_with_pass_rate(80.0);
        summary.title = Some("Nightly".to_string());
        let info = json!({"parameters": "7B"}).as_object().cloned();
        let id = insert_entry(&mut db, summary, "runs/a.json", "A", info, at(10)).expect("insert");

        let entry = find_entry(&db, &id).expect("entry");
        assert_eq!(entry.title, "Nightly");
        assert_eq!(entry.source_ref, "runs/a.json");
        assert_eq!(entry.timestamp, at(10));
        assert_eq!(
            entry.model_info.as_ref().expect("info")["parameters"],
            json!("7B")
        );
        assert_eq!(db.models["A"].metadata["parameters"], json!("7B"));
    }

    #[test]
    fn untitled_summary_gets_default_title() {
        let mut db = Database::empty();
        let id = insert_entry(&mut db, summary_with_pass_rate(80.0), "a.json", "A", None, at(1))
            .expect("insert");
        assert_eq!(find_entry(&db, &id).expect("entry").title, DEFAULT_ENTRY_TITLE);
    }

    #[test]
    fn blank_model_name_is_rejected() {
        let mut db = Database::empty();
        let err = insert_entry(&mut db, summary_with_pass_rate(80.0), "a.json", "  ", None, at(1))
            .expect_err("blank");
        assert!(matches!(err, LeaderboardError::AnalysisParse { .. }));
        assert!(db.entries.is_empty());
    }

    #[test]
    fn invalid_summary_leaves_database_untouched() {
        let mut db = Database::empty();
        let mut summary = summary_with_pass_rate(80.0);
        summary.metrics.remove("api_success_rate");
        assert!(insert_entry(&mut db, summary, "a.json", "A", None, at(1)).is_err());
        assert!(db.entries.is_empty());
        assert!(db.models.is_empty());
    }

    #[test]
    fn removing_unknown_entry_fails() {
        let mut db = Database::empty();
        assert!(matches!(
            remove_entry(&mut db, "entry_404"),
            Err(LeaderboardError::EntryNotFound(id)) if id == "entry_404"
        ));
    }

    #[test]
    fn removing_last_entry_drops_the_model() {
        let mut db = Database::empty();
        let id = insert_entry(&mut db, summary_with_pass_rate(80.0), "a.json", "A", None, at(1))
            .expect("insert");
        let removed = remove_entry(&mut db, &id).expect("remove");
        assert_eq!(removed.model_name, "A");
        assert!(db.models.is_empty());
        assert!(find_entry(&db, &id).is_err());
    }
}

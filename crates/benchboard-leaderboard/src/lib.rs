mod analysis;
mod compare;
mod history;
mod query;
mod registry;
mod report;
mod repository;

pub use analysis::{AnalysisSummary, load_analysis, resource_companion_path};
pub use benchboard_core::{
    Database, Entry, LeaderboardConfig, LeaderboardError, LeaderboardResult, Model, ModelInfo,
};
pub use compare::{ComparisonMatrix, ComparisonRow, MetricKind};
pub use history::HistoryPoint;
pub use query::{EntryFilter, ResourceRanking};
pub use report::{LeaderboardReport, ReportRow};

use anyhow::Result;
use benchboard_observe::{Mutation, Observer};
use benchboard_store::Store;
use chrono::{DateTime, Utc};
use std::path::Path;

/// The leaderboard engine: one store, its loaded database and the observer.
///
/// Every mutation runs against a copy of the database and replaces the
/// in-memory state only after the store has persisted it, so a failed save
/// leaves both disk and memory as they were.
pub struct Leaderboard {
    config: LeaderboardConfig,
    store: Store,
    db: Database,
    observer: Observer,
}

impl Leaderboard {
    /// Opens the database configured for `workspace`, creating nothing until
    /// the first mutation.
    pub fn open(workspace: &Path, config: LeaderboardConfig) -> LeaderboardResult<Self> {
        let observer = workspace_observer(workspace, config.verbose);
        let store = Store::new(config.db_path(workspace));
        Self::with_parts(store, config, observer)
    }

    /// Discards whatever the configured store holds, corrupt or not, and
    /// opens an empty leaderboard.
    pub fn reset_and_open(workspace: &Path, config: LeaderboardConfig) -> LeaderboardResult<Self> {
        let observer = workspace_observer(workspace, config.verbose);
        let mut store = Store::new(config.db_path(workspace));
        let db = store.reset()?;
        let board = Self {
            config,
            store,
            db,
            observer,
        };
        board.log_mutation(Mutation::Reset, None, None);
        Ok(board)
    }

    /// Loads the layered workspace configuration, then opens.
    pub fn open_workspace(workspace: &Path) -> Result<Self> {
        let config = LeaderboardConfig::load(workspace)?;
        Ok(Self::open(workspace, config)?)
    }

    pub fn with_parts(
        mut store: Store,
        config: LeaderboardConfig,
        observer: Observer,
    ) -> LeaderboardResult<Self> {
        let mut db = store.load()?;
        registry::recompute_all(&mut db);
        observer.verbose_log(&format!(
            "loaded {} entries for {} models from {}",
            db.entries.len(),
            db.models.len(),
            store.path().display()
        ));
        Ok(Self {
            config,
            store,
            db,
            observer,
        })
    }

    /// Discards the in-memory state and reads the store again.
    pub fn reload(&mut self) -> LeaderboardResult<()> {
        let mut db = self.store.load()?;
        registry::recompute_all(&mut db);
        self.db = db;
        Ok(())
    }

    /// Replaces the store with an empty database. This is the only way to
    /// recover from a corrupt store.
    pub fn reset(&mut self) -> LeaderboardResult<()> {
        self.db = self.store.reset()?;
        self.log_mutation(Mutation::Reset, None, None);
        Ok(())
    }

    pub fn add_entry(
        &mut self,
        analysis_path: &Path,
        model_name: &str,
        model_info: Option<ModelInfo>,
    ) -> LeaderboardResult<Entry> {
        let summary = load_analysis(analysis_path, &self.observer)?;
        let source_ref = analysis_path.to_string_lossy();
        self.add_summary(summary, &source_ref, model_name, model_info)
    }

    /// Same as [`Leaderboard::add_entry`] for a summary that is already parsed.
    pub fn add_summary(
        &mut self,
        summary: AnalysisSummary,
        source_ref: &str,
        model_name: &str,
        model_info: Option<ModelInfo>,
    ) -> LeaderboardResult<Entry> {
        let mut next = self.db.clone();
        let id = repository::insert_entry(
            &mut next,
            summary,
            source_ref,
            model_name,
            model_info,
            Utc::now(),
        )?;
        self.commit(next)?;
        let entry = repository::find_entry(&self.db, &id)?.clone();
        self.log_mutation(Mutation::EntryAdded, Some(&entry.model_name), Some(&id));
        Ok(entry)
    }

    pub fn delete_entry(&mut self, entry_id: &str) -> LeaderboardResult<Entry> {
        let mut next = self.db.clone();
        let removed = repository::remove_entry(&mut next, entry_id)?;
        self.commit(next)?;
        self.log_mutation(
            Mutation::EntryDeleted,
            Some(&removed.model_name),
            Some(entry_id),
        );
        Ok(removed)
    }

    pub fn merge_metadata(&mut self, model_name: &str, info: &ModelInfo) -> LeaderboardResult<()> {
        let mut next = self.db.clone();
        let model = next
            .models
            .get_mut(model_name)
            .ok_or_else(|| LeaderboardError::UnknownModel(model_name.to_string()))?;
        registry::merge_metadata(&mut model.metadata, info);
        self.commit(next)?;
        self.log_mutation(Mutation::MetadataMerged, Some(model_name), None);
        Ok(())
    }

    pub fn get_entry(&self, entry_id: &str) -> LeaderboardResult<&Entry> {
        repository::find_entry(&self.db, entry_id)
    }

    pub fn get_model(&self, model_name: &str) -> LeaderboardResult<&Model> {
        self.db
            .models
            .get(model_name)
            .ok_or_else(|| LeaderboardError::UnknownModel(model_name.to_string()))
    }

    /// `limit` of `None` or `Some(0)` returns every model.
    pub fn list_models(&self, sort_metric: &str, limit: Option<usize>) -> Vec<&Model> {
        registry::list_models(&self.db, sort_metric, limit)
    }

    pub fn list_entries(
        &self,
        sort_metric: &str,
        limit: Option<usize>,
        filter: &EntryFilter,
    ) -> Vec<&Entry> {
        query::list_entries(&self.db, sort_metric, limit, filter)
    }

    pub fn rank_resource_usage(&self, metric: &str, limit: Option<usize>) -> Vec<ResourceRanking> {
        query::rank_resource_usage(&self.db, metric, limit)
    }

    /// An empty `metrics` slice compares the configured comparison metrics.
    pub fn compare_models(
        &self,
        model_names: &[&str],
        metrics: &[&str],
        resource_metrics: &[&str],
    ) -> LeaderboardResult<ComparisonMatrix> {
        let defaults = as_strs(&self.config.comparison_metrics);
        let metrics = if metrics.is_empty() {
            defaults.as_slice()
        } else {
            metrics
        };
        compare::compare_models(&self.db, model_names, metrics, resource_metrics)
    }

    /// An empty `metrics` slice uses the configured history metrics.
    pub fn model_history(
        &self,
        model_name: &str,
        metrics: &[&str],
    ) -> LeaderboardResult<Vec<HistoryPoint>> {
        let defaults = as_strs(&self.config.history_metrics);
        let metrics = if metrics.is_empty() {
            defaults.as_slice()
        } else {
            metrics
        };
        history::model_history(&self.db, model_name, metrics)
    }

    pub fn build_report(&self, sort_metric: &str, top_n: usize) -> LeaderboardReport {
        self.build_report_at(sort_metric, top_n, Utc::now())
    }

    /// Report with a caller-chosen generation time, so equal state renders equally.
    pub fn build_report_at(
        &self,
        sort_metric: &str,
        top_n: usize,
        generated_at: DateTime<Utc>,
    ) -> LeaderboardReport {
        report::build_report(
            &self.db,
            sort_metric,
            top_n,
            &self.config.report_metrics,
            generated_at,
        )
    }

    /// Report using the configured default metric and size.
    pub fn default_report(&self) -> LeaderboardReport {
        self.build_report(&self.config.default_metric, self.config.top_n)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LeaderboardConfig {
        &self.config
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    fn commit(&mut self, mut next: Database) -> LeaderboardResult<()> {
        self.store.save(&mut next)?;
        self.db = next;
        Ok(())
    }

    fn log_mutation(&self, mutation: Mutation, model_name: Option<&str>, entry_id: Option<&str>) {
        if let Err(err) = self.observer.record_mutation(mutation, model_name, entry_id) {
            self.observer
                .warn_log(&format!("failed to record {}: {err}", mutation.as_str()));
        }
    }
}

fn workspace_observer(workspace: &Path, verbose: bool) -> Observer {
    let mut observer = Observer::new(workspace).unwrap_or_else(|err| {
        let fallback = Observer::stderr_only();
        fallback.warn_log(&format!("observe log unavailable: {err}"));
        fallback
    });
    observer.set_verbose(verbose);
    observer
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

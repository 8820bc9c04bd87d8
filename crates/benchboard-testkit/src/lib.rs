use anyhow::Result;
use benchboard_core::LeaderboardConfig;
use benchboard_leaderboard::Leaderboard;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// A throwaway workspace holding analysis files and a leaderboard database.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> LeaderboardConfig {
        LeaderboardConfig::default()
    }

    pub fn db_path(&self) -> PathBuf {
        self.config().db_path(self.path())
    }

    pub fn open(&self) -> Result<Leaderboard> {
        Ok(Leaderboard::open(self.path(), self.config())?)
    }

    /// Writes `runs/analysis_<name>.json`.
    pub fn write_analysis(&self, name: &str, doc: &Value) -> Result<PathBuf> {
        self.write_json(&format!("runs/analysis_{name}.json"), doc)
    }

    /// Writes an analysis file under a fresh unique name.
    pub fn analysis_file(&self, doc: &Value) -> Result<PathBuf> {
        self.write_analysis(&Uuid::now_v7().simple().to_string(), doc)
    }

    /// Writes the monitor file paired with `runs/analysis_<name>.json`.
    pub fn write_resources(&self, name: &str, doc: &Value) -> Result<PathBuf> {
        self.write_json(&format!("runs/{name}_resources.json"), doc)
    }

    pub fn write_file(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn write_json(&self, relative: &str, doc: &Value) -> Result<PathBuf> {
        self.write_file(relative, &serde_json::to_string_pretty(doc)?)
    }
}

/// Analysis document as the benchmark pipeline writes it; rates are fractions.
pub fn analysis_doc(
    title: &str,
    test_pass_rate: f64,
    api_success_rate: f64,
    execution_success_rate: f64,
    avg_response_time: f64,
) -> Value {
    json!({
        "title": title,
        "summary": {
            "total_tasks": 10,
            "avg_response_time": avg_response_time,
            "api_success_rate": api_success_rate,
            "execution_success_rate": execution_success_rate,
            "test_pass_rate": test_pass_rate,
        }
    })
}

/// Analysis with only the test pass rate varying.
pub fn pass_rate_doc(test_pass_rate: f64) -> Value {
    analysis_doc("Fixture run", test_pass_rate, 1.0, 1.0, 2.0)
}

/// Resource monitor statistics in the monitor's nested layout.
pub fn monitor_doc(cpu_mean: f64, cpu_max: f64, memory_mean_gb: f64, memory_max_gb: f64) -> Value {
    json!({
        "cpu": {"percent": {"mean": cpu_mean, "max": cpu_max}},
        "memory": {"used_gb": {"mean": memory_mean_gb, "max": memory_max_gb}},
    })
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_analysis_is_accepted() {
        let ws = TestWorkspace::new().expect("workspace");
        let path = ws.analysis_file(&pass_rate_doc(0.8)).expect("analysis");
        let mut board = ws.open().expect("open");
        let entry = board.add_entry(&path, "A", None).expect("add");
        assert_close(entry.metrics["test_pass_rate"], 80.0);
        assert!(ws.db_path().exists());
    }

    #[test]
    fn resources_land_beside_their_analysis() {
        let ws = TestWorkspace::new().expect("workspace");
        let analysis = ws.write_analysis("demo", &pass_rate_doc(0.5)).expect("analysis");
        let resources = ws
            .write_resources("demo", &monitor_doc(10.0, 20.0, 1.0, 2.0))
            .expect("resources");
        assert_eq!(
            benchboard_leaderboard::resource_companion_path(&analysis),
            resources
        );
    }
}

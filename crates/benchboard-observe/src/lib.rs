use anyhow::Result;
use benchboard_core::runtime_dir;
use chrono::Utc;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Kinds of persisted leaderboard mutations written to the observe log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    EntryAdded,
    EntryDeleted,
    MetadataMerged,
    Reset,
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryAdded => "entry_added",
            Self::EntryDeleted => "entry_deleted",
            Self::MetadataMerged => "metadata_merged",
            Self::Reset => "reset",
        }
    }
}

pub struct Observer {
    log_path: Option<PathBuf>,
    verbose: bool,
}

impl Observer {
    /// Logs to `<workspace>/.benchboard/observe.log`.
    pub fn new(workspace: &Path) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: Some(dir.join("observe.log")),
            verbose: false,
        })
    }

    /// An observer that only ever writes warnings to stderr.
    pub fn stderr_only() -> Self {
        Self {
            log_path: None,
            verbose: false,
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn record_mutation(
        &self,
        mutation: Mutation,
        model_name: Option<&str>,
        entry_id: Option<&str>,
    ) -> Result<()> {
        let payload = json!({
            "kind": mutation.as_str(),
            "model": model_name,
            "entry_id": entry_id,
        });
        self.verbose_log(&format!("{} {}", mutation.as_str(), payload));
        self.append_log_line(&format!(
            "{} MUTATION {}",
            Utc::now().to_rfc3339(),
            serde_json::to_string(&payload)?
        ))
    }

    /// Enable or disable verbose logging to stderr.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Log a message to stderr with `[benchboard]` prefix when verbose mode is on.
    pub fn verbose_log(&self, msg: &str) {
        if self.verbose {
            eprintln!("[benchboard] {msg}");
        }
    }

    /// Log a warning: always written to stderr, and to the log file when there is one.
    pub fn warn_log(&self, msg: &str) {
        eprintln!("[benchboard WARN] {msg}");
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_are_appended_as_json_lines() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let observer = Observer::new(workspace.path()).expect("observer");
        observer
            .record_mutation(Mutation::EntryAdded, Some("A"), Some("entry_1"))
            .expect("record");
        observer
            .record_mutation(Mutation::Reset, None, None)
            .expect("record reset");

        let log = fs::read_to_string(observer.log_path().expect("log path")).expect("read log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("MUTATION"));
        assert!(lines[0].contains("\"entry_added\""));
        assert!(lines[0].contains("\"entry_1\""));
        assert!(lines[1].contains("\"reset\""));
    }

    #[test]
    fn warnings_reach_the_log_file() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let observer = Observer::new(workspace.path()).expect("observer");
        observer.warn_log("resource file unreadable");
        let log = fs::read_to_string(observer.log_path().expect("log path")).expect("read log");
        assert!(log.contains("WARN resource file unreadable"));
    }

    #[test]
    fn stderr_only_observer_never_fails() {
        let mut observer = Observer::stderr_only();
        observer.set_verbose(true);
        assert!(observer.is_verbose());
        assert!(observer.log_path().is_none());
        observer
            .record_mutation(Mutation::EntryDeleted, Some("A"), Some("entry_1"))
            .expect("no-op record");
    }
}

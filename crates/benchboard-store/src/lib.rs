use benchboard_core::{Database, LeaderboardError, LeaderboardResult, SCHEMA_VERSION};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What the store last saw on disk: used to detect writes by another process.
#[derive(Debug, Clone, PartialEq)]
enum Fingerprint {
    Absent,
    Present {
        schema_version: u32,
        last_updated: DateTime<Utc>,
    },
}

impl Fingerprint {
    fn of(db: &Database) -> Self {
        Self::Present {
            schema_version: db.schema_version,
            last_updated: db.last_updated,
        }
    }
}

#[derive(Deserialize)]
struct Header {
    schema_version: u32,
    last_updated: DateTime<Utc>,
}

/// JSON file persistence for the leaderboard database.
///
/// Writes go to a sibling temp file that is synced and renamed over the
/// target, so readers only ever observe a complete file.
pub struct Store {
    path: PathBuf,
    observed: Option<Fingerprint>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            observed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// A missing file yields an empty database; a damaged one is an error.
    pub fn load(&mut self) -> LeaderboardResult<Database> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.observed = Some(Fingerprint::Absent);
                return Ok(Database::empty());
            }
            Err(err) => return Err(LeaderboardError::io(&self.path, err)),
        };
        let db = parse_database(&self.path, &raw)?;
        self.observed = Some(Fingerprint::of(&db));
        Ok(db)
    }

    /// Stamps `last_updated` and replaces the file, unless another writer
    /// touched it since the last load or save.
    pub fn save(&mut self, db: &mut Database) -> LeaderboardResult<()> {
        let expected = self.observed.clone().unwrap_or(Fingerprint::Absent);
        if self.read_fingerprint()? != expected {
            return Err(LeaderboardError::ConcurrentModification {
                path: self.path.clone(),
            });
        }

        let mut stamped = db.clone();
        stamped.schema_version = SCHEMA_VERSION;
        stamped.last_updated = next_stamp(db.last_updated, &expected);
        self.write_atomic(&stamped)?;

        self.observed = Some(Fingerprint::of(&stamped));
        *db = stamped;
        Ok(())
    }

    /// Replaces whatever is on disk with a fresh empty database.
    pub fn reset(&mut self) -> LeaderboardResult<Database> {
        let db = Database::empty();
        self.write_atomic(&db)?;
        self.observed = Some(Fingerprint::of(&db));
        Ok(db)
    }

    fn read_fingerprint(&self) -> LeaderboardResult<Fingerprint> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Fingerprint::Absent),
            Err(err) => return Err(LeaderboardError::io(&self.path, err)),
        };
        match serde_json::from_slice::<Header>(&raw) {
            Ok(header) => Ok(Fingerprint::Present {
                schema_version: header.schema_version,
                last_updated: header.last_updated,
            }),
            // We never load a damaged file, so one appearing here was written by someone else.
            Err(_) => Err(LeaderboardError::ConcurrentModification {
                path: self.path.clone(),
            }),
        }
    }

    fn write_atomic(&self, db: &Database) -> LeaderboardResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| LeaderboardError::io(parent, err))?;
        }
        let bytes = serde_json::to_vec_pretty(db).map_err(|err| LeaderboardError::Io {
            path: self.path.clone(),
            source: err.into(),
        })?;

        let tmp_path = self.temp_path();
        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|_| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(LeaderboardError::io(&self.path, err));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "leaderboard_db.json".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::now_v7()))
    }
}

fn parse_database(path: &Path, raw: &[u8]) -> LeaderboardResult<Database> {
    let corrupt = |reason: String| LeaderboardError::StoreCorrupt {
        path: path.to_path_buf(),
        reason,
    };
    let db: Database = serde_json::from_slice(raw).map_err(|err| corrupt(err.to_string()))?;
    if db.schema_version > SCHEMA_VERSION {
        return Err(corrupt(format!(
            "schema version {} is newer than supported version {SCHEMA_VERSION}",
            db.schema_version
        )));
    }
    let mut seen = HashSet::new();
    for entry in &db.entries {
        if !seen.insert(entry.id.as_str()) {
            return Err(corrupt(format!("duplicate entry id {}", entry.id)));
        }
    }
    Ok(db)
}

/// `last_updated` must move forward on every save, even on a coarse clock.
fn next_stamp(current: DateTime<Utc>, on_disk: &Fingerprint) -> DateTime<Utc> {
    let floor = match on_disk {
        Fingerprint::Present { last_updated, .. } => current.max(*last_updated),
        Fingerprint::Absent => current,
    };
    let now = Utc::now();
    if now > floor {
        now
    } else {
        floor + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchboard_core::{Entry, Model};
    use std::collections::BTreeMap;

    fn sample_entry(id: &str, model: &str, pass_rate: f64) -> Entry {
        Entry {
            id: id.to_string(),
            model_name: model.to_string(),
            timestamp: Utc::now(),
            title: "sample".to_string(),
            metrics: BTreeMap::from([("test_pass_rate".to_string(), pass_rate)]),
            breakdowns: Default::default(),
            resource_metrics: None,
            model_info: None,
            source_ref: format!("{id}.json"),
        }
    }

    fn sample_db() -> Database {
        let mut db = Database::empty();
        let entry = sample_entry("entry_1", "A", 80.0);
        db.models.insert(
            "A".to_string(),
            Model {
                name: "A".to_string(),
                metadata: Default::default(),
                aggregates: BTreeMap::new(),
                resource_aggregates: BTreeMap::new(),
                entry_count: 1,
                first_seen: entry.timestamp,
                last_seen: entry.timestamp,
            },
        );
        db.entries.push(entry);
        db
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(dir.path().join("board").join("leaderboard_db.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_empty_database() {
        let (_dir, mut store) = temp_store();
        let db = store.load().expect("load");
        assert_eq!(db.schema_version, SCHEMA_VERSION);
        assert!(db.entries.is_empty());
        assert!(db.models.is_empty());
        assert!(!store.exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, mut store) = temp_store();
        store.load().expect("load");
        let mut db = sample_db();
        store.save(&mut db).expect("save");

        let mut reopened = Store::new(store.path());
        let loaded = reopened.load().expect("reload");
        assert_eq!(loaded, db);

        let mut again = loaded.clone();
        reopened.save(&mut again).expect("save again");
        assert_eq!(again.entries, loaded.entries);
        assert_eq!(again.models, loaded.models);
        assert_eq!(again.schema_version, loaded.schema_version);
        assert!(again.last_updated > loaded.last_updated);
    }

    #[test]
    fn invalid_json_is_reported_as_corrupt() {
        let (_dir, mut store) = temp_store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("dir");
        fs::write(store.path(), "{ not json").expect("write");
        let err = store.load().expect_err("corrupt");
        assert!(matches!(err, LeaderboardError::StoreCorrupt { .. }));
        assert_eq!(
            fs::read_to_string(store.path()).expect("untouched"),
            "{ not json"
        );
    }

    #[test]
    fn missing_top_level_field_is_corrupt() {
        let (_dir, mut store) = temp_store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("dir");
        fs::write(
            store.path(),
            r#"{"schema_version": 1, "last_updated": "2025-01-01T00:00:00Z", "models": {}}"#,
        )
        .expect("write");
        assert!(matches!(
            store.load(),
            Err(LeaderboardError::StoreCorrupt { .. })
        ));
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let (_dir, mut store) = temp_store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("dir");
        fs::write(
            store.path(),
            r#"{"schema_version": 99, "last_updated": "2025-01-01T00:00:00Z", "entries": [], "models": {}}"#,
        )
        .expect("write");
        assert!(matches!(
            store.load(),
            Err(LeaderboardError::StoreCorrupt { .. })
        ));
    }

    #[test]
    fn duplicate_entry_ids_are_rejected() {
        let (_dir, mut store) = temp_store();
        let mut db = sample_db();
        db.entries.push(sample_entry("entry_1", "A", 90.0));
        fs::create_dir_all(store.path().parent().expect("parent")).expect("dir");
        fs::write(store.path(), serde_json::to_vec(&db).expect("encode")).expect("write");
        assert!(matches!(
            store.load(),
            Err(LeaderboardError::StoreCorrupt { .. })
        ));
    }

    #[test]
    fn save_detects_writes_from_another_store() {
        let (_dir, mut first) = temp_store();
        first.load().expect("load first");
        let mut second = Store::new(first.path());
        second.load().expect("load second");

        let mut theirs = sample_db();
        second.save(&mut theirs).expect("second saves");

        let mut ours = Database::empty();
        let err = first.save(&mut ours).expect_err("stale writer");
        assert!(matches!(err, LeaderboardError::ConcurrentModification { .. }));

        let on_disk = Store::new(first.path()).load().expect("reload");
        assert_eq!(on_disk.entries.len(), 1);
    }

    #[test]
    fn saving_without_loading_refuses_to_clobber_existing_file() {
        let (_dir, mut store) = temp_store();
        store.load().expect("load");
        store.save(&mut sample_db()).expect("save");

        let mut blind = Store::new(store.path());
        assert!(matches!(
            blind.save(&mut Database::empty()),
            Err(LeaderboardError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn reset_replaces_corrupt_file() {
        let (_dir, mut store) = temp_store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("dir");
        fs::write(store.path(), "garbage").expect("write");
        assert!(store.load().is_err());

        let fresh = store.reset().expect("reset");
        assert!(fresh.entries.is_empty());
        let loaded = store.load().expect("load after reset");
        assert_eq!(loaded, fresh);

        let mut db = loaded;
        store.save(&mut db).expect("save after reset");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, mut store) = temp_store();
        store.load().expect("load");
        store.save(&mut sample_db()).expect("save");
        let parent = store.path().parent().expect("parent");
        let names: Vec<String> = fs::read_dir(parent)
            .expect("read dir")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["leaderboard_db.json".to_string()]);
    }
}

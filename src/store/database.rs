//! Persistent store for users, sessions, cache and analytics.
//!
//! Epistemic foundation:
//! - K_i: Snapshots are written atomically (backup → synced temp file → rename)
//! - K_i: A failed snapshot write leaves memory unchanged
//! - K_i: Analytics events are appended to a JSONL log, never rewritten
//! - B_i: Snapshot or event log may not exist yet → start empty
//! - I^B: Crash during write → backup file provides recovery
//!
//! Every call does blocking file I/O; async callers run it on the blocking pool.

use super::tables::{AnalyticsEvent, EventLog, SessionRecord, Tables, User};
use crate::models::{CodegenieError, Result};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Snapshot file locations.
#[derive(Debug, Clone)]
struct SnapshotPaths {
    snapshot: PathBuf,
    backup: PathBuf,
    temp: PathBuf,
    events: PathBuf,
}

impl SnapshotPaths {
    fn new(path: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(suffix);
            path.with_file_name(name)
        };
        Self {
            snapshot: path.to_path_buf(),
            backup: with_suffix(".backup"),
            temp: with_suffix(".tmp"),
            events: with_suffix(".events.jsonl"),
        }
    }
}

/// Thread-safe store.
///
/// Users, sessions and cache live in memory behind one mutex; when opened
/// from a path every mutation of them is followed by an atomic snapshot
/// write. Analytics events go to an append-only log next to the snapshot,
/// with the most recent ones kept in memory for `events_for`.
pub struct Database {
    paths: Option<SnapshotPaths>,
    tables: Mutex<Tables>,
    events: Mutex<EventLog>,
}

impl Database {
    /// Open (or create) a store persisted at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CodegenieError::io("creating store dir", e))?;
        }

        let paths = SnapshotPaths::new(path);
        let (tables, needs_write) = if paths.snapshot.exists() {
            match Self::load(&paths.snapshot) {
                Ok(tables) => (tables, false),
                Err(e) if paths.backup.exists() => {
                    warn!(error = %e, "Snapshot unreadable, restoring from backup");
                    let tables = Self::load(&paths.backup)?;
                    // keep the good backup from being overwritten by the corrupt snapshot
                    fs::remove_file(&paths.snapshot)
                        .map_err(|e| CodegenieError::io("removing corrupt snapshot", e))?;
                    (tables, true)
                }
                Err(e) => return Err(e),
            }
        } else if paths.backup.exists() {
            warn!(path = %paths.backup.display(), "Snapshot missing, restoring from backup");
            (Self::load(&paths.backup)?, true)
        } else {
            info!(path = %path.display(), "Creating new store");
            (Tables::default(), true)
        };
        let events = Self::load_events(&paths.events)?;

        if needs_write {
            Self::write_snapshot(&paths, &tables)?;
        }
        Ok(Self {
            paths: Some(paths),
            tables: Mutex::new(tables),
            events: Mutex::new(events),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            paths: None,
            tables: Mutex::new(Tables::default()),
            events: Mutex::new(EventLog::default()),
        }
    }

    /// Whether this store writes snapshots.
    pub fn is_persistent(&self) -> bool {
        self.paths.is_some()
    }

    fn load(path: &Path) -> Result<Tables> {
        let file = File::open(path).map_err(|e| CodegenieError::io("opening store snapshot", e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CodegenieError::ParseError(format!("Invalid store snapshot: {e}")))
    }

    /// Replay the event log; unreadable lines are skipped.
    fn load_events(path: &Path) -> Result<EventLog> {
        let mut events = EventLog::default();
        if !path.exists() {
            return Ok(events);
        }

        let file = File::open(path).map_err(|e| CodegenieError::io("opening event log", e))?;
        let mut skipped = 0usize;
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| CodegenieError::io("reading event log", e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalyticsEvent>(&line) {
                Ok(event) => events.record(event),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "Skipping unreadable analytics event");
                    skipped += 1;
                }
            }
        }
        debug!(retained = events.len(), skipped, "Event log loaded");
        Ok(events)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CodegenieError::Internal("Store lock poisoned".to_string()))
    }

    fn lock_events(&self) -> Result<MutexGuard<'_, EventLog>> {
        self.events
            .lock()
            .map_err(|_| CodegenieError::Internal("Event log lock poisoned".to_string()))
    }

    /// Write the snapshot atomically.
    fn write_snapshot(paths: &SnapshotPaths, tables: &Tables) -> Result<()> {
        if paths.snapshot.exists() {
            fs::copy(&paths.snapshot, &paths.backup)
                .map_err(|e| CodegenieError::io("backing up store snapshot", e))?;
        }

        {
            let file = File::create(&paths.temp)
                .map_err(|e| CodegenieError::io("creating temp snapshot", e))?;
            let mut writer = BufWriter::new(&file);
            serde_json::to_writer(&mut writer, tables)
                .map_err(|e| CodegenieError::Internal(format!("Serializing store: {e}")))?;
            writer
                .flush()
                .map_err(|e| CodegenieError::io("flushing temp snapshot", e))?;
            drop(writer);
            file.sync_all()
                .map_err(|e| CodegenieError::io("syncing temp snapshot", e))?;
        }

        fs::rename(&paths.temp, &paths.snapshot)
            .map_err(|e| CodegenieError::io("renaming store snapshot", e))?;

        debug!("Store snapshot saved");
        Ok(())
    }

    fn append_event(path: &Path, event: &AnalyticsEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| CodegenieError::Internal(format!("Serializing event: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CodegenieError::io("opening event log", e))?;
        writeln!(file, "{line}").map_err(|e| CodegenieError::io("appending event", e))
    }

    /// Run a mutation and persist the result.
    ///
    /// The mutation is applied to a copy; memory only changes once the
    /// snapshot is on disk.
    fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> Result<R> {
        let mut tables = self.lock()?;
        let Some(paths) = &self.paths else {
            return Ok(f(&mut tables));
        };

        let mut next = tables.clone();
        let out = f(&mut next);
        Self::write_snapshot(paths, &next)?;
        *tables = next;
        Ok(out)
    }

    /// Cached value for `key`, if present and not expired.
    pub fn get_cached(&self, key: &str) -> Result<Option<String>> {
        let tables = self.lock()?;
        Ok(tables.get_cached(key, Utc::now()).map(str::to_string))
    }

    /// Insert or replace a cached value.
    pub fn set_cached(&self, key: &str, value: &str, ttl_minutes: i64) -> Result<()> {
        self.mutate(|t| t.set_cached(key, value.to_string(), ttl_minutes, Utc::now()))
    }

    /// Remove expired cache entries.
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.mutate(|t| t.purge_expired(Utc::now()))?;
        if removed > 0 {
            debug!(removed, "Purged expired cache entries");
        }
        Ok(removed)
    }

    /// Record an analytics event.
    ///
    /// The event is appended to the log before it becomes visible.
    pub fn log_analytics(&self, user_id: &str, action: &str, details: &str) -> Result<u64> {
        let mut events = self.lock_events()?;
        let event = events.next_event(user_id, action, details, Utc::now());
        if let Some(paths) = &self.paths {
            Self::append_event(&paths.events, &event)?;
        }
        let id = event.id;
        events.record(event);
        Ok(id)
    }

    /// Retained events for a user, oldest first.
    pub fn events_for(&self, user_id: &str) -> Result<Vec<AnalyticsEvent>> {
        Ok(self.lock_events()?.for_user(user_id))
    }

    /// Create the user if it does not exist yet.
    pub fn upsert_user(&self, id: &str, name: Option<&str>) -> Result<User> {
        self.mutate(|t| {
            t.upsert_user(id, name, serde_json::Value::Null, Utc::now())
                .clone()
        })
    }

    /// Create or update a session record.
    pub fn save_session(&self, id: &str, user_id: &str, data: serde_json::Value) -> Result<()> {
        self.mutate(|t| t.save_session(id, user_id, data, Utc::now()))
    }

    pub fn session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let tables = self.lock()?;
        Ok(tables.sessions.get(id).cloned())
    }

    /// Number of cache entries, live or expired.
    pub fn cache_len(&self) -> Result<usize> {
        Ok(self.lock()?.cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_cache_round_trip() {
        let db = Database::in_memory();
        assert!(!db.is_persistent());
        db.set_cached("search_abc_5", "[]", 60).unwrap();
        assert_eq!(db.get_cached("search_abc_5").unwrap().as_deref(), Some("[]"));
        assert_eq!(db.get_cached("other").unwrap(), None);
    }

    #[test]
    fn test_zero_ttl_is_never_served() {
        let db = Database::in_memory();
        db.set_cached("k", "v", 0).unwrap();
        assert_eq!(db.get_cached("k").unwrap(), None);
        assert_eq!(db.purge_expired().unwrap(), 1);
        assert_eq!(db.cache_len().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store").join("cache.json");

        {
            let db = Database::open(&path).unwrap();
            db.set_cached("k", "v", 60).unwrap();
            db.log_analytics("u1", "session_start", "s1").unwrap();
            db.save_session("s1", "u1", serde_json::json!({"turns": 2}))
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_cached("k").unwrap().as_deref(), Some("v"));
        assert_eq!(db.events_for("u1").unwrap().len(), 1);
        assert_eq!(db.session("s1").unwrap().unwrap().data["turns"], 2);
        assert!(!dir.path().join("store").join("cache.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_restores_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        {
            let db = Database::open(&path).unwrap();
            db.set_cached("k", "v", 60).unwrap();
            // second write moves the first snapshot into the backup
            db.set_cached("other", "w", 60).unwrap();
        }
        fs::write(&path, "{ not json").unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_cached("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_corrupt_snapshot_without_backup_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "garbage").unwrap();
        assert!(matches!(
            Database::open(&path),
            Err(CodegenieError::ParseError(_))
        ));
    }

    #[test]
    fn test_events_do_not_rewrite_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        {
            let db = Database::open(&path).unwrap();
            db.set_cached("k", "v", 60).unwrap();
            let snapshot_len = fs::metadata(&path).unwrap().len();
            let snapshot_bytes = fs::read(&path).unwrap();

            for i in 0..200 {
                db.log_analytics("u1", "goal_execution", &format!("goal {i}"))
                    .unwrap();
            }
            assert_eq!(fs::metadata(&path).unwrap().len(), snapshot_len);
            assert_eq!(fs::read(&path).unwrap(), snapshot_bytes);
        }

        let log = fs::read_to_string(dir.path().join("cache.json.events.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 200);

        let db = Database::open(&path).unwrap();
        let events = db.events_for("u1").unwrap();
        assert_eq!(events.len(), 200);
        assert_eq!(events[199].details, "goal 199");
        // ids keep increasing across a reopen
        assert_eq!(db.log_analytics("u1", "ping", "").unwrap(), 201);
    }

    #[test]
    fn test_unreadable_event_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        {
            let db = Database::open(&path).unwrap();
            db.log_analytics("u1", "a", "").unwrap();
        }
        let log_path = dir.path().join("cache.json.events.jsonl");
        let mut log = fs::read_to_string(&log_path).unwrap();
        log.push_str("{ truncated\n");
        fs::write(&log_path, log).unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(db.events_for("u1").unwrap().len(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_write_leaves_memory_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        let path = store_dir.join("cache.json");
        let db = Database::open(&path).unwrap();
        db.set_cached("k", "old", 60).unwrap();

        fs::set_permissions(&store_dir, fs::Permissions::from_mode(0o500)).unwrap();
        let denied = File::create(store_dir.join("writable-check")).is_err();
        let result = db.set_cached("k", "new", 60);
        fs::set_permissions(&store_dir, fs::Permissions::from_mode(0o700)).unwrap();

        // running as root ignores directory permissions
        if denied {
            assert!(result.is_err());
            assert_eq!(db.get_cached("k").unwrap().as_deref(), Some("old"));
        }
    }

    #[test]
    fn test_events_filtered_by_user() {
        let db = Database::in_memory();
        db.log_analytics("u1", "a", "").unwrap();
        db.log_analytics("u2", "b", "").unwrap();
        db.log_analytics("u1", "c", "").unwrap();
        let actions: Vec<_> = db
            .events_for("u1")
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["a", "c"]);
    }
}

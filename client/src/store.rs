//! Client-local persisted state.
//!
//! A single-slot, last-write-wins key/value store.  The only record kept
//! today is the last selected trail, valid for a fixed window after it was
//! written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use moodwalk_common::protocol::Trail;

use crate::error::ClientError;

pub const SELECTED_TRAIL_KEY: &str = "lastSelectedTrail";

pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// One `{key}.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a reader never sees a half-written record.
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }
}

/// The persisted selection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTrail {
    pub trail: Trail,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SelectedTrailStore {
    store: Arc<dyn LocalStore>,
    ttl: chrono::Duration,
}

impl SelectedTrailStore {
    pub fn new(store: Arc<dyn LocalStore>, ttl: chrono::Duration) -> Self {
        SelectedTrailStore { store, ttl }
    }

    /// Overwrite the selection with `trail`, stamped `now`.
    pub fn save(&self, trail: &Trail, now: DateTime<Utc>) -> Result<(), ClientError> {
        let record = SelectedTrail { trail: trail.clone(), timestamp: now };
        self.store.set(SELECTED_TRAIL_KEY, &serde_json::to_string(&record)?)?;
        debug!("Saved selected trail {}", trail.name);
        Ok(())
    }

    /// The selected trail if it was saved within the validity window.
    /// Stale and unreadable records are cleared.
    pub fn load(&self, now: DateTime<Utc>) -> Option<Trail> {
        let raw = match self.store.get(SELECTED_TRAIL_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot read selected trail: {e}");
                return None;
            }
        };

        let record = match serde_json::from_str::<SelectedTrail>(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding unreadable selected trail: {e}");
                self.clear();
                return None;
            }
        };

        if now - record.timestamp > self.ttl {
            debug!("Selected trail {} expired", record.trail.name);
            self.clear();
            return None;
        }
        Some(record.trail)
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(SELECTED_TRAIL_KEY) {
            warn!("Cannot clear selected trail: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn trail(name: &str) -> Trail {
        Trail { name: name.into(), address: "서울".into(), ..Default::default() }
    }

    fn selection(store: Arc<dyn LocalStore>) -> SelectedTrailStore {
        SelectedTrailStore::new(store, Duration::hours(24))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_load_within_window() {
        let s = selection(Arc::new(MemoryStore::new()));
        s.save(&trail("장이소공원"), t0()).unwrap();
        let got = s.load(t0() + Duration::hours(23)).unwrap();
        assert_eq!(got.name, "장이소공원");
    }

    #[test]
    fn test_expired_record_is_cleared() {
        let store = Arc::new(MemoryStore::new());
        let s = selection(store.clone());
        s.save(&trail("a"), t0()).unwrap();

        assert!(s.load(t0() + Duration::hours(25)).is_none());
        assert!(store.get(SELECTED_TRAIL_KEY).unwrap().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let s = selection(Arc::new(MemoryStore::new()));
        s.save(&trail("a"), t0()).unwrap();
        s.save(&trail("b"), t0()).unwrap();
        assert_eq!(s.load(t0()).unwrap().name, "b");
    }

    #[test]
    fn test_corrupt_record_is_cleared() {
        let store = Arc::new(MemoryStore::new());
        store.set(SELECTED_TRAIL_KEY, "{not json").unwrap();
        let s = selection(store.clone());
        assert!(s.load(t0()).is_none());
        assert!(store.get(SELECTED_TRAIL_KEY).unwrap().is_none());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!("moodwalk_store_{}", std::process::id()));
        let store = FileStore::new(&dir);
        assert!(store.get("k").unwrap().is_none());

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

// Snapshot persistence and export

use crate::clock::{Clock, SystemClock};
use crate::kv::KeyValue;
use crate::models::Task;
use chrono::NaiveDate;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Key the snapshot record is stored under
pub const SNAPSHOT_KEY: &str = "taskbuddy-snapshot";

/// Format of the human-readable `lastSavedAt` field
pub const LAST_SAVED_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Record written to the key-value store after every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub last_saved_at: Option<String>,
}

/// Result of hydrating from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub tasks: Vec<Task>,
    pub last_saved_at: Option<String>,
}

/// Bridge between the task store and durable storage
///
/// `load` never fails: missing or unreadable state is reported as empty.
pub trait Persistence {
    fn load(&mut self) -> Loaded;

    /// Overwrite the stored snapshot with `tasks`; returns the `lastSavedAt` written
    fn save(&mut self, tasks: &[Task]) -> Result<String>;

    /// Remove the stored snapshot entirely
    fn erase(&mut self) -> Result<()>;
}

/// `Persistence` over any `KeyValue` backend
pub struct KvPersistence<K: KeyValue> {
    kv: K,
    clock: Box<dyn Clock>,
}

impl<K: KeyValue> KvPersistence<K> {
    pub fn new(kv: K) -> Self {
        Self::with_clock(kv, Box::new(SystemClock))
    }

    pub fn with_clock(kv: K, clock: Box<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }
}

impl<K: KeyValue> Persistence for KvPersistence<K> {
    fn load(&mut self) -> Loaded {
        let raw = match self.kv.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = SNAPSHOT_KEY, "No stored snapshot, starting empty");
                return Loaded::default();
            }
            Err(e) => {
                warn!(key = SNAPSHOT_KEY, error = ?e, "Failed to read snapshot, starting empty");
                return Loaded::default();
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&raw) {
            Ok(snapshot) => {
                info!(
                    count = snapshot.tasks.len(),
                    last_saved_at = snapshot.last_saved_at.as_deref().unwrap_or("never"),
                    "Loaded snapshot"
                );
                Loaded {
                    tasks: snapshot.tasks,
                    last_saved_at: snapshot.last_saved_at,
                }
            }
            Err(e) => {
                warn!(key = SNAPSHOT_KEY, error = ?e, "Failed to parse snapshot, starting empty");
                Loaded::default()
            }
        }
    }

    fn save(&mut self, tasks: &[Task]) -> Result<String> {
        let last_saved_at = self.clock.now().format(LAST_SAVED_FORMAT).to_string();
        let snapshot = PersistedSnapshot {
            tasks: tasks.to_vec(),
            last_saved_at: Some(last_saved_at.clone()),
        };

        let json = serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?;
        self.kv.set(SNAPSHOT_KEY, &json).context("Failed to write snapshot")?;

        debug!(count = tasks.len(), %last_saved_at, "Saved snapshot");
        Ok(last_saved_at)
    }

    fn erase(&mut self) -> Result<()> {
        self.kv.remove(SNAPSHOT_KEY).context("Failed to erase snapshot")?;
        info!(key = SNAPSHOT_KEY, "Erased snapshot");
        Ok(())
    }
}

/// A backup file ready to be handed to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Export {
    /// Write the export into `dir`, returning the full path
    ///
    /// Writes to a temporary sibling first so a partial file never carries the final name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create export directory {}", dir.display()))?;

        let path = dir.join(&self.file_name);
        let tmp_path = dir.join(format!(".{}.tmp", self.file_name));

        fs::write(&tmp_path, &self.bytes).context("Failed to write export file")?;
        fs::rename(&tmp_path, &path).context("Failed to move export file into place")?;

        info!(path = ?path, bytes = self.bytes.len(), "Exported backup");
        Ok(path)
    }
}

/// Deterministic backup name for a calendar date
pub fn export_file_name(date: NaiveDate) -> String {
    format!("taskbuddy-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Pretty-printed task array (no snapshot wrapper) named after `date`
///
/// Does not touch the stored snapshot.
pub fn export_snapshot(tasks: &[Task], date: NaiveDate) -> Result<Export> {
    let bytes = serde_json::to_vec_pretty(tasks).context("Failed to serialize export")?;
    Ok(Export {
        file_name: export_file_name(date),
        bytes,
    })
}

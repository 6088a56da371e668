// Durable key-value storage backing the persisted snapshot

use crate::clock::now_ms;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const CURRENT_VERSION: u32 = 1;

/// Minimal string key-value store
///
/// `set` must replace the whole value atomically: a reader sees either the
/// old value or the new one, never a mix.
pub trait KeyValue {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// SQLite-backed store living in a directory of its own
///
/// Holds an exclusive lock on `taskbuddy.lock` for as long as it is open, so
/// it is the only writer of its records.
pub struct SqliteKv {
    base_path: PathBuf,
    db: Connection,
    _lock: File,
}

impl SqliteKv {
    /// Open or create a store in the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        fs::create_dir_all(&base_path)
            .with_context(|| format!("Failed to create store directory {}", base_path.display()))?;

        let lock_path = base_path.join("taskbuddy.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;
        lock.try_lock_exclusive()
            .map_err(|e| eyre!("Store at {} is in use by another process: {}", base_path.display(), e))?;

        let db_path = base_path.join("taskbuddy.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let store = Self {
            base_path,
            db,
            _lock: lock,
        };

        store.create_schema()?;
        store.write_version()?;

        debug!(path = ?store.base_path, "Opened key-value store");
        Ok(store)
    }

    /// Get the directory this store lives in
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn create_schema(&self) -> Result<()> {
        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }
}

impl KeyValue for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now_ms()],
        )?;
        tx.commit().context("Failed to commit key-value write")?;

        debug!(key, bytes = value.len(), "kv set");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let removed = self.db.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        debug!(key, removed, "kv remove");
        Ok(())
    }
}

/// In-memory store for tests and throwaway sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    entries: BTreeMap<String, String>,
    /// When set, every write fails without touching the entries
    pub fail_writes: bool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            return Err(eyre!("Write rejected for key {}", key));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.fail_writes {
            return Err(eyre!("Remove rejected for key {}", key));
        }
        self.entries.remove(key);
        Ok(())
    }
}

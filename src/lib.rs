// TaskBuddy - personal task tracking with a local snapshot store

pub mod clock;
pub mod config;
pub mod filter;
pub mod kv;
pub mod models;
pub mod persistence;
pub mod store;

// Re-export main types for convenience
pub use clock::{Clock, FixedClock, IdGenerator, SequentialIds, SystemClock, TimestampIds, now_ms};
pub use config::Config;
pub use filter::TaskFilter;
pub use kv::{KeyValue, MemoryKv, SqliteKv};
pub use models::{Category, CategoryFilter, ParseCategoryError, Stats, StatusFilter, Task, TaskId};
pub use persistence::{Export, KvPersistence, Loaded, PersistedSnapshot, Persistence, export_snapshot};
pub use store::TaskStore;

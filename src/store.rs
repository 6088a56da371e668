// Task store: canonical task list, selection state and derived views

use crate::clock::{Clock, IdGenerator, SystemClock, TimestampIds};
use crate::filter::TaskFilter;
use crate::kv::SqliteKv;
use crate::models::{Category, CategoryFilter, Stats, StatusFilter, Task, TaskId};
use crate::persistence::{KvPersistence, Persistence};
use eyre::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Pure state transitions over a task collection
///
/// Each returns the new collection, or `None` when the input leaves the
/// collection unchanged.
pub mod transition {
    use crate::models::{Task, TaskId};
    use std::collections::HashSet;
    use tracing::warn;

    pub fn append(tasks: &[Task], task: Task) -> Option<Vec<Task>> {
        if tasks.iter().any(|t| t.id == task.id) {
            return None;
        }
        let mut next = tasks.to_vec();
        next.push(task);
        Some(next)
    }

    pub fn toggle(tasks: &[Task], id: TaskId) -> Option<Vec<Task>> {
        let index = tasks.iter().position(|t| t.id == id)?;
        let mut next = tasks.to_vec();
        next[index].completed = !next[index].completed;
        Some(next)
    }

    pub fn remove(tasks: &[Task], id: TaskId) -> Option<Vec<Task>> {
        let index = tasks.iter().position(|t| t.id == id)?;
        let mut next = tasks.to_vec();
        next.remove(index);
        Some(next)
    }

    /// Trim task text and drop tasks left blank
    pub fn normalize(tasks: Vec<Task>) -> Vec<Task> {
        tasks
            .into_iter()
            .filter_map(|mut t| {
                let trimmed = t.text.trim();
                if trimmed.is_empty() {
                    warn!(id = t.id, "Dropping task with blank text");
                    return None;
                }
                if trimmed.len() != t.text.len() {
                    t.text = trimmed.to_string();
                }
                Some(t)
            })
            .collect()
    }

    /// Drop tasks whose id was already seen (first occurrence wins)
    pub fn dedupe(tasks: Vec<Task>) -> Vec<Task> {
        let mut seen = HashSet::new();
        tasks
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.id);
                if !fresh {
                    warn!(id = t.id, "Dropping task with duplicate id");
                }
                fresh
            })
            .collect()
    }
}

/// In-memory task list plus the selection state the presentation layer reads
///
/// Hydrated once from its `Persistence` on construction. Every mutation that
/// changes the collection is followed by a save.
pub struct TaskStore<P: Persistence> {
    tasks: Vec<Task>,
    active_category: Category,
    filter: TaskFilter,
    last_saved_at: Option<String>,
    persistence: P,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl TaskStore<KvPersistence<SqliteKv>> {
    /// Open the SQLite-backed store in `path` with the wall clock and timestamp ids
    pub fn open<Q: AsRef<Path>>(path: Q) -> Result<Self> {
        let kv = SqliteKv::open(path)?;
        Ok(Self::new(
            KvPersistence::new(kv),
            Box::new(SystemClock),
            Box::new(TimestampIds::default()),
        ))
    }
}

impl<P: Persistence> TaskStore<P> {
    pub fn new(mut persistence: P, clock: Box<dyn Clock>, mut ids: Box<dyn IdGenerator>) -> Self {
        let loaded = persistence.load();
        let tasks = transition::dedupe(transition::normalize(loaded.tasks));

        if let Some(max_id) = tasks.iter().map(|t| t.id).max() {
            ids.observe(max_id);
        }

        debug!(count = tasks.len(), "Task store hydrated");

        Self {
            tasks,
            active_category: Category::default(),
            filter: TaskFilter::default(),
            last_saved_at: loaded.last_saved_at,
            persistence,
            clock,
            ids,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a task; blank text is ignored and yields `None`
    ///
    /// `category` defaults to the active category.
    pub fn add_task(&mut self, text: &str, category: Option<Category>) -> Option<TaskId> {
        let text = text.trim();
        if text.is_empty() {
            debug!("add_task: ignoring blank text");
            return None;
        }

        let Some(id) = self.fresh_id() else {
            warn!("add_task: task ids exhausted");
            return None;
        };

        let task = Task {
            id,
            text: text.to_string(),
            category: category.unwrap_or(self.active_category),
            completed: false,
            created_at: self.clock.now(),
        };

        let next = transition::append(&self.tasks, task)?;
        self.commit(next);

        info!(id, "Added task");
        Some(id)
    }

    /// Flip `completed` on a task; returns false if no such task
    pub fn toggle_task(&mut self, id: TaskId) -> bool {
        match transition::toggle(&self.tasks, id) {
            Some(next) => {
                self.commit(next);
                debug!(id, "Toggled task");
                true
            }
            None => {
                debug!(id, "toggle_task: unknown id");
                false
            }
        }
    }

    /// Remove a task; returns false if no such task
    pub fn delete_task(&mut self, id: TaskId) -> bool {
        match transition::remove(&self.tasks, id) {
            Some(next) => {
                self.commit(next);
                info!(id, "Deleted task");
                true
            }
            None => {
                debug!(id, "delete_task: unknown id");
                false
            }
        }
    }

    /// Erase the stored snapshot, then empty the collection
    ///
    /// If the erase fails nothing changes and the error is returned. Callers
    /// are expected to have confirmed with the user first.
    pub fn clear_all(&mut self) -> Result<()> {
        self.persistence.erase()?;

        let removed = self.tasks.len();
        self.tasks.clear();
        self.last_saved_at = None;

        info!(removed, "Cleared all tasks");
        Ok(())
    }

    // ========================================================================
    // Selection state
    // ========================================================================

    pub fn set_filter_category(&mut self, category: CategoryFilter) {
        self.filter.category = category;
    }

    pub fn set_active_category(&mut self, category: Category) {
        self.active_category = category;
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.filter.status = status;
    }

    pub fn set_search(&mut self, search: Option<&str>) {
        self.filter.set_search(search);
    }

    pub fn active_category(&self) -> Category {
        self.active_category
    }

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All tasks, oldest first
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks passing the current filter, oldest first
    ///
    /// The iterator is `Clone`, so it can be walked more than once.
    pub fn filtered_tasks(&self) -> impl Iterator<Item = &Task> + Clone + '_ {
        let filter = &self.filter;
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    /// Counts over the whole collection, regardless of filter
    pub fn stats(&self) -> Stats {
        Stats::from_tasks(&self.tasks)
    }

    /// Task count per category over the whole collection (zero counts included)
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts: BTreeMap<Category, usize> = Category::ALL.iter().map(|c| (*c, 0)).collect();
        for task in &self.tasks {
            *counts.entry(task.category).or_insert(0) += 1;
        }
        counts
    }

    /// `lastSavedAt` of the most recent successful save (or of the loaded snapshot)
    pub fn last_saved_at(&self) -> Option<&str> {
        self.last_saved_at.as_deref()
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn fresh_id(&mut self) -> Option<TaskId> {
        loop {
            let id = self.ids.next_id()?;
            if self.get(id).is_none() {
                return Some(id);
            }
        }
    }

    /// Install the new collection, then persist it
    ///
    /// Save failures are logged; the in-memory collection stays authoritative.
    fn commit(&mut self, next: Vec<Task>) {
        self.tasks = next;

        match self.persistence.save(&self.tasks) {
            Ok(last_saved_at) => self.last_saved_at = Some(last_saved_at),
            Err(e) => warn!(count = self.tasks.len(), error = ?e, "Failed to save tasks"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIds};
    use crate::kv::{KeyValue, MemoryKv};
    use crate::persistence::{Loaded, SNAPSHOT_KEY};
    use chrono::{TimeZone, Utc};
    use eyre::eyre;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Persistence fake that records every call
    #[derive(Default)]
    struct RecordingPersistence {
        initial: Vec<Task>,
        stored: Option<Vec<Task>>,
        saves: usize,
        erases: usize,
        fail_saves: bool,
        fail_erase: bool,
    }

    impl Persistence for RecordingPersistence {
        fn load(&mut self) -> Loaded {
            Loaded {
                tasks: self.initial.clone(),
                last_saved_at: None,
            }
        }

        fn save(&mut self, tasks: &[Task]) -> Result<String> {
            if self.fail_saves {
                return Err(eyre!("disk full"));
            }
            self.saves += 1;
            self.stored = Some(tasks.to_vec());
            Ok(format!("save #{}", self.saves))
        }

        fn erase(&mut self) -> Result<()> {
            if self.fail_erase {
                return Err(eyre!("disk gone"));
            }
            self.erases += 1;
            self.stored = None;
            Ok(())
        }
    }

    fn clock() -> Box<dyn Clock> {
        Box::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()))
    }

    fn store_with(persistence: RecordingPersistence) -> TaskStore<RecordingPersistence> {
        TaskStore::new(persistence, clock(), Box::new(SequentialIds::default()))
    }

    fn store() -> TaskStore<RecordingPersistence> {
        store_with(RecordingPersistence::default())
    }

    fn texts<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<&'a str> {
        tasks.map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_add_task_appends_and_saves() {
        let mut store = store();

        let id = store.add_task("  Buy milk  ", Some(Category::Shopping)).unwrap();
        assert_eq!(id, 1);

        let task = store.get(id).unwrap();
        assert_eq!(task.text, "Buy milk");
        assert_eq!(task.category, Category::Shopping);
        assert!(!task.completed);
        assert_eq!(task.created_at, Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap());

        assert_eq!(store.persistence().saves, 1);
        assert_eq!(store.persistence().stored.as_deref(), Some(store.tasks()));
        assert_eq!(store.last_saved_at(), Some("save #1"));
    }

    #[test]
    fn test_add_task_blank_text_is_noop() {
        let mut store = store();

        assert_eq!(store.add_task("", None), None);
        assert_eq!(store.add_task("   \t", Some(Category::Work)), None);

        assert!(store.tasks().is_empty());
        assert_eq!(store.persistence().saves, 0);
    }

    #[test]
    fn test_add_task_uses_active_category() {
        let mut store = store();
        assert_eq!(store.active_category(), Category::Personal);

        store.set_active_category(Category::Health);
        let id = store.add_task("Stretch", None).unwrap();
        assert_eq!(store.get(id).unwrap().category, Category::Health);
    }

    #[test]
    fn test_ids_are_unique_and_order_preserved() {
        let mut store = store();
        let inputs = ["a", "", "b", "  ", "c", "d"];
        for text in inputs {
            store.add_task(text, None);
        }

        assert_eq!(store.tasks().len(), 4);
        assert_eq!(texts(store.tasks().iter()), vec!["a", "b", "c", "d"]);

        let ids: HashSet<TaskId> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_toggle_is_its_own_inverse() {
        let mut store = store();
        let first = store.add_task("first", None).unwrap();
        store.add_task("second", None);
        let before = store.tasks().to_vec();

        assert!(store.toggle_task(first));
        assert!(store.get(first).unwrap().completed);

        assert!(store.toggle_task(first));
        assert_eq!(store.tasks(), before.as_slice());
        assert_eq!(store.persistence().saves, 4);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let mut store = store();
        store.add_task("only", None);

        assert!(!store.toggle_task(99));
        assert!(!store.get(1).unwrap().completed);
        assert_eq!(store.persistence().saves, 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = store();
        store.add_task("a", None);
        let b = store.add_task("b", None).unwrap();
        store.add_task("c", None);

        assert!(store.delete_task(b));
        assert!(!store.delete_task(b));

        assert_eq!(texts(store.tasks().iter()), vec!["a", "c"]);
        assert_eq!(store.persistence().saves, 4);
    }

    #[test]
    fn test_deleting_last_task_saves_empty_collection() {
        let mut store = store();
        let id = store.add_task("lonely", None).unwrap();

        assert!(store.delete_task(id));
        assert_eq!(store.persistence().stored.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let mut store = store();
        let a = store.add_task("a", None).unwrap();
        store.delete_task(a);

        let b = store.add_task("b", None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_clear_all_erases_snapshot() {
        let mut store = store();
        store.add_task("a", None);
        store.add_task("b", None);

        store.clear_all().unwrap();

        assert!(store.tasks().is_empty());
        assert_eq!(store.last_saved_at(), None);
        assert_eq!(store.persistence().erases, 1);
        assert_eq!(store.persistence().stored, None);
    }

    #[test]
    fn test_clear_all_failure_leaves_tasks() {
        let mut store = store();
        store.add_task("a", None);
        store.add_task("b", None);

        let mut failing = RecordingPersistence {
            fail_erase: true,
            ..Default::default()
        };
        std::mem::swap(&mut store.persistence, &mut failing);

        assert!(store.clear_all().is_err());
        assert_eq!(store.tasks().len(), 2);
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        let mut store = store_with(RecordingPersistence {
            fail_saves: true,
            ..Default::default()
        });

        let id = store.add_task("kept anyway", None).unwrap();
        assert!(store.toggle_task(id));
        assert!(store.get(id).unwrap().completed);
        assert_eq!(store.last_saved_at(), None);
    }

    #[test]
    fn test_filtered_tasks() {
        let mut store = store();
        store.add_task("Buy milk", Some(Category::Shopping));
        store.add_task("Write report", Some(Category::Work));
        store.add_task("Review PR", Some(Category::Work));

        assert_eq!(
            texts(store.filtered_tasks()),
            vec!["Buy milk", "Write report", "Review PR"]
        );

        store.set_filter_category(CategoryFilter::Only(Category::Work));
        let view = store.filtered_tasks();
        assert_eq!(texts(view.clone()), vec!["Write report", "Review PR"]);
        // Restartable
        assert_eq!(view.count(), 2);

        store.set_filter_category(Category::Learning.into());
        assert_eq!(store.filtered_tasks().count(), 0);
    }

    #[test]
    fn test_filtered_tasks_status_and_search() {
        let mut store = store();
        let milk = store.add_task("Buy milk", Some(Category::Shopping)).unwrap();
        store.add_task("Buy bread", Some(Category::Shopping));
        store.add_task("Write report", Some(Category::Work));
        store.toggle_task(milk);

        store.set_status_filter(StatusFilter::Completed);
        assert_eq!(texts(store.filtered_tasks()), vec!["Buy milk"]);

        store.set_status_filter(StatusFilter::Active);
        store.set_search(Some("buy"));
        assert_eq!(texts(store.filtered_tasks()), vec!["Buy bread"]);

        store.set_search(None);
        assert_eq!(texts(store.filtered_tasks()), vec!["Buy bread", "Write report"]);
    }

    #[test]
    fn test_stats_ignore_filter() {
        let mut store = store();
        assert_eq!(store.stats(), Stats::default());

        let a = store.add_task("a", Some(Category::Work)).unwrap();
        store.add_task("b", Some(Category::Health));
        store.toggle_task(a);
        store.set_filter_category(CategoryFilter::Only(Category::Health));

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed + stats.remaining, stats.total);
        assert_eq!(stats.completion_percent, 50);
    }

    #[test]
    fn test_category_counts() {
        let mut store = store();
        store.add_task("a", Some(Category::Work));
        store.add_task("b", Some(Category::Work));
        store.add_task("c", Some(Category::Shopping));
        store.set_filter_category(CategoryFilter::Only(Category::Shopping));

        let counts = store.category_counts();
        assert_eq!(counts.len(), Category::ALL.len());
        assert_eq!(counts[&Category::Work], 2);
        assert_eq!(counts[&Category::Shopping], 1);
        assert_eq!(counts[&Category::Learning], 0);
    }

    #[test]
    fn test_hydrate_drops_duplicates_and_reserves_ids() {
        let created_at = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        let task = |id, text: &str| Task {
            id,
            text: text.to_string(),
            category: Category::Work,
            completed: false,
            created_at,
        };
        let mut store = store_with(RecordingPersistence {
            initial: vec![task(5, "first"), task(5, "duplicate"), task(7, "second")],
            ..Default::default()
        });

        assert_eq!(texts(store.tasks().iter()), vec!["first", "second"]);
        assert_eq!(store.persistence().saves, 0);

        let id = store.add_task("new", None).unwrap();
        assert_eq!(id, 8);
    }

    #[test]
    fn test_scenario_with_memory_backend() {
        let persistence = KvPersistence::new(MemoryKv::new());
        let mut store = TaskStore::new(persistence, clock(), Box::new(SequentialIds::default()));

        let milk = store.add_task("Buy milk", Some(Category::Shopping)).unwrap();
        store.add_task("Write report", Some(Category::Work));
        assert_eq!(
            store.stats(),
            Stats {
                total: 2,
                completed: 0,
                remaining: 2,
                completion_percent: 0
            }
        );

        store.toggle_task(milk);
        assert_eq!(
            store.stats(),
            Stats {
                total: 2,
                completed: 1,
                remaining: 1,
                completion_percent: 50
            }
        );

        store.set_filter_category(CategoryFilter::Only(Category::Work));
        assert_eq!(texts(store.filtered_tasks()), vec!["Write report"]);

        assert!(store.persistence().kv().get(SNAPSHOT_KEY).unwrap().is_some());
        store.clear_all().unwrap();
        assert!(store.tasks().is_empty());
        assert!(store.persistence().kv().get(SNAPSHOT_KEY).unwrap().is_none());
    }

    #[test]
    fn test_reopen_restores_tasks() {
        let temp = TempDir::new().unwrap();
        let saved = {
            let mut store = TaskStore::open(temp.path()).unwrap();
            let id = store.add_task("Persist me", Some(Category::Learning)).unwrap();
            store.add_task("And me", None);
            store.toggle_task(id);
            store.tasks().to_vec()
        };

        let store = TaskStore::open(temp.path()).unwrap();
        assert_eq!(store.tasks(), saved.as_slice());
        assert!(store.last_saved_at().is_some());
    }

    #[test]
    fn test_reopen_after_deleting_last_task_stays_empty() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = TaskStore::open(temp.path()).unwrap();
            let id = store.add_task("Gone soon", None).unwrap();
            store.delete_task(id);
        }

        let store = TaskStore::open(temp.path()).unwrap();
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_hydrate_trims_text_and_drops_blank_tasks() {
        let created_at = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        let task = |id, text: &str| Task {
            id,
            text: text.to_string(),
            category: Category::Health,
            completed: false,
            created_at,
        };
        let store = store_with(RecordingPersistence {
            initial: vec![task(1, "   "), task(2, "  Run 5k "), task(3, "")],
            ..Default::default()
        });

        assert_eq!(texts(store.filtered_tasks()), vec!["Run 5k"]);
        assert_eq!(store.tasks()[0].id, 2);
    }

    #[test]
    fn test_add_task_after_max_id_is_noop() {
        let mut kv = MemoryKv::new();
        kv.set(
            SNAPSHOT_KEY,
            r#"{"tasks":[{"id":18446744073709551615,"text":"last","category":"Work","completed":false,"createdAt":"2026-10-16T09:30:00Z"}]}"#,
        )
        .unwrap();
        let mut store = TaskStore::new(KvPersistence::new(kv), clock(), Box::new(SequentialIds::default()));
        assert_eq!(store.tasks().len(), 1);

        assert_eq!(store.add_task("new", None), None);
        assert_eq!(texts(store.tasks().iter()), vec!["last"]);

        let mut store = TaskStore::new(
            KvPersistence::new(store.persistence().kv().clone()),
            clock(),
            Box::new(TimestampIds::default()),
        );
        assert_eq!(store.add_task("new", None), None);
    }

    #[test]
    fn test_transition_append_rejects_duplicate_id() {
        let created_at = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        let task = Task {
            id: 1,
            text: "x".to_string(),
            category: Category::Work,
            completed: false,
            created_at,
        };
        let tasks = vec![task.clone()];
        assert_eq!(transition::append(&tasks, task), None);
    }
}

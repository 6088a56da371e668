// View filtering for the task list

use crate::models::{CategoryFilter, StatusFilter, Task};

/// Filter applied by `TaskStore::filtered_tasks`
///
/// All parts must match for a task to be shown. The default filter matches
/// every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Category selection (`All` or a single category)
    pub category: CategoryFilter,
    /// Completion status selection
    pub status: StatusFilter,
    /// Lowercased search needle, matched as a substring of the task text
    search: Option<String>,
}

impl TaskFilter {
    pub fn new(category: CategoryFilter) -> Self {
        Self {
            category,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.set_search(search);
        self
    }

    /// Blank queries clear the search
    pub fn set_search(&mut self, search: Option<&str>) {
        self.search = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.category.matches(task.category)
            && self.status.matches(task.completed)
            && self
                .search
                .as_deref()
                .is_none_or(|needle| task.text.to_lowercase().contains(needle))
    }
}

impl std::fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "category={} status={}", self.category, self.status)?;
        if let Some(needle) = &self.search {
            write!(f, " search={:?}", needle)?;
        }
        Ok(())
    }
}

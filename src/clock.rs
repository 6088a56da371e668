// Injected time and id sources

use crate::models::TaskId;
use chrono::{DateTime, Utc};

/// Source of "now" for task creation and snapshot timestamps
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for deterministic tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of fresh task ids
///
/// Implementations must be strictly increasing so an id is never handed out twice.
/// `None` means the id space is exhausted.
pub trait IdGenerator {
    fn next_id(&mut self) -> Option<TaskId>;

    /// Record an id that already exists (e.g. loaded from disk) so it is never reissued
    fn observe(&mut self, id: TaskId);
}

/// Millisecond-timestamp ids, bumped by one when two tasks land in the same millisecond
#[derive(Debug, Clone, Default)]
pub struct TimestampIds {
    last: TaskId,
}

impl IdGenerator for TimestampIds {
    fn next_id(&mut self) -> Option<TaskId> {
        let now = now_ms().max(0) as TaskId;
        self.last = now.max(self.last.checked_add(1)?);
        Some(self.last)
    }

    fn observe(&mut self, id: TaskId) {
        self.last = self.last.max(id);
    }
}

/// Ids 1, 2, 3, ... for deterministic tests
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    last: TaskId,
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> Option<TaskId> {
        self.last = self.last.checked_add(1)?;
        Some(self.last)
    }

    fn observe(&mut self, id: TaskId) {
        self.last = self.last.max(id);
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

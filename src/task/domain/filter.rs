//! Task query filters and orderings.

use super::{Task, TaskId};
use chrono::{DateTime, Utc};

/// Criteria for listing tasks.
///
/// Values within one dimension are OR'd together; dimensions are AND'd. An
/// empty dimension does not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Match any of these task identifiers.
    pub ids: Vec<TaskId>,
    /// Match any of these task types.
    pub types: Vec<String>,
    /// Match tasks whose latest status is any of these values.
    pub statuses: Vec<String>,
    /// Match tasks carrying a behavior of any of these types.
    pub behavior_types: Vec<String>,
    /// Match tasks owned by any of these users.
    pub usernames: Vec<String>,
    /// Match tasks started at or after any of these instants.
    pub start_date_since: Vec<DateTime<Utc>>,
    /// Match tasks started before any of these instants.
    pub start_date_before: Vec<DateTime<Utc>>,
    /// Match tasks completed at or after any of these instants.
    pub end_date_since: Vec<DateTime<Utc>>,
    /// Match tasks completed before any of these instants.
    pub end_date_before: Vec<DateTime<Utc>>,
    /// Also match incomplete tasks when an end-date predicate is present.
    pub include_null_end: bool,
}

impl TaskFilter {
    /// Creates an empty filter matching every task.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given identifiers.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Restricts to the given task types.
    #[must_use]
    pub fn with_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Restricts to tasks whose latest status is one of the given values.
    #[must_use]
    pub fn with_statuses<S: Into<String>>(mut self, statuses: impl IntoIterator<Item = S>) -> Self {
        self.statuses.extend(statuses.into_iter().map(Into::into));
        self
    }

    /// Restricts to tasks carrying one of the given behavior types.
    #[must_use]
    pub fn with_behavior_types<S: Into<String>>(
        mut self,
        behavior_types: impl IntoIterator<Item = S>,
    ) -> Self {
        self.behavior_types
            .extend(behavior_types.into_iter().map(Into::into));
        self
    }

    /// Restricts to the given owners.
    #[must_use]
    pub fn with_usernames<S: Into<String>>(
        mut self,
        usernames: impl IntoIterator<Item = S>,
    ) -> Self {
        self.usernames.extend(usernames.into_iter().map(Into::into));
        self
    }

    /// Adds a start-date lower bound (inclusive).
    #[must_use]
    pub fn started_since(mut self, instant: DateTime<Utc>) -> Self {
        self.start_date_since.push(instant);
        self
    }

    /// Adds a start-date upper bound (exclusive).
    #[must_use]
    pub fn started_before(mut self, instant: DateTime<Utc>) -> Self {
        self.start_date_before.push(instant);
        self
    }

    /// Adds an end-date lower bound (inclusive).
    #[must_use]
    pub fn ended_since(mut self, instant: DateTime<Utc>) -> Self {
        self.end_date_since.push(instant);
        self
    }

    /// Adds an end-date upper bound (exclusive).
    #[must_use]
    pub fn ended_before(mut self, instant: DateTime<Utc>) -> Self {
        self.end_date_before.push(instant);
        self
    }

    /// Also includes incomplete tasks when end-date bounds are present.
    #[must_use]
    pub const fn including_null_end(mut self) -> Self {
        self.include_null_end = true;
        self
    }

    /// Returns `true` when any end-date bound is present.
    #[must_use]
    pub fn has_end_date_bounds(&self) -> bool {
        !self.end_date_since.is_empty() || !self.end_date_before.is_empty()
    }

    /// Evaluates the task-row predicates against a task.
    ///
    /// Status and behavior predicates need the task's children and are
    /// evaluated by the store; this covers ids, types, owners, and dates.
    #[must_use]
    pub fn matches_row(&self, task: &Task) -> bool {
        let start = task.start_date();
        any_or_empty(&self.ids, |id| *id == task.id())
            && any_or_empty(&self.types, |task_type| task_type == task.task_type())
            && any_or_empty(&self.usernames, |username| {
                task.username() == Some(username.as_str())
            })
            && any_or_empty(&self.start_date_since, |since| start >= *since)
            && any_or_empty(&self.start_date_before, |before| start < *before)
            && self.matches_end_date(task.end_date())
    }

    fn matches_end_date(&self, end_date: Option<DateTime<Utc>>) -> bool {
        if !self.has_end_date_bounds() {
            return true;
        }
        let Some(end) = end_date else {
            return self.include_null_end;
        };
        any_or_empty(&self.end_date_since, |since| end >= *since)
            && any_or_empty(&self.end_date_before, |before| end < *before)
    }
}

fn any_or_empty<T>(values: &[T], predicate: impl FnMut(&T) -> bool) -> bool {
    values.is_empty() || values.iter().any(predicate)
}

/// Result orderings supported by task queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskOrder {
    /// Creation order: `start_date` ascending, then identifier.
    #[default]
    Creation,
    /// Completed tasks first, then creation order.
    CompletedFirst,
}

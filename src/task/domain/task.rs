//! Task aggregate and creation payload.

use super::{Children, NewTaskStatus, TaskBehavior, TaskDomainError, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tracked unit of external work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    #[serde(rename = "type")]
    task_type: String,
    username: Option<String>,
    data: Option<Value>,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Children::is_not_loaded")]
    behaviors: Children<TaskBehavior>,
    #[serde(default, skip_serializing_if = "Children::is_not_loaded")]
    statuses: Children<TaskStatus>,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted task type.
    pub task_type: String,
    /// Persisted owner, if any.
    pub username: Option<String>,
    /// Persisted payload, if any.
    pub data: Option<Value>,
    /// Persisted start timestamp.
    pub start_date: DateTime<Utc>,
    /// Persisted completion timestamp, if completed.
    pub end_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Reconstructs a task from persisted storage without children.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            task_type: data.task_type,
            username: data.username,
            data: data.data,
            start_date: data.start_date,
            end_date: data.end_date,
            behaviors: Children::NotLoaded,
            statuses: Children::NotLoaded,
        }
    }

    /// Attaches loaded behaviors and statuses.
    #[must_use]
    pub fn with_children(
        mut self,
        behaviors: Vec<TaskBehavior>,
        statuses: Vec<TaskStatus>,
    ) -> Self {
        self.behaviors = Children::Loaded(behaviors);
        self.statuses = Children::Loaded(statuses);
        self
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Returns the owning username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the task payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Returns the completion timestamp, if completed.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Returns `true` once the task has been completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.end_date.is_some()
    }

    /// Returns the behaviors collection.
    #[must_use]
    pub const fn behaviors(&self) -> &Children<TaskBehavior> {
        &self.behaviors
    }

    /// Returns the statuses collection.
    #[must_use]
    pub const fn statuses(&self) -> &Children<TaskStatus> {
        &self.statuses
    }

    /// Returns the attached behavior of the given type, if loaded and present.
    #[must_use]
    pub fn behavior(&self, behavior_type: &str) -> Option<&TaskBehavior> {
        self.behaviors
            .as_slice()
            .iter()
            .find(|behavior| behavior.behavior_type() == behavior_type)
    }

    /// Returns the most recent status by `created_date`.
    ///
    /// Ties resolve to the last tied status in load order. Returns `None` when
    /// statuses are not loaded or there are none.
    #[must_use]
    pub fn latest_status(&self) -> Option<&TaskStatus> {
        self.statuses
            .as_slice()
            .iter()
            .max_by_key(|status| status.created_date())
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(rename = "type", default)]
    task_type: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    statuses: Vec<NewTaskStatus>,
    #[serde(default)]
    behaviors: Vec<TaskBehavior>,
}

impl NewTask {
    /// Creates a payload for a task of the given type.
    #[must_use]
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            username: None,
            data: None,
            start_date: None,
            statuses: Vec::new(),
            behaviors: Vec::new(),
        }
    }

    /// Sets the owning username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the task payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets an explicit start timestamp instead of the creation time.
    #[must_use]
    pub const fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Adds an initial status.
    #[must_use]
    pub fn with_status(mut self, status: NewTaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Adds a behavior.
    #[must_use]
    pub fn with_behavior(mut self, behavior: TaskBehavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Returns the task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Returns the owning username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the task payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns the explicit start timestamp, if any.
    #[must_use]
    pub const fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    /// Returns the initial statuses.
    #[must_use]
    pub fn statuses(&self) -> &[NewTaskStatus] {
        &self.statuses
    }

    /// Returns the initial behaviors.
    #[must_use]
    pub fn behaviors(&self) -> &[TaskBehavior] {
        &self.behaviors
    }

    /// Validates the payload before anything is written.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskDomainError`] for an empty type, a behavior without a
    /// type, more than one initial status, or a blank initial status.
    pub fn validate(&self) -> Result<(), TaskDomainError> {
        if self.task_type.trim().is_empty() {
            return Err(TaskDomainError::EmptyTaskType);
        }
        for behavior in &self.behaviors {
            behavior.validate()?;
        }
        if self.statuses.len() > 1 {
            return Err(TaskDomainError::TooManyInitialStatuses(self.statuses.len()));
        }
        if let Some(status) = self.statuses.first() {
            status.validate()?;
        }
        Ok(())
    }
}

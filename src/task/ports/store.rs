//! Store port for transactional task persistence and lookup.

use crate::task::domain::{
    NewTask, NewTaskStatus, Task, TaskBehavior, TaskDomainError, TaskFilter, TaskId, TaskOrder,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Operations available inside one store transaction.
///
/// Implementations run synchronously on a connection owned by the enclosing
/// [`TaskStore::transaction`] call. Nothing written here is visible to other
/// transactions until the closure returns `Ok`.
pub trait TaskTransaction {
    /// Finds a task by identifier, optionally loading behaviors and statuses.
    ///
    /// Returns `None` when the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lookup fails.
    fn get_task(&mut self, id: TaskId, include_children: bool) -> TaskStoreResult<Option<Task>>;

    /// Lists tasks matching the filter, without children.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the query fails.
    fn get_tasks_by_filter(
        &mut self,
        filter: &TaskFilter,
        order: TaskOrder,
    ) -> TaskStoreResult<Vec<Task>>;

    /// Counts all stored tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the query fails.
    fn count_tasks(&mut self) -> TaskStoreResult<u64>;

    /// Inserts a task with its initial status and behaviors.
    ///
    /// The store assigns the identifier and, unless the payload supplies one,
    /// the start date.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Validation`] when the payload is invalid and
    /// [`TaskStoreError::Persistence`] when the insert fails.
    fn insert_task(&mut self, task: &NewTask) -> TaskStoreResult<TaskId>;

    /// Appends a status to an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist and
    /// [`TaskStoreError::Validation`] when the status is blank.
    fn insert_task_status(
        &mut self,
        status: &NewTaskStatus,
        task_id: TaskId,
    ) -> TaskStoreResult<()>;

    /// Attaches a behavior to an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist,
    /// [`TaskStoreError::DuplicateBehavior`] when the task already carries a
    /// behavior of the same type, and [`TaskStoreError::Validation`] when the
    /// behavior has no type.
    fn insert_task_behavior(
        &mut self,
        behavior: &TaskBehavior,
        task_id: TaskId,
    ) -> TaskStoreResult<()>;

    /// Sets the task's end date to the current time if it is not already set.
    ///
    /// Completing a completed task succeeds and leaves the end date unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    fn complete_task(&mut self, id: TaskId) -> TaskStoreResult<()>;

    /// Deletes a task together with its statuses and behaviors.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    fn delete_task(&mut self, id: TaskId) -> TaskStoreResult<()>;

    /// Takes the insert lock for `task_type`, waiting while another open
    /// transaction holds it.
    ///
    /// The lock is held until the enclosing transaction ends. Start dates
    /// assigned after the lock is taken therefore follow commit order among
    /// transactions that lock the same type.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Persistence`] when the lock cannot be taken.
    fn lock_task_type(&mut self, task_type: &str) -> TaskStoreResult<()>;
}

/// Transactional task persistence contract.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Runs `work` in one transaction that rolls back if `cancel` fires.
    ///
    /// The transaction commits when `work` returns `Ok` and the token has not
    /// been cancelled; otherwise every write made by `work` is discarded.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, [`TaskStoreError::Cancelled`]
    /// when the token fired before commit, or
    /// [`TaskStoreError::Persistence`] when the transaction cannot be run.
    async fn transaction_until<T, F>(
        &self,
        cancel: &CancellationToken,
        work: F,
    ) -> TaskStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TaskTransaction) -> TaskStoreResult<T> + Send + 'static;

    /// Runs `work` in one transaction that cannot be cancelled.
    ///
    /// # Errors
    ///
    /// See [`TaskStore::transaction_until`].
    async fn transaction<T, F>(&self, work: F) -> TaskStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TaskTransaction) -> TaskStoreResult<T> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        self.transaction_until(&cancel, work).await
    }
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// The payload failed validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] TaskDomainError),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The task already carries a behavior of this type.
    #[error("task {task_id} already has a behavior of type '{behavior_type}'")]
    DuplicateBehavior {
        /// Task the behavior was being attached to.
        task_id: TaskId,
        /// The duplicated behavior type.
        behavior_type: String,
    },

    /// The transaction was cancelled before it committed.
    #[error("transaction cancelled before commit")]
    Cancelled,

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

//! Service layer for creating, querying, and updating tasks.
//!
//! Every operation runs in exactly one store transaction, so a request either
//! applies completely or not at all.

use crate::task::{
    domain::{
        NewTask, NewTaskStatus, Task, TaskBehavior, TaskDomainError, TaskFilter, TaskId, TaskOrder,
    },
    ports::{TaskStore, TaskStoreError},
};
use std::sync::Arc;
use thiserror::Error;

/// Coarse classification of a service failure.
///
/// Callers map these onto their own status vocabulary; the HTTP layer turns
/// them into 400, 404, and 500 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was malformed or violated a domain rule.
    BadInput,
    /// The referenced task does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

/// Service-level errors for task operations.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    /// Payload validation failed before touching the store.
    #[error(transparent)]
    Validation(#[from] TaskDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl TaskServiceError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::BadInput,
            Self::Store(err) => match err {
                TaskStoreError::Validation(_) | TaskStoreError::DuplicateBehavior { .. } => {
                    ErrorKind::BadInput
                }
                TaskStoreError::NotFound(_) => ErrorKind::NotFound,
                TaskStoreError::Cancelled | TaskStoreError::Persistence(_) => ErrorKind::Internal,
            },
        }
    }
}

/// Result type for task service operations.
pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Task orchestration service over a [`TaskStore`].
pub struct TaskService<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TaskStore> TaskService<S> {
    /// Creates a new task service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fetches a task with its behaviors and statuses.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    pub async fn get_task(&self, id: TaskId) -> TaskServiceResult<Task> {
        let task = self
            .store
            .transaction(move |tx| tx.get_task(id, true))
            .await?;
        task.ok_or(TaskServiceError::Store(TaskStoreError::NotFound(id)))
    }

    /// Deletes a task and everything attached to it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    pub async fn delete_task(&self, id: TaskId) -> TaskServiceResult<()> {
        self.store
            .transaction(move |tx| {
                if tx.get_task(id, false)?.is_none() {
                    return Err(TaskStoreError::NotFound(id));
                }
                tx.delete_task(id)
            })
            .await?;
        Ok(())
    }

    /// Lists tasks matching a filter, in creation order and without children.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] when the query fails.
    pub async fn list_tasks(&self, filter: TaskFilter) -> TaskServiceResult<Vec<Task>> {
        let tasks = self
            .store
            .transaction(move |tx| tx.get_tasks_by_filter(&filter, TaskOrder::Creation))
            .await?;
        Ok(tasks)
    }

    /// Creates a task with its initial status and behaviors.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Validation`] when the payload is invalid
    /// and [`TaskServiceError::Store`] when persistence fails.
    pub async fn create_task(&self, task: NewTask) -> TaskServiceResult<TaskId> {
        task.validate()?;
        let id = self
            .store
            .transaction(move |tx| tx.insert_task(&task))
            .await?;
        tracing::debug!(task_id = %id, "task created");
        Ok(id)
    }

    /// Appends a status, completing the task in the same transaction when
    /// `complete` is set.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Validation`] for a blank status and
    /// [`TaskStoreError::NotFound`] when the task does not exist.
    pub async fn add_status(
        &self,
        id: TaskId,
        status: NewTaskStatus,
        complete: bool,
    ) -> TaskServiceResult<()> {
        status.validate()?;
        self.store
            .transaction(move |tx| {
                tx.insert_task_status(&status, id)?;
                if complete {
                    tx.complete_task(id)?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Attaches a behavior to a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Validation`] for an empty behavior type,
    /// [`TaskStoreError::DuplicateBehavior`] when one of that type exists, and
    /// [`TaskStoreError::NotFound`] when the task does not exist.
    pub async fn add_behavior(&self, id: TaskId, behavior: TaskBehavior) -> TaskServiceResult<()> {
        behavior.validate()?;
        self.store
            .transaction(move |tx| tx.insert_task_behavior(&behavior, id))
            .await?;
        Ok(())
    }

    /// Counts all stored tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskServiceError::Store`] when the query fails.
    pub async fn count_tasks(&self) -> TaskServiceResult<u64> {
        Ok(self.store.transaction(|tx| tx.count_tasks()).await?)
    }
}

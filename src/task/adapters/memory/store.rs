//! In-memory task store for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::{Clock, DefaultClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::task::{
    domain::{
        NewTask, NewTaskStatus, PersistedTaskData, Task, TaskBehavior, TaskFilter, TaskId,
        TaskOrder, TaskStatus,
    },
    ports::{TaskStore, TaskStoreError, TaskStoreResult, TaskTransaction},
};

/// Thread-safe in-memory task store.
///
/// Transactions are serialized and run against a copy of the state that
/// replaces the shared state only on commit. Timestamps come from the
/// injected clock.
#[derive(Debug)]
pub struct InMemoryTaskStore<C = DefaultClock> {
    state: Arc<Mutex<InMemoryTaskState>>,
    clock: Arc<C>,
}

#[derive(Debug, Clone, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, StoredTask>,
}

#[derive(Debug, Clone)]
struct StoredTask {
    row: PersistedTaskData,
    behaviors: Vec<TaskBehavior>,
    statuses: Vec<TaskStatus>,
}

impl StoredTask {
    fn to_task(&self, include_children: bool) -> Task {
        let task = Task::from_persisted(self.row.clone());
        if include_children {
            task.with_children(self.behaviors.clone(), self.statuses.clone())
        } else {
            task
        }
    }
}

impl InMemoryTaskStore<DefaultClock> {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryTaskStore<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryTaskStore<C> {
    /// Creates an empty store that timestamps writes with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryTaskState::default())),
            clock,
        }
    }
}

impl<C> Clone for InMemoryTaskStore<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl<C> TaskStore for InMemoryTaskStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn transaction_until<T, F>(
        &self,
        cancel: &CancellationToken,
        work: F,
    ) -> TaskStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TaskTransaction) -> TaskStoreResult<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(TaskStoreError::Cancelled);
        }

        let mut shared = self.state.lock().map_err(|err| {
            TaskStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut working = shared.clone();
        let value = {
            let mut transaction = InMemoryTransaction {
                state: &mut working,
                clock: &*self.clock,
            };
            work(&mut transaction)?
        };

        if cancel.is_cancelled() {
            return Err(TaskStoreError::Cancelled);
        }
        *shared = working;
        Ok(value)
    }
}

struct InMemoryTransaction<'a, C> {
    state: &'a mut InMemoryTaskState,
    clock: &'a C,
}

impl<C: Clock> InMemoryTransaction<'_, C> {
    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    fn existing(&mut self, id: TaskId) -> TaskStoreResult<&mut StoredTask> {
        self.state
            .tasks
            .get_mut(&id)
            .ok_or(TaskStoreError::NotFound(id))
    }
}

fn matches_children(filter: &TaskFilter, stored: &StoredTask) -> bool {
    let status_matches = filter.statuses.is_empty()
        || stored
            .to_task(true)
            .latest_status()
            .is_some_and(|latest| filter.statuses.iter().any(|s| s == latest.status()));
    let behavior_matches = filter.behavior_types.is_empty()
        || stored.behaviors.iter().any(|behavior| {
            filter
                .behavior_types
                .iter()
                .any(|wanted| wanted == behavior.behavior_type())
        });
    status_matches && behavior_matches
}

fn sort_tasks(tasks: &mut [Task], order: TaskOrder) {
    match order {
        TaskOrder::Creation => tasks.sort_by_key(|task| (task.start_date(), task.id())),
        TaskOrder::CompletedFirst => {
            tasks.sort_by_key(|task| (!task.is_complete(), task.start_date(), task.id()));
        }
    }
}

impl<C: Clock> TaskTransaction for InMemoryTransaction<'_, C> {
    fn get_task(&mut self, id: TaskId, include_children: bool) -> TaskStoreResult<Option<Task>> {
        Ok(self
            .state
            .tasks
            .get(&id)
            .map(|stored| stored.to_task(include_children)))
    }

    fn get_tasks_by_filter(
        &mut self,
        filter: &TaskFilter,
        order: TaskOrder,
    ) -> TaskStoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .state
            .tasks
            .values()
            .filter(|stored| matches_children(filter, stored))
            .map(|stored| stored.to_task(false))
            .filter(|task| filter.matches_row(task))
            .collect();
        sort_tasks(&mut tasks, order);
        Ok(tasks)
    }

    fn count_tasks(&mut self) -> TaskStoreResult<u64> {
        u64::try_from(self.state.tasks.len())
            .map_err(TaskStoreError::persistence)
    }

    fn insert_task(&mut self, task: &NewTask) -> TaskStoreResult<TaskId> {
        task.validate()?;

        let now = self.now();
        let id = TaskId::new();
        let row = PersistedTaskData {
            id,
            task_type: task.task_type().to_owned(),
            username: task.username().map(str::to_owned),
            data: task.data().cloned(),
            start_date: task.start_date().unwrap_or(now),
            end_date: None,
        };
        let statuses = task
            .statuses()
            .iter()
            .map(|status| {
                TaskStatus::from_persisted(
                    status.status().to_owned(),
                    status.detail().map(str::to_owned),
                    now,
                )
            })
            .collect();

        let mut behaviors: Vec<TaskBehavior> = Vec::with_capacity(task.behaviors().len());
        for behavior in task.behaviors() {
            if behaviors
                .iter()
                .any(|existing| existing.behavior_type() == behavior.behavior_type())
            {
                return Err(TaskStoreError::DuplicateBehavior {
                    task_id: id,
                    behavior_type: behavior.behavior_type().to_owned(),
                });
            }
            behaviors.push(behavior.clone());
        }

        self.state.tasks.insert(
            id,
            StoredTask {
                row,
                behaviors,
                statuses,
            },
        );
        Ok(id)
    }

    fn insert_task_status(
        &mut self,
        status: &NewTaskStatus,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        status.validate()?;
        let now = self.now();
        let stored = self.existing(task_id)?;
        stored.statuses.push(TaskStatus::from_persisted(
            status.status().to_owned(),
            status.detail().map(str::to_owned),
            now,
        ));
        Ok(())
    }

    fn insert_task_behavior(
        &mut self,
        behavior: &TaskBehavior,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        behavior.validate()?;
        let stored = self.existing(task_id)?;
        if stored
            .behaviors
            .iter()
            .any(|existing| existing.behavior_type() == behavior.behavior_type())
        {
            return Err(TaskStoreError::DuplicateBehavior {
                task_id,
                behavior_type: behavior.behavior_type().to_owned(),
            });
        }
        stored.behaviors.push(behavior.clone());
        Ok(())
    }

    fn complete_task(&mut self, id: TaskId) -> TaskStoreResult<()> {
        let now = self.now();
        let stored = self.existing(id)?;
        if stored.row.end_date.is_none() {
            stored.row.end_date = Some(now);
        }
        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> TaskStoreResult<()> {
        self.state
            .tasks
            .remove(&id)
            .map(|_| ())
            .ok_or(TaskStoreError::NotFound(id))
    }

    fn lock_task_type(&mut self, _task_type: &str) -> TaskStoreResult<()> {
        // Transactions already hold the state mutex for their whole run.
        Ok(())
    }
}

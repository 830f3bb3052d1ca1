//! `PostgreSQL` task store implementation.

use super::{
    filter::filtered_tasks,
    models::{BehaviorRow, NewStatusRow, NewTaskRow, StatusRow, TaskRow},
    schema::{task_behaviors, task_statuses, tasks},
};
use crate::task::{
    domain::{
        NewTask, NewTaskStatus, PersistedTaskData, Task, TaskBehavior, TaskFilter, TaskId,
        TaskOrder, TaskStatus,
    },
    ports::{TaskStore, TaskStoreError, TaskStoreResult, TaskTransaction},
};
use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Nullable, Text, Timestamptz};
use tokio_util::sync::CancellationToken;

/// `PostgreSQL` connection pool type used by the task store.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
///
/// Each transaction borrows one pooled connection on the blocking thread
/// pool. Timestamps are assigned by the database server.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
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
        let pool = self.pool.clone();
        let deadline = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut pooled = pool.get().map_err(TaskStoreError::persistence)?;
            let connection: &mut PgConnection = &mut pooled;
            connection.transaction::<T, TaskStoreError, _>(|conn| {
                let value = work(&mut PgTaskTransaction { conn })?;
                // Rolls back work that outlived its deadline.
                if deadline.is_cancelled() {
                    return Err(TaskStoreError::Cancelled);
                }
                Ok(value)
            })
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

struct PgTaskTransaction<'a> {
    conn: &'a mut PgConnection,
}

impl PgTaskTransaction<'_> {
    fn ensure_exists(&mut self, id: TaskId) -> TaskStoreResult<()> {
        let exists = diesel::select(diesel::dsl::exists(tasks::table.find(id.into_inner())))
            .get_result::<bool>(self.conn)?;
        if exists {
            Ok(())
        } else {
            Err(TaskStoreError::NotFound(id))
        }
    }

    fn insert_behavior_row(
        &mut self,
        behavior: &TaskBehavior,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        let row = BehaviorRow {
            task_id: task_id.into_inner(),
            behavior_type: behavior.behavior_type().to_owned(),
            data: behavior.data().cloned(),
        };
        diesel::insert_into(task_behaviors::table)
            .values(&row)
            .execute(self.conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    TaskStoreError::DuplicateBehavior {
                        task_id,
                        behavior_type: row.behavior_type.clone(),
                    }
                }
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    TaskStoreError::NotFound(task_id)
                }
                _ => TaskStoreError::persistence(err),
            })?;
        Ok(())
    }

    fn insert_status_row(
        &mut self,
        status: &NewTaskStatus,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        let row = NewStatusRow {
            id: uuid::Uuid::new_v4(),
            task_id: task_id.into_inner(),
            status: status.status().to_owned(),
            detail: status.detail().map(str::to_owned),
        };
        diesel::insert_into(task_statuses::table)
            .values(&row)
            .execute(self.conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    TaskStoreError::NotFound(task_id)
                }
                _ => TaskStoreError::persistence(err),
            })?;
        Ok(())
    }
}

impl TaskTransaction for PgTaskTransaction<'_> {
    fn get_task(&mut self, id: TaskId, include_children: bool) -> TaskStoreResult<Option<Task>> {
        let uuid = id.into_inner();
        let Some(row) = tasks::table
            .find(uuid)
            .select(TaskRow::as_select())
            .first::<TaskRow>(self.conn)
            .optional()?
        else {
            return Ok(None);
        };
        let task = row_to_task(row);
        if !include_children {
            return Ok(Some(task));
        }

        let behaviors = task_behaviors::table
            .filter(task_behaviors::task_id.eq(uuid))
            .order(task_behaviors::behavior_type.asc())
            .select(BehaviorRow::as_select())
            .load::<BehaviorRow>(self.conn)?
            .into_iter()
            .map(|behavior| TaskBehavior::from_persisted(behavior.behavior_type, behavior.data))
            .collect();
        let statuses = task_statuses::table
            .filter(task_statuses::task_id.eq(uuid))
            .order((task_statuses::created_date.asc(), task_statuses::seq.asc()))
            .select(StatusRow::as_select())
            .load::<StatusRow>(self.conn)?
            .into_iter()
            .map(|status| {
                TaskStatus::from_persisted(status.status, status.detail, status.created_date)
            })
            .collect();
        Ok(Some(task.with_children(behaviors, statuses)))
    }

    fn get_tasks_by_filter(
        &mut self,
        filter: &TaskFilter,
        order: TaskOrder,
    ) -> TaskStoreResult<Vec<Task>> {
        let rows = filtered_tasks(filter, order).load::<TaskRow>(self.conn)?;
        Ok(rows.into_iter().map(row_to_task).collect())
    }

    fn count_tasks(&mut self) -> TaskStoreResult<u64> {
        let count = tasks::table.count().get_result::<i64>(self.conn)?;
        u64::try_from(count).map_err(TaskStoreError::persistence)
    }

    fn insert_task(&mut self, task: &NewTask) -> TaskStoreResult<TaskId> {
        task.validate()?;

        let id = TaskId::new();
        let row = NewTaskRow {
            id: id.into_inner(),
            task_type: task.task_type().to_owned(),
            username: task.username().map(str::to_owned),
            data: task.data().cloned(),
            start_date: task.start_date(),
        };
        diesel::insert_into(tasks::table)
            .values(&row)
            .execute(self.conn)?;

        for status in task.statuses() {
            self.insert_status_row(status, id)?;
        }
        for behavior in task.behaviors() {
            self.insert_behavior_row(behavior, id)?;
        }
        Ok(id)
    }

    fn insert_task_status(
        &mut self,
        status: &NewTaskStatus,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        status.validate()?;
        self.ensure_exists(task_id)?;
        self.insert_status_row(status, task_id)
    }

    fn insert_task_behavior(
        &mut self,
        behavior: &TaskBehavior,
        task_id: TaskId,
    ) -> TaskStoreResult<()> {
        behavior.validate()?;
        self.ensure_exists(task_id)?;
        self.insert_behavior_row(behavior, task_id)
    }

    fn complete_task(&mut self, id: TaskId) -> TaskStoreResult<()> {
        self.ensure_exists(id)?;
        diesel::update(
            tasks::table
                .find(id.into_inner())
                .filter(tasks::end_date.is_null()),
        )
        .set(tasks::end_date.eq(sql::<Nullable<Timestamptz>>("now()")))
        .execute(self.conn)?;
        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> TaskStoreResult<()> {
        let deleted = diesel::delete(tasks::table.find(id.into_inner()))
            .execute(self.conn)?;
        if deleted == 0 {
            return Err(TaskStoreError::NotFound(id));
        }
        Ok(())
    }

    fn lock_task_type(&mut self, task_type: &str) -> TaskStoreResult<()> {
        diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind::<Text, _>(task_type)
            .execute(self.conn)?;
        Ok(())
    }
}

fn row_to_task(row: TaskRow) -> Task {
    Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(row.id),
        task_type: row.task_type,
        username: row.username,
        data: row.data,
        start_date: row.start_date,
        end_date: row.end_date,
    })
}

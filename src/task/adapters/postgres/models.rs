//! Diesel row models for task persistence.

use super::schema::{task_behaviors, task_statuses, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type.
    pub task_type: String,
    /// Owning username.
    pub username: Option<String>,
    /// Task payload.
    pub data: Option<Value>,
    /// Start timestamp.
    pub start_date: DateTime<Utc>,
    /// Completion timestamp.
    pub end_date: Option<DateTime<Utc>>,
}

/// Insert model for task records.
///
/// A `None` start date inserts the column default, `clock_timestamp()`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Task type.
    pub task_type: String,
    /// Owning username.
    pub username: Option<String>,
    /// Task payload.
    pub data: Option<Value>,
    /// Explicit start timestamp.
    pub start_date: Option<DateTime<Utc>>,
}

/// Query result row for status records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_statuses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StatusRow {
    /// Status value.
    pub status: String,
    /// Optional status detail.
    pub detail: Option<String>,
    /// Creation timestamp.
    pub created_date: DateTime<Utc>,
}

/// Insert model for status records; `created_date` takes the column default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_statuses)]
pub struct NewStatusRow {
    /// Status row identifier.
    pub id: uuid::Uuid,
    /// Owning task.
    pub task_id: uuid::Uuid,
    /// Status value.
    pub status: String,
    /// Optional status detail.
    pub detail: Option<String>,
}

/// Query and insert model for behavior records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_behaviors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BehaviorRow {
    /// Owning task.
    pub task_id: uuid::Uuid,
    /// Behavior type.
    pub behavior_type: String,
    /// Behavior payload.
    pub data: Option<Value>,
}

//! Reference processor that moves tasks along when a status goes stale.
//!
//! Behavior data has the shape `{"statuses": [rule, ...]}`. A rule fires when
//! the task's latest status equals `start_status` and that status is older
//! than `timeout`. Firing appends `end_status` and optionally completes and
//! deletes the task.

use super::duration::parse_duration;
use crate::processing::{BehaviorProcessor, ProcessorError};
use crate::task::{
    domain::{NewTaskStatus, Task, TaskFilter, TaskId, TaskOrder},
    ports::{TaskStore, TaskStoreError, TaskStoreResult, TaskTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Behavior type handled by [`StatusChangeTimeout`].
pub const BEHAVIOR_TYPE: &str = "statuschangetimeout";

/// One status transition rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRule {
    /// Status the task must currently be in. Empty matches a task with no
    /// statuses.
    #[serde(default)]
    pub start_status: String,
    /// Status appended when the rule fires.
    #[serde(default)]
    pub end_status: String,
    /// How long `start_status` may last, as a duration string.
    #[serde(default)]
    pub timeout: String,
    /// Completes the task when the rule fires.
    #[serde(default)]
    pub complete: bool,
    /// Deletes the task when the rule fires.
    #[serde(default)]
    pub delete: bool,
}

impl StatusChangeRule {
    fn is_due(
        &self,
        status: &str,
        since: DateTime<Utc>,
        timeout: TimeDelta,
        tick_time: DateTime<Utc>,
    ) -> bool {
        status == self.start_status
            && since
                .checked_add_signed(timeout)
                .is_some_and(|expires| expires < tick_time)
    }
}

/// Processor for the `statuschangetimeout` behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusChangeTimeout;

#[async_trait]
impl<S: TaskStore> BehaviorProcessor<S> for StatusChangeTimeout {
    async fn process(
        &self,
        store: &S,
        tick_time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        let filter = TaskFilter::new().with_behavior_types([BEHAVIOR_TYPE]);
        let tasks = store
            .transaction_until(cancel, move |tx| {
                tx.get_tasks_by_filter(&filter, TaskOrder::CompletedFirst)
            })
            .await
            .map_err(cancelled_or_store)?;
        tracing::info!(
            behavior_type = BEHAVIOR_TYPE,
            count = tasks.len(),
            "tasks carrying behavior"
        );

        for task in tasks {
            if cancel.is_cancelled() {
                tracing::info!(behavior_type = BEHAVIOR_TYPE, "tick cancelled; stopping scan");
                return Err(ProcessorError::Cancelled);
            }
            let id = task.id();
            let result = store
                .transaction_until(cancel, move |tx| apply_rules(tx, id, tick_time))
                .await;
            match result {
                Ok(()) => {}
                Err(TaskStoreError::Cancelled) => return Err(ProcessorError::Cancelled),
                Err(err) => {
                    tracing::error!(task_id = %id, error = %err, "failed processing task");
                }
            }
        }
        Ok(())
    }
}

fn cancelled_or_store(err: TaskStoreError) -> ProcessorError {
    match err {
        TaskStoreError::Cancelled => ProcessorError::Cancelled,
        other => ProcessorError::Store(other),
    }
}

/// Returns the latest status and its timestamp, or the start date and an
/// empty status for a task without statuses.
fn comparison_point(task: &Task) -> (DateTime<Utc>, &str) {
    task.latest_status().map_or((task.start_date(), ""), |status| {
        (status.created_date(), status.status())
    })
}

fn rules_of(task: &Task) -> Option<&[Value]> {
    task.behavior(BEHAVIOR_TYPE)?
        .data()?
        .get("statuses")?
        .as_array()
        .map(Vec::as_slice)
}

fn decode_rule(id: TaskId, raw: &Value) -> Option<(StatusChangeRule, TimeDelta)> {
    let rule: StatusChangeRule = serde_json::from_value(raw.clone())
        .inspect_err(|err| {
            tracing::warn!(task_id = %id, error = %err, "skipping undecodable rule");
        })
        .ok()?;
    if rule.end_status.trim().is_empty() {
        tracing::warn!(task_id = %id, "skipping rule without an end status");
        return None;
    }
    let timeout = parse_duration(&rule.timeout)
        .inspect_err(|err| {
            tracing::warn!(task_id = %id, error = %err, "skipping rule with invalid timeout");
        })
        .ok()?;
    Some((rule, timeout))
}

/// Applies every due rule to one task inside the caller's transaction.
fn apply_rules(
    tx: &mut dyn TaskTransaction,
    id: TaskId,
    tick_time: DateTime<Utc>,
) -> TaskStoreResult<()> {
    let Some(task) = tx.get_task(id, true)? else {
        tracing::debug!(task_id = %id, "task disappeared before processing");
        return Ok(());
    };
    let Some(rules) = rules_of(&task) else {
        tracing::warn!(task_id = %id, "behavior data has no statuses array");
        return Ok(());
    };
    let (since, status) = comparison_point(&task);

    for (rule, timeout) in rules.iter().filter_map(|raw| decode_rule(id, raw)) {
        if !rule.is_due(status, since, timeout, tick_time) {
            tracing::debug!(task_id = %id, %since, status, timeout = %rule.timeout, "rule not due");
            continue;
        }

        tx.insert_task_status(&NewTaskStatus::new(rule.end_status.clone()), id)?;
        if rule.complete {
            tx.complete_task(id)?;
        }
        if rule.delete {
            tx.delete_task(id)?;
        }
        tracing::info!(
            task_id = %id,
            from = status,
            to = %rule.end_status,
            complete = rule.complete,
            delete = rule.delete,
            "status change timeout applied"
        );
        if rule.delete {
            break;
        }
    }
    Ok(())
}

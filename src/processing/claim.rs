//! "Oldest claim wins" mutual exclusion over the task store.
//!
//! A replica that wants to run a behavior processor inserts a marker task,
//! commits it, and then looks for every outstanding marker of the same type
//! inside the claim window. Only the replica whose marker is the oldest one
//! proceeds. Completed markers fall out of the window immediately, and markers
//! orphaned by a crash fall out once they are older than the margin.
//!
//! Marker inserts of one type take the store's per-type insert lock, so
//! marker start dates follow commit order.

use crate::task::{
    domain::{NewTask, Task, TaskFilter, TaskId, TaskOrder},
    ports::{TaskStore, TaskStoreResult},
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MARKER_PREFIX: &str = "behaviorprocessor-";

/// Returns the task type of claim markers for `behavior_type`.
#[must_use]
pub fn marker_type(behavior_type: &str) -> String {
    format!("{MARKER_PREFIX}{behavior_type}")
}

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This marker is the oldest outstanding claim; the caller may proceed.
    Won(TaskId),
    /// Another claim is older. The marker has already been removed.
    Lost {
        /// The losing marker.
        claim: TaskId,
        /// The winning marker, when one was visible.
        oldest: Option<TaskId>,
    },
}

/// Arbitrates claims for behavior processors through marker tasks.
pub struct ClaimArbiter<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    margin: TimeDelta,
}

impl<S, C> ClaimArbiter<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an arbiter whose claim window reaches `margin` into the past.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>, margin: TimeDelta) -> Self {
        Self {
            store,
            clock,
            margin,
        }
    }

    /// Inserts and commits a new marker for `behavior_type`.
    ///
    /// # Errors
    ///
    /// Returns the store error when the insert fails, or
    /// [`TaskStoreError::Cancelled`](crate::task::ports::TaskStoreError::Cancelled)
    /// when `cancel` fires first. A cancelled claim leaves no marker.
    pub async fn claim(
        &self,
        behavior_type: &str,
        cancel: &CancellationToken,
    ) -> TaskStoreResult<TaskId> {
        let task_type = marker_type(behavior_type);
        self.store
            .transaction_until(cancel, move |tx| {
                tx.lock_task_type(&task_type)?;
                tx.insert_task(&NewTask::new(task_type))
            })
            .await
    }

    /// Checks whether `claim` is the oldest outstanding marker in the window.
    ///
    /// # Errors
    ///
    /// Returns the store error when the lookup fails or `cancel` fires first.
    pub async fn verify(
        &self,
        behavior_type: &str,
        claim: TaskId,
        cancel: &CancellationToken,
    ) -> TaskStoreResult<ClaimOutcome> {
        let filter = self.window(behavior_type);
        let markers = self
            .store
            .transaction_until(cancel, move |tx| {
                tx.get_tasks_by_filter(&filter, TaskOrder::Creation)
            })
            .await?;
        Ok(match oldest_claim(&markers) {
            Some(oldest) if oldest == claim => ClaimOutcome::Won(claim),
            oldest => ClaimOutcome::Lost { claim, oldest },
        })
    }

    /// Claims and verifies in one step, removing the marker unless it won.
    ///
    /// Both steps observe `cancel`; removing a marker does not.
    ///
    /// # Errors
    ///
    /// Returns the store error when the claim or the verification fails. A
    /// marker left behind by a failed verification is removed on a best-effort
    /// basis.
    pub async fn acquire(
        &self,
        behavior_type: &str,
        cancel: &CancellationToken,
    ) -> TaskStoreResult<ClaimOutcome> {
        let claim = self.claim(behavior_type, cancel).await?;
        match self.verify(behavior_type, claim, cancel).await {
            Ok(won @ ClaimOutcome::Won(_)) => {
                tracing::debug!(behavior_type, task_id = %claim, "claim won");
                Ok(won)
            }
            Ok(lost) => {
                tracing::info!(
                    behavior_type,
                    task_id = %claim,
                    "claim lost to an older marker"
                );
                self.abandon_logged(behavior_type, claim).await;
                Ok(lost)
            }
            Err(err) => {
                self.abandon_logged(behavior_type, claim).await;
                Err(err)
            }
        }
    }

    /// Completes a winning marker so later claims may proceed.
    ///
    /// Runs in its own never-cancelled transaction.
    ///
    /// # Errors
    ///
    /// Returns the store error when completion fails.
    pub async fn release(&self, claim: TaskId) -> TaskStoreResult<()> {
        self.store
            .transaction(move |tx| tx.complete_task(claim))
            .await
    }

    /// Deletes a marker that will not be used.
    ///
    /// # Errors
    ///
    /// Returns the store error when deletion fails.
    pub async fn abandon(&self, claim: TaskId) -> TaskStoreResult<()> {
        self.store
            .transaction(move |tx| tx.delete_task(claim))
            .await
    }

    async fn abandon_logged(&self, behavior_type: &str, claim: TaskId) {
        if let Err(err) = self.abandon(claim).await {
            tracing::warn!(
                behavior_type,
                task_id = %claim,
                error = %err,
                "failed to remove claim marker"
            );
        }
    }

    fn window(&self, behavior_type: &str) -> TaskFilter {
        let now = self.clock.utc();
        let oldest_start = now
            .checked_sub_signed(self.margin)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        // Completed markers end before this bound; open markers pass via the
        // null-end clause.
        let far_future = now
            .checked_add_signed(TimeDelta::days(365))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        TaskFilter::new()
            .with_types([marker_type(behavior_type)])
            .started_since(oldest_start)
            .ended_since(far_future)
            .including_null_end()
    }
}

/// Picks the marker with the smallest `(start_date, id)`.
fn oldest_claim(markers: &[Task]) -> Option<TaskId> {
    markers
        .iter()
        .min_by_key(|task| (task.start_date(), task.id()))
        .map(Task::id)
}

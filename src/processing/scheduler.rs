//! Periodic fan-out of behavior processors.

use super::{
    claim::{ClaimArbiter, ClaimOutcome},
    processor::{BehaviorProcessor, ProcessorError, ProcessorRegistry},
};
use crate::task::ports::{TaskStore, TaskStoreError};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval between ticks.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);
/// Default time a tick may run before its processors are cancelled.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10 * 60);
/// Default reach of the claim window into the past.
pub const DEFAULT_CLAIM_MARGIN: Duration = Duration::from_secs(12 * 60);

/// Timing parameters of a [`BehaviorScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Interval between ticks. Must be non-zero.
    pub period: Duration,
    /// Time a tick may run before it is cancelled.
    pub deadline: Duration,
    /// Age after which an unfinished claim no longer blocks others. Should
    /// exceed `deadline`.
    pub claim_margin: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            deadline: DEFAULT_DEADLINE,
            claim_margin: DEFAULT_CLAIM_MARGIN,
        }
    }
}

/// What happened to one behavior type during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The claim was won and the processor finished successfully.
    Processed,
    /// The claim was won and the processor returned an error.
    Failed,
    /// Another replica holds an older claim.
    Lost,
    /// The claim could not be inserted or verified.
    ClaimFailed,
    /// The tick was cancelled before the claim was verified or before the
    /// processor finished.
    TimedOut,
}

/// Per-behavior outcomes of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    tick_time: DateTime<Utc>,
    outcomes: BTreeMap<String, AttemptOutcome>,
}

impl TickReport {
    const fn new(tick_time: DateTime<Utc>) -> Self {
        Self {
            tick_time,
            outcomes: BTreeMap::new(),
        }
    }

    /// Returns the time the tick ran for.
    #[must_use]
    pub const fn tick_time(&self) -> DateTime<Utc> {
        self.tick_time
    }

    /// Returns the outcome recorded for `behavior_type`.
    ///
    /// `None` means the attempt panicked or the type is not registered.
    #[must_use]
    pub fn outcome(&self, behavior_type: &str) -> Option<AttemptOutcome> {
        self.outcomes.get(behavior_type).copied()
    }

    /// Iterates over recorded outcomes in behavior-type order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, AttemptOutcome)> {
        self.outcomes
            .iter()
            .map(|(behavior_type, outcome)| (behavior_type.as_str(), *outcome))
    }
}

/// Runs every registered processor once per period, at most one replica at a
/// time per behavior type.
pub struct BehaviorScheduler<S: TaskStore, C> {
    store: Arc<S>,
    clock: Arc<C>,
    registry: Arc<ProcessorRegistry<S>>,
    arbiter: Arc<ClaimArbiter<S, C>>,
    settings: SchedulerSettings,
}

impl<S, C> BehaviorScheduler<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler over a fixed processor registry.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clock: Arc<C>,
        registry: ProcessorRegistry<S>,
        settings: SchedulerSettings,
    ) -> Self {
        let margin = TimeDelta::from_std(settings.claim_margin).unwrap_or(TimeDelta::MAX);
        let arbiter = Arc::new(ClaimArbiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            margin,
        ));
        Self {
            store,
            clock,
            registry: Arc::new(registry),
            arbiter,
            settings,
        }
    }

    /// Returns the scheduler's timing parameters.
    #[must_use]
    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Ticks every period until `shutdown` fires.
    ///
    /// The first tick happens one period after the call. Ticks never overlap;
    /// timer fires missed while a tick was running are dropped. Shutdown
    /// cancels the running tick, whose claims are still released.
    ///
    /// # Panics
    ///
    /// Panics if the configured period is zero.
    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.settings.period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            period_secs = period.as_secs_f64(),
            processors = self.registry.len(),
            "behavior scheduler started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let tick_time = self.clock.utc();
                    let report = self.run_tick(tick_time, &shutdown).await;
                    tracing::debug!(%tick_time, outcomes = ?report.outcomes, "tick finished");
                }
            }
        }
        tracing::info!("behavior scheduler stopped");
    }

    /// Attempts every registered processor once for `tick_time`.
    ///
    /// Attempts run concurrently. The tick's cancellation token is a child of
    /// `parent` and fires when the deadline passes. Returns once every attempt
    /// has finished and released or removed its claim.
    pub async fn run_tick(
        &self,
        tick_time: DateTime<Utc>,
        parent: &CancellationToken,
    ) -> TickReport {
        let cancel = parent.child_token();
        let mut attempts = JoinSet::new();
        for (behavior_type, processor) in self.registry.iter() {
            let attempt = Attempt {
                behavior_type: behavior_type.to_owned(),
                processor: Arc::clone(processor),
                store: Arc::clone(&self.store),
                arbiter: Arc::clone(&self.arbiter),
                tick_time,
                cancel: cancel.clone(),
            };
            attempts.spawn(attempt.run());
        }

        let deadline = tokio::time::sleep(self.settings.deadline);
        tokio::pin!(deadline);
        let mut report = TickReport::new(tick_time);
        loop {
            tokio::select! {
                joined = attempts.join_next() => match joined {
                    None => break,
                    Some(Ok((behavior_type, outcome))) => {
                        report.outcomes.insert(behavior_type, outcome);
                    }
                    Some(Err(err)) => {
                        tracing::error!(%tick_time, error = %err, "behavior attempt aborted");
                    }
                },
                () = &mut deadline, if !cancel.is_cancelled() => {
                    tracing::warn!(%tick_time, "tick deadline passed; cancelling processors");
                    cancel.cancel();
                }
            }
        }
        report
    }
}

struct Attempt<S: TaskStore, C> {
    behavior_type: String,
    processor: Arc<dyn BehaviorProcessor<S>>,
    store: Arc<S>,
    arbiter: Arc<ClaimArbiter<S, C>>,
    tick_time: DateTime<Utc>,
    cancel: CancellationToken,
}

impl<S, C> Attempt<S, C>
where
    S: TaskStore,
    C: Clock + Send + Sync + 'static,
{
    async fn run(self) -> (String, AttemptOutcome) {
        let behavior_type = self.behavior_type.as_str();
        let outcome = match self.arbiter.acquire(behavior_type, &self.cancel).await {
            Err(TaskStoreError::Cancelled) => {
                tracing::warn!(behavior_type, tick_time = %self.tick_time, "claim cancelled");
                AttemptOutcome::TimedOut
            }
            Err(err) => {
                tracing::error!(
                    behavior_type,
                    error = %err,
                    "failed to claim behavior processor"
                );
                AttemptOutcome::ClaimFailed
            }
            Ok(ClaimOutcome::Lost { .. }) => AttemptOutcome::Lost,
            Ok(ClaimOutcome::Won(claim)) => {
                let processed = self.process().await;
                if let Err(err) = self.arbiter.release(claim).await {
                    tracing::error!(
                        behavior_type,
                        task_id = %claim,
                        error = %err,
                        "failed to release claim marker"
                    );
                }
                processed
            }
        };
        (self.behavior_type, outcome)
    }

    async fn process(&self) -> AttemptOutcome {
        let behavior_type = self.behavior_type.as_str();
        let result = tokio::select! {
            biased;
            result = self.processor.process(&self.store, self.tick_time, &self.cancel) => {
                Some(result)
            }
            () = self.cancel.cancelled() => None,
        };
        match result {
            Some(Ok(())) => {
                tracing::debug!(behavior_type, tick_time = %self.tick_time, "behavior processed");
                AttemptOutcome::Processed
            }
            Some(Err(ProcessorError::Cancelled)) | None => {
                tracing::warn!(
                    behavior_type,
                    tick_time = %self.tick_time,
                    "behavior processing cancelled"
                );
                AttemptOutcome::TimedOut
            }
            Some(Err(err)) => {
                tracing::error!(behavior_type, error = %err, "behavior processor failed");
                AttemptOutcome::Failed
            }
        }
    }
}

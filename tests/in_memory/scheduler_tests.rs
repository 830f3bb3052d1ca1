//! Tick fan-out, failure isolation, deadlines, and shutdown.

use super::helpers::{ManualClock, SteppingClock, epoch, list, manual_clock, store_with};
use async_tasks::processing::{
    AttemptOutcome, BehaviorProcessor, BehaviorScheduler, ClaimArbiter, ProcessorError,
    ProcessorRegistry, SchedulerSettings, marker_type,
};
use async_tasks::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{Task, TaskFilter},
    ports::TaskStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeDelta, Utc};
use mockable::Clock;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

struct CountingProcessor {
    runs: Arc<AtomicUsize>,
    hold: std::time::Duration,
}

#[async_trait]
impl<S: TaskStore> BehaviorProcessor<S> for CountingProcessor {
    async fn process(
        &self,
        _store: &S,
        _tick_time: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        Ok(())
    }
}

struct FailingProcessor;

#[async_trait]
impl<S: TaskStore> BehaviorProcessor<S> for FailingProcessor {
    async fn process(
        &self,
        _store: &S,
        _tick_time: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        Err(ProcessorError::InvalidBehaviorData {
            behavior_type: "broken".to_owned(),
            reason: "always fails".to_owned(),
        })
    }
}

struct StuckProcessor;

#[async_trait]
impl<S: TaskStore> BehaviorProcessor<S> for StuckProcessor {
    async fn process(
        &self,
        _store: &S,
        _tick_time: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[fixture]
fn settings() -> SchedulerSettings {
    SchedulerSettings {
        period: std::time::Duration::from_millis(20),
        deadline: std::time::Duration::from_secs(5),
        claim_margin: std::time::Duration::from_secs(12 * 60),
    }
}

type ManualStore = InMemoryTaskStore<ManualClock>;

fn counting(runs: &Arc<AtomicUsize>, hold_ms: u64) -> Arc<CountingProcessor> {
    Arc::new(CountingProcessor {
        runs: Arc::clone(runs),
        hold: std::time::Duration::from_millis(hold_ms),
    })
}

async fn all_markers_complete<C: Clock + Send + Sync + 'static>(
    store: &InMemoryTaskStore<C>,
    behavior_types: &[&str],
) -> eyre::Result<bool> {
    let types = behavior_types.iter().map(|kind| marker_type(kind));
    let markers = list(store, TaskFilter::new().with_types(types)).await?;
    Ok(!markers.is_empty() && markers.iter().all(Task::is_complete))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tick_reports_each_behavior_and_releases_claims(
    manual_clock: Arc<ManualClock>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let store = store_with(&manual_clock);
    let runs = Arc::new(AtomicUsize::new(0));
    let registry = ProcessorRegistry::<ManualStore>::new()
        .with_processor("counted", counting(&runs, 0))
        .with_processor("broken", Arc::new(FailingProcessor));
    let scheduler = BehaviorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&manual_clock),
        registry,
        settings,
    );

    let report = scheduler
        .run_tick(manual_clock.utc(), &CancellationToken::new())
        .await;

    eyre::ensure!(
        report.outcome("counted") == Some(AttemptOutcome::Processed),
        "counted: {report:?}"
    );
    eyre::ensure!(
        report.outcome("broken") == Some(AttemptOutcome::Failed),
        "broken: {report:?}"
    );
    eyre::ensure!(
        runs.load(Ordering::SeqCst) == 1,
        "processor should run once"
    );
    eyre::ensure!(
        all_markers_complete(&store, &["counted", "broken"]).await?,
        "winning markers should be completed regardless of outcome"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn older_claim_elsewhere_makes_tick_lose(
    manual_clock: Arc<ManualClock>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let store = store_with(&manual_clock);
    let other_replica =
        ClaimArbiter::new(Arc::clone(&store), Arc::clone(&manual_clock), TimeDelta::minutes(12));
    let held = other_replica
        .claim("counted", &CancellationToken::new())
        .await?;
    manual_clock.advance(Duration::seconds(1));
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = BehaviorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&manual_clock),
        ProcessorRegistry::<ManualStore>::new().with_processor("counted", counting(&runs, 0)),
        settings,
    );

    let report = scheduler
        .run_tick(manual_clock.utc(), &CancellationToken::new())
        .await;

    eyre::ensure!(
        report.outcome("counted") == Some(AttemptOutcome::Lost),
        "{report:?}"
    );
    eyre::ensure!(
        runs.load(Ordering::SeqCst) == 0,
        "losing replica must not run"
    );
    let filter = TaskFilter::new().with_types([marker_type("counted")]);
    let markers = list(&*store, filter).await?;
    eyre::ensure!(
        markers.iter().map(Task::id).collect::<Vec<_>>() == vec![held],
        "only the held marker should remain"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deadline_cancels_processor_but_releases_claim(
    manual_clock: Arc<ManualClock>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let store = store_with(&manual_clock);
    let scheduler = BehaviorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&manual_clock),
        ProcessorRegistry::<ManualStore>::new().with_processor("stuck", Arc::new(StuckProcessor)),
        SchedulerSettings {
            deadline: std::time::Duration::from_millis(50),
            ..settings
        },
    );

    let report = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        scheduler.run_tick(manual_clock.utc(), &CancellationToken::new()),
    )
    .await?;

    eyre::ensure!(
        report.outcome("stuck") == Some(AttemptOutcome::TimedOut),
        "{report:?}"
    );
    eyre::ensure!(
        all_markers_complete(&store, &["stuck"]).await?,
        "timed-out claim should still be released"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn replicas_sharing_a_store_run_each_behavior_once(
    epoch: DateTime<Utc>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let clock = Arc::new(SteppingClock::new(epoch));
    let store = store_with(&clock);
    let runs = Arc::new(AtomicUsize::new(0));
    let replica = || {
        BehaviorScheduler::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            ProcessorRegistry::<InMemoryTaskStore<SteppingClock>>::new()
                .with_processor("counted", counting(&runs, 200)),
            settings,
        )
    };
    let (first, second) = (replica(), replica());
    let shutdown = CancellationToken::new();

    let (first_report, second_report) = tokio::join!(
        first.run_tick(epoch, &shutdown),
        second.run_tick(epoch, &shutdown)
    );

    let mut outcomes = [
        first_report.outcome("counted"),
        second_report.outcome("counted"),
    ];
    outcomes.sort_by_key(|outcome| format!("{outcome:?}"));
    eyre::ensure!(
        runs.load(Ordering::SeqCst) == 1,
        "processor ran more than once"
    );
    eyre::ensure!(
        outcomes == [Some(AttemptOutcome::Lost), Some(AttemptOutcome::Processed)],
        "unexpected outcomes {outcomes:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn run_ticks_periodically_until_shutdown(
    manual_clock: Arc<ManualClock>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let store = store_with(&manual_clock);
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = BehaviorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&manual_clock),
        ProcessorRegistry::<ManualStore>::new().with_processor("counted", counting(&runs, 0)),
        settings,
    );
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let running = tokio::spawn(async move { scheduler.run(stop).await });

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while runs.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await?;
    shutdown.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), running).await??;

    eyre::ensure!(
        all_markers_complete(&store, &["counted"]).await?,
        "every tick should release its claim"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_tick_times_out_before_claiming(
    manual_clock: Arc<ManualClock>,
    settings: SchedulerSettings,
) -> eyre::Result<()> {
    let store = store_with(&manual_clock);
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = BehaviorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&manual_clock),
        ProcessorRegistry::<ManualStore>::new().with_processor("counted", counting(&runs, 0)),
        settings,
    );
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let report = scheduler.run_tick(manual_clock.utc(), &shutdown).await;

    eyre::ensure!(
        report.outcome("counted") == Some(AttemptOutcome::TimedOut),
        "{report:?}"
    );
    eyre::ensure!(runs.load(Ordering::SeqCst) == 0, "processor must not run");
    let filter = TaskFilter::new().with_types([marker_type("counted")]);
    let markers = list(&*store, filter).await?;
    eyre::ensure!(markers.is_empty(), "no claim marker should be committed");
    Ok(())
}

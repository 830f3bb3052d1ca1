//! Claim arbitration against `PostgreSQL` timestamps.

use super::helpers::{BoxError, PreparedStore, prepared_store};
use async_tasks::processing::{ClaimArbiter, ClaimOutcome, marker_type};
use async_tasks::task::adapters::postgres::PostgresTaskStore;
use async_tasks::task::domain::{Task, TaskFilter, TaskOrder};
use async_tasks::task::ports::TaskStore;
use chrono::TimeDelta;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const BEHAVIOR: &str = "watch";

fn arbiter(store: &PostgresTaskStore) -> ClaimArbiter<PostgresTaskStore, DefaultClock> {
    ClaimArbiter::new(
        Arc::new(store.clone()),
        Arc::new(DefaultClock),
        TimeDelta::minutes(12),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn outstanding_claim_excludes_later_claims_until_released(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let arbiter = arbiter(&prepared.store);
    let cancel = CancellationToken::new();

    let ClaimOutcome::Won(first) = arbiter.acquire(BEHAVIOR, &cancel).await? else {
        return Err("a lone claim should win".into());
    };
    let contested = arbiter.acquire(BEHAVIOR, &cancel).await?;
    assert!(
        matches!(contested, ClaimOutcome::Lost { oldest, .. } if oldest == Some(first)),
        "a later claim should lose to the outstanding one, got {contested:?}"
    );

    arbiter.release(first).await?;
    let after_release = arbiter.acquire(BEHAVIOR, &cancel).await?;
    assert!(
        matches!(after_release, ClaimOutcome::Won(claim) if claim != first),
        "a released claim should not block, got {after_release:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_yield_one_winner_per_round(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let cancel = CancellationToken::new();

    for round in 0..20 {
        let mut attempts = JoinSet::new();
        for _ in 0..4 {
            let contender = arbiter(&prepared.store);
            let token = cancel.clone();
            attempts.spawn(async move { contender.acquire(BEHAVIOR, &token).await });
        }

        let mut winners = Vec::new();
        while let Some(joined) = attempts.join_next().await {
            if let ClaimOutcome::Won(claim) = joined?? {
                winners.push(claim);
            }
        }
        assert_eq!(winners.len(), 1, "round {round}: winners {winners:?}");

        let releaser = arbiter(&prepared.store);
        for claim in winners {
            releaser.release(claim).await?;
        }
    }

    let filter = TaskFilter::new().with_types([marker_type(BEHAVIOR)]);
    let markers = prepared
        .store
        .transaction(move |tx| tx.get_tasks_by_filter(&filter, TaskOrder::Creation))
        .await?;
    assert_eq!(markers.len(), 20, "losing markers should be deleted");
    assert!(markers.iter().all(Task::is_complete));
    Ok(())
}

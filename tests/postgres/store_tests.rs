//! `PostgreSQL` task store behavior.

use super::helpers::{BoxError, PreparedStore, prepared_store};
use async_tasks::task::{
    domain::{
        NewTask, NewTaskStatus, Task, TaskBehavior, TaskFilter, TaskId, TaskOrder, TaskStatus,
    },
    ports::{TaskStore, TaskStoreError},
};
use chrono::{Duration, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Timestamptz, Uuid as SqlUuid};
use rstest::rstest;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn insert(store: &impl TaskStore, task: NewTask) -> Result<TaskId, BoxError> {
    Ok(store.transaction(move |tx| tx.insert_task(&task)).await?)
}

async fn fetch(store: &impl TaskStore, id: TaskId) -> Result<Option<Task>, BoxError> {
    Ok(store.transaction(move |tx| tx.get_task(id, true)).await?)
}

async fn list(
    store: &impl TaskStore,
    filter: TaskFilter,
    order: TaskOrder,
) -> Result<Vec<TaskId>, BoxError> {
    let tasks = store
        .transaction(move |tx| tx.get_tasks_by_filter(&filter, order))
        .await?;
    Ok(tasks.iter().map(Task::id).collect())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn inserted_task_round_trips_with_children(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;

    let id = insert(
        store,
        NewTask::new("export")
            .with_username("ada")
            .with_data(json!({"rows": 3}))
            .with_status(NewTaskStatus::new("queued").with_detail("waiting"))
            .with_behavior(TaskBehavior::new("watch").with_data(json!({"every": "1m"}))),
    )
    .await?;

    let task = fetch(store, id).await?.ok_or("task should exist")?;
    assert_eq!(task.task_type(), "export");
    assert_eq!(task.username(), Some("ada"));
    assert_eq!(task.data(), Some(&json!({"rows": 3})));
    assert!(!task.is_complete());
    let statuses = task.statuses().as_slice();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].status(), "queued");
    assert_eq!(statuses[0].detail(), Some("waiting"));
    assert_eq!(
        task.behavior("watch").and_then(TaskBehavior::data),
        Some(&json!({"every": "1m"}))
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn statuses_added_in_one_transaction_keep_their_order(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let id = insert(store, NewTask::new("export")).await?;

    store
        .transaction(move |tx| {
            for status in ["queued", "running", "done"] {
                tx.insert_task_status(&NewTaskStatus::new(status), id)?;
            }
            Ok(())
        })
        .await?;

    let task = fetch(store, id).await?.ok_or("task should exist")?;
    assert_eq!(task.latest_status().map(TaskStatus::status), Some("done"));
    let done = list(
        store,
        TaskFilter::new().with_statuses(["done"]),
        TaskOrder::Creation,
    )
    .await?;
    let running = list(
        store,
        TaskFilter::new().with_statuses(["running"]),
        TaskOrder::Creation,
    )
    .await?;
    assert_eq!(done, vec![id]);
    assert!(running.is_empty(), "superseded status should not match");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn statuses_sharing_a_timestamp_resolve_to_the_last_inserted(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let id = insert(store, NewTask::new("export")).await?;
    let url = prepared.database_url().to_owned();
    let tied = Utc
        .with_ymd_and_hms(2026, 4, 1, 9, 0, 0)
        .single()
        .ok_or("valid timestamp")?;

    tokio::task::spawn_blocking(move || -> Result<(), BoxError> {
        let mut conn = PgConnection::establish(&url)?;
        diesel::sql_query(concat!(
            "INSERT INTO task_statuses (id, task_id, status, created_date) ",
            "VALUES ($1, $3, 'running', $4), ($2, $3, 'queued', $4)",
        ))
        .bind::<SqlUuid, _>(Uuid::new_v4())
        .bind::<SqlUuid, _>(Uuid::new_v4())
        .bind::<SqlUuid, _>(id.into_inner())
        .bind::<Timestamptz, _>(tied)
        .execute(&mut conn)?;
        Ok(())
    })
    .await??;

    let task = fetch(store, id).await?.ok_or("task should exist")?;
    let names: Vec<&str> = task
        .statuses()
        .as_slice()
        .iter()
        .map(TaskStatus::status)
        .collect();
    assert_eq!(names, ["running", "queued"]);
    assert_eq!(task.latest_status().map(TaskStatus::status), Some("queued"));
    let queued = list(
        store,
        TaskFilter::new().with_statuses(["queued"]),
        TaskOrder::Creation,
    )
    .await?;
    let running = list(
        store,
        TaskFilter::new().with_statuses(["running"]),
        TaskOrder::Creation,
    )
    .await?;
    assert_eq!(queued, vec![id]);
    assert!(running.is_empty(), "earlier tied status should not match");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn filters_combine_and_order_by_start_date(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let base = Utc
        .with_ymd_and_hms(2026, 4, 1, 9, 0, 0)
        .single()
        .ok_or("valid timestamp")?;

    let late = insert(
        store,
        NewTask::new("export")
            .with_start_date(base + Duration::hours(2))
            .with_behavior(TaskBehavior::new("watch")),
    )
    .await?;
    let early = insert(
        store,
        NewTask::new("export")
            .with_start_date(base)
            .with_behavior(TaskBehavior::new("watch")),
    )
    .await?;
    insert(store, NewTask::new("export").with_start_date(base)).await?;
    insert(
        store,
        NewTask::new("import")
            .with_start_date(base)
            .with_behavior(TaskBehavior::new("watch")),
    )
    .await?;

    let watched_exports = list(
        store,
        TaskFilter::new()
            .with_types(["export"])
            .with_behavior_types(["watch"]),
        TaskOrder::Creation,
    )
    .await?;
    assert_eq!(watched_exports, vec![early, late]);

    let recent = list(
        store,
        TaskFilter::new()
            .with_types(["export"])
            .started_since(base + Duration::hours(1)),
        TaskOrder::Creation,
    )
    .await?;
    assert_eq!(recent, vec![late]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn end_date_bounds_can_include_open_tasks(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let open = insert(store, NewTask::new("export")).await?;
    let done = insert(store, NewTask::new("export")).await?;
    store.transaction(move |tx| tx.complete_task(done)).await?;

    let far_past = Utc::now() - Duration::days(1);
    let bounded = list(
        store,
        TaskFilter::new().ended_since(far_past),
        TaskOrder::Creation,
    )
    .await?;
    let with_open = list(
        store,
        TaskFilter::new().ended_since(far_past).including_null_end(),
        TaskOrder::CompletedFirst,
    )
    .await?;

    assert_eq!(bounded, vec![done]);
    assert_eq!(with_open, vec![done, open]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completing_twice_keeps_first_end_date(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let id = insert(store, NewTask::new("export")).await?;

    store.transaction(move |tx| tx.complete_task(id)).await?;
    let first = fetch(store, id).await?.and_then(|task| task.end_date());
    store.transaction(move |tx| tx.complete_task(id)).await?;
    let second = fetch(store, id).await?.and_then(|task| task.end_date());

    assert!(first.is_some(), "task should be complete");
    assert_eq!(first, second);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_behavior_is_reported(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let id = insert(
        store,
        NewTask::new("export").with_behavior(TaskBehavior::new("watch")),
    )
    .await?;

    let result = store
        .transaction(move |tx| tx.insert_task_behavior(&TaskBehavior::new("watch"), id))
        .await;

    assert!(
        matches!(
            result,
            Err(TaskStoreError::DuplicateBehavior { task_id, ref behavior_type })
                if task_id == id && behavior_type == "watch"
        ),
        "unexpected result: {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn writes_to_missing_tasks_are_not_found(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let ghost = TaskId::new();

    let status = store
        .transaction(move |tx| tx.insert_task_status(&NewTaskStatus::new("queued"), ghost))
        .await;
    let complete = store.transaction(move |tx| tx.complete_task(ghost)).await;
    let delete = store.transaction(move |tx| tx.delete_task(ghost)).await;

    for result in [status, complete, delete] {
        assert!(
            matches!(result, Err(TaskStoreError::NotFound(id)) if id == ghost),
            "unexpected result: {result:?}"
        );
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn delete_cascades_to_children(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let id = insert(
        store,
        NewTask::new("export")
            .with_status(NewTaskStatus::new("queued"))
            .with_behavior(TaskBehavior::new("watch")),
    )
    .await?;

    store.transaction(move |tx| tx.delete_task(id)).await?;

    assert!(fetch(store, id).await?.is_none());
    let watched = list(
        store,
        TaskFilter::new().with_behavior_types(["watch"]),
        TaskOrder::Creation,
    )
    .await?;
    assert!(watched.is_empty());
    assert_eq!(store.transaction(|tx| tx.count_tasks()).await?, 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_work_rolls_back(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;

    let result = store
        .transaction(|tx| {
            let id = tx.insert_task(&NewTask::new("export"))?;
            tx.insert_task_status(&NewTaskStatus::new(""), id)
        })
        .await;

    assert!(
        matches!(result, Err(TaskStoreError::Validation(_))),
        "got {result:?}"
    );
    assert_eq!(store.transaction(|tx| tx.count_tasks()).await?, 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_work_is_not_committed(
    #[future] prepared_store: Result<PreparedStore, BoxError>,
) -> Result<(), BoxError> {
    let prepared = prepared_store.await?;
    let store = &prepared.store;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let result = store
        .transaction_until(&cancel, move |tx| {
            let id = tx.insert_task(&NewTask::new("export"))?;
            trigger.cancel();
            Ok(id)
        })
        .await;

    assert!(
        matches!(result, Err(TaskStoreError::Cancelled)),
        "got {result:?}"
    );
    assert_eq!(store.transaction(|tx| tx.count_tasks()).await?, 0);
    Ok(())
}

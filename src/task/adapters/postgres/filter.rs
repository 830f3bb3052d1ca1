//! Translation of [`TaskFilter`] and [`TaskOrder`] into Diesel queries.

use super::schema::{task_behaviors, tasks};
use crate::task::domain::{TaskFilter, TaskOrder};
use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Array, Bool, Text};

type Predicate = Box<dyn BoxableExpression<tasks::table, Pg, SqlType = Bool>>;

/// Builds the task query for a filter and ordering.
pub(super) fn filtered_tasks(
    filter: &TaskFilter,
    order: TaskOrder,
) -> tasks::BoxedQuery<'static, Pg> {
    let mut query = tasks::table.into_boxed();

    if !filter.ids.is_empty() {
        let ids: Vec<uuid::Uuid> = filter.ids.iter().map(|id| id.into_inner()).collect();
        query = query.filter(tasks::id.eq_any(ids));
    }
    if !filter.types.is_empty() {
        query = query.filter(tasks::task_type.eq_any(filter.types.clone()));
    }
    if !filter.usernames.is_empty() {
        query = query.filter(
            tasks::username
                .assume_not_null()
                .eq_any(filter.usernames.clone()),
        );
    }
    if !filter.behavior_types.is_empty() {
        let carrying = task_behaviors::table
            .filter(task_behaviors::behavior_type.eq_any(filter.behavior_types.clone()))
            .select(task_behaviors::task_id);
        query = query.filter(tasks::id.eq_any(carrying));
    }
    if !filter.statuses.is_empty() {
        query = query.filter(latest_status_in(filter.statuses.clone()));
    }
    if let Some(predicate) = any_of(
        filter
            .start_date_since
            .iter()
            .map(|since| boxed(tasks::start_date.ge(*since))),
    ) {
        query = query.filter(predicate);
    }
    if let Some(predicate) = any_of(
        filter
            .start_date_before
            .iter()
            .map(|before| boxed(tasks::start_date.lt(*before))),
    ) {
        query = query.filter(predicate);
    }
    if let Some(predicate) = end_date_predicate(filter) {
        query = query.filter(predicate);
    }

    match order {
        TaskOrder::Creation => query.order((tasks::start_date.asc(), tasks::id.asc())),
        TaskOrder::CompletedFirst => query.order((
            tasks::end_date.is_not_null().desc(),
            tasks::start_date.asc(),
            tasks::id.asc(),
        )),
    }
}

fn boxed<E>(expression: E) -> Predicate
where
    E: BoxableExpression<tasks::table, Pg, SqlType = Bool> + 'static,
{
    Box::new(expression)
}

fn any_of(predicates: impl Iterator<Item = Predicate>) -> Option<Predicate> {
    predicates.reduce(|acc, next| boxed(acc.or(next)))
}

fn all_of(predicates: impl Iterator<Item = Predicate>) -> Option<Predicate> {
    predicates.reduce(|acc, next| boxed(acc.and(next)))
}

fn end_date_bound(
    bounds: &[DateTime<Utc>],
    compare: fn(DateTime<Utc>) -> Predicate,
) -> Option<Predicate> {
    any_of(bounds.iter().copied().map(compare))
}

fn end_date_predicate(filter: &TaskFilter) -> Option<Predicate> {
    let since = end_date_bound(&filter.end_date_since, |since| {
        boxed(tasks::end_date.assume_not_null().ge(since))
    });
    let before = end_date_bound(&filter.end_date_before, |before| {
        boxed(tasks::end_date.assume_not_null().lt(before))
    });
    let bounded = all_of([since, before].into_iter().flatten())?;
    if filter.include_null_end {
        Some(boxed(bounded.or(tasks::end_date.is_null())))
    } else {
        Some(bounded)
    }
}

/// Matches tasks whose most recent status is one of `statuses`.
///
/// Statuses sharing a creation time are ordered by insertion, so the last one
/// inserted counts as the latest.
fn latest_status_in(statuses: Vec<String>) -> Predicate {
    boxed(
        sql::<Bool>(concat!(
            "(SELECT s.status FROM task_statuses s WHERE s.task_id = tasks.id ",
            "ORDER BY s.created_date DESC, s.seq DESC LIMIT 1) = ANY(",
        ))
        .bind::<Array<Text>, _>(statuses)
        .sql(")"),
    )
}

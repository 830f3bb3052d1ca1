//! Query-string parsing for task listings.
//!
//! Every filter parameter may repeat; repeated values are alternatives.

use crate::task::domain::{TaskFilter, TaskId};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing listing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// An `id` value is not a UUID.
    #[error("invalid task id '{0}'")]
    InvalidId(String),
    /// A date parameter is not an RFC 3339 timestamp.
    #[error("invalid timestamp '{value}' for '{param}'")]
    InvalidTimestamp {
        /// Offending parameter name.
        param: String,
        /// Offending value.
        value: String,
    },
}

/// Builds a [`TaskFilter`] from a raw query string.
///
/// Recognised parameters are `id`, `type`, `status`, `behavior_types`,
/// `username`, `start_date_since`, `start_date_before`, `end_date_since`,
/// `end_date_before`, and the presence flag `include_null_end`. Unknown
/// parameters are ignored.
///
/// # Errors
///
/// Returns [`QueryError`] when an id or timestamp does not parse.
pub fn parse_task_filter(raw: Option<&str>) -> Result<TaskFilter, QueryError> {
    let mut filter = TaskFilter::new();
    let Some(query) = raw else {
        return Ok(filter);
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "id" => {
                let uuid = Uuid::parse_str(&value)
                    .map_err(|_| QueryError::InvalidId(value.to_string()))?;
                filter.ids.push(TaskId::from_uuid(uuid));
            }
            "type" => filter.types.push(value.into_owned()),
            "status" => filter.statuses.push(value.into_owned()),
            "behavior_types" => filter.behavior_types.push(value.into_owned()),
            "username" => filter.usernames.push(value.into_owned()),
            "start_date_since" => filter.start_date_since.push(timestamp(&key, &value)?),
            "start_date_before" => filter.start_date_before.push(timestamp(&key, &value)?),
            "end_date_since" => filter.end_date_since.push(timestamp(&key, &value)?),
            "end_date_before" => filter.end_date_before.push(timestamp(&key, &value)?),
            "include_null_end" => filter.include_null_end = true,
            _ => {}
        }
    }
    Ok(filter)
}

/// Returns `true` when `complete` carries a non-empty value.
#[must_use]
pub fn wants_completion(raw: Option<&str>) -> bool {
    raw.is_some_and(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "complete")
            .is_some_and(|(_, value)| !value.is_empty())
    })
}

fn timestamp(param: &str, value: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| QueryError::InvalidTimestamp {
            param: param.to_owned(),
            value: value.to_owned(),
        })
}

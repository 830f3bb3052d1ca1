//! Task status updates.

use super::TaskDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted status update. Statuses are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    created_date: DateTime<Utc>,
}

impl TaskStatus {
    /// Reconstructs a status from persisted storage.
    #[must_use]
    pub const fn from_persisted(
        status: String,
        detail: Option<String>,
        created_date: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            detail,
            created_date,
        }
    }

    /// Returns the status value.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns the optional status detail.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the store-assigned creation timestamp.
    #[must_use]
    pub const fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

/// A status update that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaskStatus {
    #[serde(default)]
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl NewTaskStatus {
    /// Creates a status update with the given value.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            detail: None,
        }
    }

    /// Sets the status detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the status value.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns the optional status detail.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Checks that the status value is not blank.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyStatus`] when the status is empty.
    pub fn validate(&self) -> Result<(), TaskDomainError> {
        if self.status.is_empty() {
            return Err(TaskDomainError::EmptyStatus);
        }
        Ok(())
    }
}

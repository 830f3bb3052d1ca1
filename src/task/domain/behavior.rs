//! Declarative behaviors attached to tasks.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A behavior attached to a task.
///
/// The payload is opaque to the store and interpreted only by the processor
/// registered for [`TaskBehavior::behavior_type`]. A task carries at most one
/// behavior of each type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBehavior {
    #[serde(rename = "type", default)]
    behavior_type: String,
    #[serde(default)]
    data: Option<Value>,
}

impl TaskBehavior {
    /// Creates a behavior of the given type without a payload.
    #[must_use]
    pub fn new(behavior_type: impl Into<String>) -> Self {
        Self {
            behavior_type: behavior_type.into(),
            data: None,
        }
    }

    /// Sets the behavior payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Reconstructs a behavior from persisted storage.
    #[must_use]
    pub const fn from_persisted(behavior_type: String, data: Option<Value>) -> Self {
        Self {
            behavior_type,
            data,
        }
    }

    /// Returns the behavior type.
    #[must_use]
    pub fn behavior_type(&self) -> &str {
        &self.behavior_type
    }

    /// Returns the behavior payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Checks that the behavior has a type.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyBehaviorType`] when the type is empty.
    pub fn validate(&self) -> Result<(), TaskDomainError> {
        if self.behavior_type.is_empty() {
            return Err(TaskDomainError::EmptyBehaviorType);
        }
        Ok(())
    }
}

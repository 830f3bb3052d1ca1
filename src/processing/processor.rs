//! Behavior processor contract and registry.

use crate::task::ports::{TaskStore, TaskStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors reported by behavior processors.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
    /// Behavior data could not be interpreted.
    #[error("invalid data for behavior '{behavior_type}': {reason}")]
    InvalidBehaviorData {
        /// The behavior whose data was rejected.
        behavior_type: String,
        /// Why the data was rejected.
        reason: String,
    },
    /// Processing stopped because the tick was cancelled.
    #[error("processing cancelled")]
    Cancelled,
}

/// Work run once per tick for one behavior type.
///
/// The scheduler guarantees that, across all replicas sharing a store, at most
/// one invocation per behavior type is active within the claim window.
#[async_trait]
pub trait BehaviorProcessor<S: TaskStore>: Send + Sync {
    /// Processes every task carrying this processor's behavior.
    ///
    /// `tick_time` is the scheduler's notion of "now" for this tick.
    /// Implementations should stop early once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when the run as a whole fails.
    async fn process(
        &self,
        store: &S,
        tick_time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessorError>;
}

/// Immutable mapping from behavior type to processor.
///
/// Built before the scheduler starts and shared read-only afterwards.
pub struct ProcessorRegistry<S: TaskStore> {
    processors: BTreeMap<String, Arc<dyn BehaviorProcessor<S>>>,
}

impl<S: TaskStore> Default for ProcessorRegistry<S> {
    fn default() -> Self {
        Self {
            processors: BTreeMap::new(),
        }
    }
}

impl<S: TaskStore> ProcessorRegistry<S> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor, replacing any earlier one for the same type.
    #[must_use]
    pub fn with_processor(
        mut self,
        behavior_type: impl Into<String>,
        processor: Arc<dyn BehaviorProcessor<S>>,
    ) -> Self {
        self.processors.insert(behavior_type.into(), processor);
        self
    }

    /// Iterates over registered behavior types and processors in type order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn BehaviorProcessor<S>>)> {
        self.processors
            .iter()
            .map(|(behavior_type, processor)| (behavior_type.as_str(), processor))
    }

    /// Returns the number of registered processors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

//! Periodic behavior processing.
//!
//! Every replica runs a [`BehaviorScheduler`]. On each tick it attempts every
//! registered [`BehaviorProcessor`] once. A [`ClaimArbiter`] makes sure at
//! most one replica actually runs a given behavior type within the claim
//! window, using marker tasks in the shared task store as the lock.

mod claim;
mod processor;
mod scheduler;

pub use claim::{ClaimArbiter, ClaimOutcome, marker_type};
pub use processor::{BehaviorProcessor, ProcessorError, ProcessorRegistry};
pub use scheduler::{AttemptOutcome, BehaviorScheduler, SchedulerSettings, TickReport};

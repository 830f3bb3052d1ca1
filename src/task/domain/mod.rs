//! Domain model for asynchronous task tracking.
//!
//! A task carries a type, an optional owner and payload, lifecycle dates,
//! append-only statuses, and behaviors interpreted by behavior processors.
//! The domain stays free of persistence concerns.

mod behavior;
mod children;
mod error;
mod filter;
mod ids;
mod status;
mod task;

pub use behavior::TaskBehavior;
pub use children::Children;
pub use error::TaskDomainError;
pub use filter::{TaskFilter, TaskOrder};
pub use ids::TaskId;
pub use status::{NewTaskStatus, TaskStatus};
pub use task::{NewTask, PersistedTaskData, Task};

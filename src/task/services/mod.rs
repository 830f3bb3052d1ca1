//! Application services for request-level task operations.

mod tasks;

pub use tasks::{ErrorKind, TaskService, TaskServiceError, TaskServiceResult};

//! HTTP surface over the task service.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/` | greeting |
//! | GET | `/tasks` | list tasks matching query filters |
//! | POST | `/tasks` | create a task |
//! | GET | `/tasks/{id}` | fetch a task with its children |
//! | DELETE | `/tasks/{id}` | delete a task |
//! | POST | `/tasks/{id}/status` | append a status, optionally completing |
//! | POST | `/tasks/{id}/behaviors` | attach a behavior |

mod error;
mod handlers;
mod query;

pub use error::ApiError;
pub use query::{QueryError, parse_task_filter};

use crate::task::{ports::TaskStore, services::TaskService};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Builds the application router.
#[must_use]
pub fn router<S: TaskStore>(service: TaskService<S>) -> Router {
    Router::new()
        .route("/", get(handlers::greeting))
        .route(
            "/tasks",
            get(handlers::list_tasks::<S>).post(handlers::create_task::<S>),
        )
        .route(
            "/tasks/{id}",
            get(handlers::get_task::<S>).delete(handlers::delete_task::<S>),
        )
        .route("/tasks/{id}/status", post(handlers::add_status::<S>))
        .route("/tasks/{id}/behaviors", post(handlers::add_behavior::<S>))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

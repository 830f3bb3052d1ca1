//! `PostgreSQL` adapters for task persistence.

mod filter;
mod models;
mod schema;
mod store;

pub use store::{PostgresTaskStore, TaskPgPool};

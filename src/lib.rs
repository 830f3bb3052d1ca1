//! async-tasks: tracking for long-running work owned by other services.
//!
//! Tasks carry a type, an owner, a payload, append-only statuses, and
//! behaviors. A periodic scheduler runs one behavior processor per behavior
//! type across any number of replicas, using marker tasks in the shared store
//! as its only lock.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure task model with no infrastructure dependencies
//! - **Ports**: The transactional [`task::ports::TaskStore`] contract
//! - **Adapters**: `PostgreSQL` and in-memory stores
//!
//! # Modules
//!
//! - [`task`]: Task model, store contract, adapters, and request services
//! - [`processing`]: Claim arbitration and the periodic scheduler
//! - [`behaviors`]: Built-in behavior processors
//! - [`api`]: HTTP surface
//! - [`config`] and [`telemetry`]: Service wiring

pub mod api;
pub mod behaviors;
pub mod config;
pub mod processing;
pub mod task;
pub mod telemetry;

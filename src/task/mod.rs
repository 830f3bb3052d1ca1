//! Task tracking for asynchronous work owned by other services.
//!
//! A task carries a type, an optional owner and payload, append-only status
//! updates, and behaviors that behavior processors act on over time. The
//! module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;

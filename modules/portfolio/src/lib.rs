//! Portfolio service
//!
//! Originates the funding-request choreography, meters token usage for the
//! analyses it runs, and mirrors the knowledge-base context catalog. As the
//! origin of state-changing events it also aggregates sync outcomes and
//! re-drives synchronization for entities that never converged.

pub mod config;
pub mod contexts;
pub mod funding;
pub mod outcomes;
pub mod usage;

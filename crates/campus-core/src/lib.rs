//! Cross-cutting building blocks shared by every Campus service:
//! configuration loading, health checks, request ids, tracing and serde helpers.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;

//! Test utilities for Campus services.
//!
//! Provides `MockAuth` for building gateway identity headers.
//! Import in `#[cfg(test)]` blocks and `tests/` only, never in production code.

pub mod auth;

//! Integration tests for the dispatch engine
//!
//! This test suite validates:
//! - The full request lifecycle across listings, requests and drivers
//! - Cross-entity invariants under concurrent coordinator calls
//! - Parity between the in-memory and SQLite backends

pub mod test_utils;

#[cfg(test)]
mod lifecycle_tests;

#[cfg(test)]
mod concurrency_tests;

#[cfg(test)]
mod sqlite_backend_tests;

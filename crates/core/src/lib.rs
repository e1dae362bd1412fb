//! Core functionality shared across the LifeLink dispatch workspace.
//!
//! This crate provides configuration loading, logging initialization,
//! the wall clock abstraction and the core error type.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{Config, EventsConfig, LoggingConfig, ServerConfig, StorageBackend, StorageConfig};
pub use error::{CoreError, Result};

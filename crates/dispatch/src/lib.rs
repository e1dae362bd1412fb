//! Organ transport dispatch engine.
//!
//! This crate provides:
//! - Storage traits for hospitals, listings, drivers and requests, with in-memory and
//!   SQLite backends
//! - The prioritization engine that orders open requests
//! - The assignment coordinator, single writer of the request lifecycle
//! - Transition events and read-only portal views

pub mod coordinator;
pub mod events;
pub mod locks;
pub mod priority;
pub mod store;
pub mod views;

pub use coordinator::{parse_status, Coordinator, TransportSubmission, UnlinkedSubmission};
pub use events::{BroadcastSink, DispatchEvent, EventSink, FanoutSink, RecordingSink, TracingSink};
pub use locks::{KeyedLocks, LockHandle};
pub use priority::{rank, rank_ledger, Ranking};
pub use store::{
    DriverRegistry, HospitalRegistry, ListingFilter, ListingStore, MemoryDriverRegistry,
    MemoryHospitalRegistry, MemoryListingStore, MemoryRequestLedger, RequestLedger, SqliteStore,
    Stores,
};
pub use views::{DispatchViews, DriverBoard};

//! Domain model for organ transport dispatch.
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Hospitals, organ listings, transport requests and drivers
//! - Closed status taxonomies and the request transition table
//! - Hash-chained transition history for each request
//! - The dispatch error taxonomy

pub mod driver;
pub mod error;
pub mod hospital;
pub mod ids;
pub mod listing;
pub mod request;
pub mod status;

pub use driver::{Driver, DriverContact, NewDriver};
pub use error::{DispatchError, Result};
pub use hospital::{Hospital, NewHospital};
pub use ids::{DriverId, HospitalId, ListingId, RequestId};
pub use listing::{ListingSubmission, NewListing, OrganListing};
pub use request::{NewTransportRequest, StatusTransition, TransportRequest, GENESIS_HASH};
pub use status::{AvailabilityStatus, PriorityStatus, RequestStatus};

//! Dispatch errors
//!
//! Every variant is recoverable and caller facing. An operation that returns
//! one of these has left all entities unchanged.

use thiserror::Error;

use crate::ids::{DriverId, HospitalId, ListingId, RequestId};
use crate::status::RequestStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Listing {listing_id} cannot be requested: {reason}")]
    InvalidListing { listing_id: ListingId, reason: String },

    #[error("Invalid priority status: {0:?}")]
    InvalidPriority(String),

    #[error("Invalid request status: {0:?}")]
    InvalidStatus(String),

    #[error("Invalid availability status: {0:?}")]
    InvalidAvailability(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Driver {driver_id} already has an active transport")]
    DriverUnavailable { driver_id: DriverId },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl DispatchError {
    pub fn listing_not_found(id: ListingId) -> Self {
        DispatchError::NotFound {
            entity: "listing",
            id: id.get(),
        }
    }

    pub fn request_not_found(id: RequestId) -> Self {
        DispatchError::NotFound {
            entity: "request",
            id: id.get(),
        }
    }

    pub fn driver_not_found(id: DriverId) -> Self {
        DispatchError::NotFound {
            entity: "driver",
            id: id.get(),
        }
    }

    pub fn hospital_not_found(id: HospitalId) -> Self {
        DispatchError::NotFound {
            entity: "hospital",
            id: id.get(),
        }
    }

    /// Stable machine readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::InvalidListing { .. } => "invalid_listing",
            DispatchError::InvalidPriority(_) => "invalid_priority",
            DispatchError::InvalidStatus(_) => "invalid_status",
            DispatchError::InvalidAvailability(_) => "invalid_availability",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::DriverUnavailable { .. } => "driver_unavailable",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::Storage(_) => "storage",
            DispatchError::LockPoisoned(_) => "lock_poisoned",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

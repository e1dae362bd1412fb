//! Transport request lifecycle
//!
//! A request moves `Requested -> Assigned -> En-route -> Delivered`, or to
//! `Cancelled` from any non-terminal status. Every status or driver change is
//! appended to a BLAKE3 hash-chained history so the record can be audited.

use lifelink_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::ids::{DriverId, ListingId, RequestId};
use crate::status::{PriorityStatus, RequestStatus};

/// Previous-hash value of the first transition in every history
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Transport order raised by a requesting hospital
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRequest {
    /// Unique request identifier
    pub id: RequestId,

    /// Listing the request was raised against, if any
    pub listing_id: Option<ListingId>,

    /// Requesting hospital name
    pub hospital: String,

    /// Organ type, snapshotted at creation
    pub organ_type: String,

    /// Pickup location, snapshotted at creation
    pub origin: String,

    /// Delivery address of the requesting hospital
    pub destination: String,

    /// Contact phone at the destination
    pub contact_phone: String,

    /// Free-text notes
    pub notes: String,

    /// Urgency used for ranking
    pub priority: PriorityStatus,

    /// Current status
    pub status: RequestStatus,

    /// Assigned driver; present iff status requires one
    pub driver_id: Option<DriverId>,

    /// Creation timestamp (Unix epoch milliseconds)
    pub created_at: Timestamp,

    /// Last status or driver change
    pub updated_at: Timestamp,

    /// Hash-chained status and driver history
    pub history: Vec<StatusTransition>,
}

/// Request fields supplied at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransportRequest {
    pub listing_id: Option<ListingId>,
    pub hospital: String,
    pub organ_type: String,
    pub origin: String,
    pub destination: String,
    pub contact_phone: String,
    pub notes: String,
    pub priority: PriorityStatus,
}

impl NewTransportRequest {
    /// Field-level checks the ledger applies before inserting
    pub fn validate(&self) -> Result<()> {
        if self.hospital.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "requesting hospital is required".into(),
            ));
        }
        if self.organ_type.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "organ type is required".into(),
            ));
        }
        Ok(())
    }
}

impl TransportRequest {
    /// Create a request in `Requested` with its genesis history entry
    pub fn new(id: RequestId, new: NewTransportRequest, created_at: Timestamp) -> Self {
        let genesis = StatusTransition::new(
            id,
            None,
            RequestStatus::Requested,
            None,
            created_at,
            GENESIS_HASH.to_vec(),
        );

        Self {
            id,
            listing_id: new.listing_id,
            hospital: new.hospital,
            organ_type: new.organ_type,
            origin: new.origin,
            destination: new.destination,
            contact_phone: new.contact_phone,
            notes: new.notes,
            priority: new.priority,
            status: RequestStatus::Requested,
            driver_id: None,
            created_at,
            updated_at: created_at,
            history: vec![genesis],
        }
    }

    /// Move to `next`, binding `driver_id` as the new status requires.
    pub fn transition(
        &mut self,
        next: RequestStatus,
        driver_id: Option<DriverId>,
        timestamp: Timestamp,
    ) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DispatchError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next.requires_driver() != driver_id.is_some() {
            return Err(DispatchError::InvalidRequest(format!(
                "status {next} {} a driver",
                if next.requires_driver() {
                    "requires"
                } else {
                    "must not carry"
                }
            )));
        }

        self.push_history(Some(self.status), next, driver_id, timestamp);
        self.status = next;
        self.driver_id = driver_id;
        self.updated_at = timestamp;
        Ok(())
    }

    /// Swap the driver of an `Assigned` request
    pub fn reassign(&mut self, driver_id: DriverId, timestamp: Timestamp) -> Result<()> {
        if self.status != RequestStatus::Assigned {
            return Err(DispatchError::InvalidTransition {
                from: self.status,
                to: RequestStatus::Assigned,
            });
        }

        self.push_history(
            Some(RequestStatus::Assigned),
            RequestStatus::Assigned,
            Some(driver_id),
            timestamp,
        );
        self.driver_id = Some(driver_id);
        self.updated_at = timestamp;
        Ok(())
    }

    fn push_history(
        &mut self,
        from: Option<RequestStatus>,
        to: RequestStatus,
        driver_id: Option<DriverId>,
        timestamp: Timestamp,
    ) {
        let prev_hash = self.last_hash();
        self.history.push(StatusTransition::new(
            self.id, from, to, driver_id, timestamp, prev_hash,
        ));
    }

    /// Hash of the latest history entry
    pub fn last_hash(&self) -> Vec<u8> {
        self.history
            .last()
            .map(|t| t.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_vec())
    }

    /// Check every link and hash in the history
    pub fn verify_history(&self) -> bool {
        let mut expected_prev = GENESIS_HASH.to_vec();
        for transition in &self.history {
            if transition.request_id != self.id
                || transition.prev_hash != expected_prev
                || !transition.verify_hash()
            {
                return false;
            }
            expected_prev = transition.hash.clone();
        }
        self.history
            .last()
            .map_or(false, |last| last.to == self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Holds a driver's capacity slot
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Driver presence agrees with the status
    pub fn driver_consistent(&self) -> bool {
        self.driver_id.is_some() == self.status.requires_driver()
    }
}

/// One entry of a request's audited history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Request this transition belongs to
    pub request_id: RequestId,

    /// Previous status, `None` for creation
    pub from: Option<RequestStatus>,

    /// New status
    pub to: RequestStatus,

    /// Driver bound after the transition
    pub driver_id: Option<DriverId>,

    /// Transition timestamp (Unix epoch milliseconds)
    pub timestamp: Timestamp,

    /// BLAKE3 hash of previous transition
    pub prev_hash: Vec<u8>,

    /// BLAKE3 hash of this transition
    pub hash: Vec<u8>,
}

impl StatusTransition {
    pub fn new(
        request_id: RequestId,
        from: Option<RequestStatus>,
        to: RequestStatus,
        driver_id: Option<DriverId>,
        timestamp: Timestamp,
        prev_hash: Vec<u8>,
    ) -> Self {
        let mut transition = Self {
            request_id,
            from,
            to,
            driver_id,
            timestamp,
            prev_hash,
            hash: Vec::new(),
        };

        transition.hash = transition.compute_hash();
        transition
    }

    /// Compute BLAKE3 hash of this transition
    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.request_id.get().to_le_bytes());
        hasher.update(self.from.map_or("", |s| s.as_str()).as_bytes());
        hasher.update(&[0u8]);
        hasher.update(self.to.as_str().as_bytes());
        hasher.update(&self.driver_id.map_or(-1, |d| d.get()).to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&self.prev_hash);
        hasher.finalize().as_bytes().to_vec()
    }

    /// Verify hash matches computed hash
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Hex form of the hash for logs
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }
}

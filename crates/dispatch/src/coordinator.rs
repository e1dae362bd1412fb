//! Assignment coordinator
//!
//! The single writer of request status, request driver binding, driver
//! capacity slots and listing availability. Listings and linked requests
//! enter through it so their hospitals are checked against the registry. Every operation validates all
//! of its preconditions while holding the locks of the entities it touches,
//! then writes. Locks are taken in a fixed order (request, then drivers by
//! ascending id, then listing) so concurrent operations cannot deadlock.
//! Events are emitted before the request lock is released.

use std::hash::Hash;
use std::sync::{Arc, MutexGuard};

use lifelink_domain::{
    AvailabilityStatus, DispatchError, DriverId, Hospital, HospitalId, ListingId,
    ListingSubmission, NewTransportRequest, PriorityStatus, RequestId, RequestStatus, Result,
    TransportRequest,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::events::{DispatchEvent, EventSink};
use crate::locks::{acquire, KeyedLocks, LockHandle};
use crate::store::{
    ensure_listing_available, DriverRegistry, HospitalRegistry, ListingStore, RequestLedger,
    Stores,
};

/// Transport request raised against a published listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSubmission {
    pub listing_id: ListingId,
    /// Requesting hospital; must be registered
    pub hospital_id: HospitalId,
    /// Delivery address of the requesting hospital
    pub destination: String,
    pub contact_phone: String,
    #[serde(default)]
    pub notes: String,
    /// Priority name; `None` inherits the listing's priority
    #[serde(default)]
    pub priority: Option<String>,
}

/// Emergency transport raised without a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkedSubmission {
    pub hospital: String,
    pub organ_type: String,
    /// Pickup location
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub notes: String,
    /// Priority name; `None` means `Emergency`
    #[serde(default)]
    pub priority: Option<String>,
}

/// Parse a free-text request status
pub fn parse_status(raw: &str) -> Result<RequestStatus> {
    raw.parse()
}

fn parse_priority(raw: Option<&str>, default: PriorityStatus) -> Result<PriorityStatus> {
    match raw {
        Some(name) => name.parse(),
        None => Ok(default),
    }
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DispatchError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn rejected(operation: &'static str, err: DispatchError) -> DispatchError {
    warn!(operation, kind = err.kind(), error = %err, "Dispatch operation rejected");
    err
}

fn missing_listing(listing_id: ListingId, err: DispatchError) -> DispatchError {
    match err {
        DispatchError::NotFound { .. } => DispatchError::InvalidListing {
            listing_id,
            reason: "listing does not exist".into(),
        },
        other => other,
    }
}

fn status_changed(request: &TransportRequest, from: Option<RequestStatus>) -> DispatchEvent {
    DispatchEvent::StatusChanged {
        request_id: request.id,
        from,
        to: request.status,
        driver_id: request.driver_id,
        sequence: request.history.len() as u64,
        timestamp: request.updated_at,
    }
}

/// Serializes every write touching listings, requests and drivers
pub struct Coordinator {
    hospitals: Arc<dyn HospitalRegistry>,
    listings: Arc<dyn ListingStore>,
    drivers: Arc<dyn DriverRegistry>,
    requests: Arc<dyn RequestLedger>,
    events: Arc<dyn EventSink>,
    request_locks: KeyedLocks<RequestId>,
    listing_locks: KeyedLocks<ListingId>,
    driver_locks: KeyedLocks<DriverId>,
}

impl Coordinator {
    pub fn new(stores: Stores, events: Arc<dyn EventSink>) -> Self {
        Self {
            hospitals: stores.hospitals,
            listings: stores.listings,
            drivers: stores.drivers,
            requests: stores.requests,
            events,
            request_locks: KeyedLocks::new(),
            listing_locks: KeyedLocks::new(),
            driver_locks: KeyedLocks::new(),
        }
    }

    pub fn hospitals(&self) -> &Arc<dyn HospitalRegistry> {
        &self.hospitals
    }

    pub fn listings(&self) -> &Arc<dyn ListingStore> {
        &self.listings
    }

    pub fn drivers(&self) -> &Arc<dyn DriverRegistry> {
        &self.drivers
    }

    pub fn requests(&self) -> &Arc<dyn RequestLedger> {
        &self.requests
    }

    /// Publish a listing on behalf of a registered hospital.
    ///
    /// Hospital name, city and state are taken from the registry.
    pub fn publish_listing(&self, submission: ListingSubmission) -> Result<ListingId> {
        self.publish_checked(submission)
            .map_err(|e| rejected("publish_listing", e))
    }

    fn publish_checked(&self, submission: ListingSubmission) -> Result<ListingId> {
        let hospital = self.registered_hospital(submission.hospital_id)?;
        let id = self.listings.publish(submission.for_hospital(&hospital))?;
        info!(listing_id = %id, hospital = %hospital.name, "Listing published");
        Ok(id)
    }

    /// Raise a transport request against a listing.
    ///
    /// The listing must exist and be `Available`. Organ type and origin are
    /// copied from it; listing availability is left untouched.
    pub fn submit_request(&self, submission: TransportSubmission) -> Result<RequestId> {
        self.submit_locked(submission)
            .map_err(|e| rejected("submit_request", e))
    }

    fn submit_locked(&self, submission: TransportSubmission) -> Result<RequestId> {
        let listing_id = submission.listing_id;
        let listing_lock = self.listing_locks.handle(listing_id)?;
        let _listing_guard = acquire(&listing_lock)?;

        let listing = self
            .listings
            .get(listing_id)
            .map_err(|e| missing_listing(listing_id, e))?;
        ensure_listing_available(&listing)?;

        let priority = parse_priority(submission.priority.as_deref(), listing.priority)?;
        let hospital = self.registered_hospital(submission.hospital_id)?;
        require(&submission.destination, "destination")?;
        require(&submission.contact_phone, "contact phone")?;

        let id = self.requests.create(NewTransportRequest {
            listing_id: Some(listing_id),
            hospital: hospital.name,
            organ_type: listing.organ_type.clone(),
            origin: listing.origin_label(),
            destination: submission.destination,
            contact_phone: submission.contact_phone,
            notes: submission.notes,
            priority,
        })?;

        let request = self.requests.get(id)?;
        info!(
            request_id = %id,
            listing_id = %listing_id,
            priority = %priority,
            hospital = %request.hospital,
            "Transport request submitted"
        );
        self.events.emit(&status_changed(&request, None));
        Ok(id)
    }

    /// Raise a transport request with no listing behind it.
    ///
    /// Priority defaults to `Emergency`.
    pub fn submit_unlinked_request(&self, submission: UnlinkedSubmission) -> Result<RequestId> {
        self.submit_unlinked(submission)
            .map_err(|e| rejected("submit_unlinked_request", e))
    }

    fn submit_unlinked(&self, submission: UnlinkedSubmission) -> Result<RequestId> {
        let priority = parse_priority(submission.priority.as_deref(), PriorityStatus::Emergency)?;
        require(&submission.origin, "origin")?;
        require(&submission.destination, "destination")?;

        let id = self.requests.create(NewTransportRequest {
            listing_id: None,
            hospital: submission.hospital,
            organ_type: submission.organ_type,
            origin: submission.origin,
            destination: submission.destination,
            contact_phone: submission.contact_phone,
            notes: submission.notes,
            priority,
        })?;

        let request = self.requests.get(id)?;
        info!(
            request_id = %id,
            priority = %priority,
            hospital = %request.hospital,
            "Unlinked transport request submitted"
        );
        self.events.emit(&status_changed(&request, None));
        Ok(id)
    }

    /// Bind an eligible driver to a `Requested` request.
    ///
    /// Claims the driver's capacity slot and reserves the linked listing.
    pub fn assign_driver(&self, request_id: RequestId, driver_id: DriverId) -> Result<()> {
        self.assign_locked(request_id, driver_id)
            .map_err(|e| rejected("assign_driver", e))
    }

    fn assign_locked(&self, request_id: RequestId, driver_id: DriverId) -> Result<()> {
        let request_lock = self.request_locks.handle(request_id)?;
        let _request_guard = acquire(&request_lock)?;
        let request = self.requests.get(request_id)?;

        let driver_lock = self.driver_locks.handle(driver_id)?;
        let _driver_guard = acquire(&driver_lock)?;
        let driver = self.drivers.get(driver_id)?;

        let listing_lock = self.listing_handle(request.listing_id)?;
        let _listing_guard = Self::acquire_optional(&listing_lock)?;

        if request.status != RequestStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Assigned,
            });
        }
        if !driver.is_eligible() {
            return Err(DispatchError::DriverUnavailable { driver_id });
        }
        if let Some(listing_id) = request.listing_id {
            let listing = self
                .listings
                .get(listing_id)
                .map_err(|e| missing_listing(listing_id, e))?;
            ensure_listing_available(&listing)?;
        }

        self.drivers.claim(driver_id, request_id)?;
        let updated = match self.requests.update(request_id, &mut |r, stamp| {
            r.transition(RequestStatus::Assigned, Some(driver_id), stamp)
        }) {
            Ok(updated) => updated,
            Err(e) => {
                self.release_quietly(driver_id, request_id);
                return Err(e);
            }
        };
        if let Some(listing_id) = request.listing_id {
            self.set_listing(listing_id, AvailabilityStatus::Reserved)?;
        }

        info!(
            request_id = %request_id,
            driver_id = %driver_id,
            driver = %driver.full_name(),
            "Driver assigned"
        );
        self.events.emit(&status_changed(&updated, Some(request.status)));
        Ok(())
    }

    /// Move a request to `target`.
    ///
    /// Accepts the immediate forward successor (`En-route`, `Delivered`) or
    /// `Cancelled` from a non-terminal status. `Assigned` is reached only
    /// through [`Coordinator::assign_driver`].
    pub fn advance_status(&self, request_id: RequestId, target: RequestStatus) -> Result<()> {
        self.advance_locked(request_id, target)
            .map_err(|e| rejected("advance_status", e))
    }

    fn advance_locked(&self, request_id: RequestId, target: RequestStatus) -> Result<()> {
        let request_lock = self.request_locks.handle(request_id)?;
        let _request_guard = acquire(&request_lock)?;
        let request = self.requests.get(request_id)?;

        let from = request.status;
        if target == RequestStatus::Assigned || !from.can_transition_to(target) {
            return Err(DispatchError::InvalidTransition { from, to: target });
        }

        let driver_lock = request
            .driver_id
            .map(|d| self.driver_locks.handle(d))
            .transpose()?;
        let _driver_guard = Self::acquire_optional(&driver_lock)?;

        let listing_lock = self.listing_handle(request.listing_id)?;
        let _listing_guard = Self::acquire_optional(&listing_lock)?;

        let next_driver = if target == RequestStatus::Cancelled {
            None
        } else {
            request.driver_id
        };
        let updated = self.requests.update(request_id, &mut |r, stamp| {
            r.transition(target, next_driver, stamp)
        })?;

        if from.is_active() && !target.is_active() {
            if let Some(driver_id) = request.driver_id {
                self.drivers.release(driver_id, request_id)?;
            }
        }
        if let Some(listing_id) = request.listing_id {
            match target {
                RequestStatus::Delivered => {
                    self.set_listing(listing_id, AvailabilityStatus::Unavailable)?
                }
                RequestStatus::Cancelled if from.is_active() => {
                    self.set_listing(listing_id, AvailabilityStatus::Available)?
                }
                _ => {}
            }
        }

        info!(
            request_id = %request_id,
            from = %from,
            to = %target,
            "Transport request advanced"
        );
        self.events.emit(&status_changed(&updated, Some(from)));
        Ok(())
    }

    /// Swap the driver of an `Assigned` request for another eligible driver.
    ///
    /// Reassigning to the current driver changes nothing.
    pub fn reassign_driver(&self, request_id: RequestId, driver_id: DriverId) -> Result<()> {
        self.reassign_locked(request_id, driver_id)
            .map_err(|e| rejected("reassign_driver", e))
    }

    fn reassign_locked(&self, request_id: RequestId, driver_id: DriverId) -> Result<()> {
        let request_lock = self.request_locks.handle(request_id)?;
        let _request_guard = acquire(&request_lock)?;
        let request = self.requests.get(request_id)?;

        let mut driver_ids: Vec<DriverId> = request.driver_id.into_iter().collect();
        driver_ids.push(driver_id);
        driver_ids.sort();
        driver_ids.dedup();
        let driver_locks = driver_ids
            .iter()
            .map(|d| self.driver_locks.handle(*d))
            .collect::<Result<Vec<_>>>()?;
        let _driver_guards = driver_locks
            .iter()
            .map(|lock| acquire(lock))
            .collect::<Result<Vec<_>>>()?;

        let driver = self.drivers.get(driver_id)?;
        if request.status != RequestStatus::Assigned {
            return Err(DispatchError::InvalidTransition {
                from: request.status,
                to: RequestStatus::Assigned,
            });
        }
        let previous = request.driver_id.ok_or_else(|| {
            DispatchError::Storage(format!("assigned request {request_id} has no driver"))
        })?;
        if previous == driver_id {
            debug!(request_id = %request_id, driver_id = %driver_id, "Reassignment to current driver ignored");
            return Ok(());
        }
        if !driver.is_eligible() {
            return Err(DispatchError::DriverUnavailable { driver_id });
        }

        self.drivers.claim(driver_id, request_id)?;
        let updated = match self
            .requests
            .update(request_id, &mut |r, stamp| r.reassign(driver_id, stamp))
        {
            Ok(updated) => updated,
            Err(e) => {
                self.release_quietly(driver_id, request_id);
                return Err(e);
            }
        };
        self.drivers.release(previous, request_id)?;

        info!(
            request_id = %request_id,
            previous = %previous,
            driver_id = %driver_id,
            "Driver reassigned"
        );
        self.events.emit(&DispatchEvent::DriverReassigned {
            request_id,
            previous,
            driver_id,
            sequence: updated.history.len() as u64,
            timestamp: updated.updated_at,
        });
        Ok(())
    }

    fn registered_hospital(&self, id: HospitalId) -> Result<Hospital> {
        self.hospitals.get(id).map_err(|e| match e {
            DispatchError::NotFound { .. } => {
                DispatchError::InvalidRequest(format!("hospital {id} is not registered"))
            }
            other => other,
        })
    }

    fn listing_handle(
        &self,
        listing_id: Option<ListingId>,
    ) -> Result<Option<LockHandle<'_, ListingId>>> {
        listing_id.map(|l| self.listing_locks.handle(l)).transpose()
    }

    fn acquire_optional<'h, K: Eq + Hash + Copy>(
        handle: &'h Option<LockHandle<'_, K>>,
    ) -> Result<Option<MutexGuard<'h, ()>>> {
        handle.as_deref().map(acquire).transpose()
    }

    fn set_listing(&self, listing_id: ListingId, status: AvailabilityStatus) -> Result<()> {
        self.listings
            .set_availability(listing_id, status)
            .map_err(|e| {
                error!(listing_id = %listing_id, availability = %status, error = %e, "Listing update failed after request write");
                e
            })
    }

    fn release_quietly(&self, driver_id: DriverId, request_id: RequestId) {
        if let Err(e) = self.drivers.release(driver_id, request_id) {
            error!(driver_id = %driver_id, request_id = %request_id, error = %e, "Driver slot release failed");
        }
    }
}

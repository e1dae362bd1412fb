//! In-memory store backends.
//!
//! Each store keeps `RwLock<HashMap<Id, Arc<Mutex<Record>>>>`: the map lock
//! is held only to insert or look up a record handle, record changes happen
//! under that record's own mutex. All state is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use lifelink_core::Clock;
use lifelink_domain::{
    AvailabilityStatus, DispatchError, Driver, DriverContact, DriverId, Hospital, HospitalId,
    ListingId, NewDriver, NewHospital, NewListing, NewTransportRequest, OrganListing, RequestId,
    RequestStatus, Result, TransportRequest,
};
use tracing::debug;

use super::{
    ensure_listing_available, lock_error, next_update_stamp, sort_listings, DriverRegistry,
    HospitalRegistry, ListingFilter, ListingStore, RequestLedger, RequestMutator,
};

type Records<K, V> = RwLock<HashMap<K, Arc<Mutex<V>>>>;

fn record_handle<K, V>(records: &Records<K, V>, id: &K) -> Result<Option<Arc<Mutex<V>>>>
where
    K: std::hash::Hash + Eq,
{
    let map = records.read().map_err(lock_error)?;
    Ok(map.get(id).cloned())
}

fn snapshot<K, V: Clone>(records: &Records<K, V>) -> Result<Vec<V>> {
    let handles: Vec<Arc<Mutex<V>>> = {
        let map = records.read().map_err(lock_error)?;
        map.values().cloned().collect()
    };
    handles
        .iter()
        .map(|h| h.lock().map(|v| v.clone()).map_err(lock_error))
        .collect()
}

/// In-memory hospital registry; records never change after registration
pub struct MemoryHospitalRegistry {
    hospitals: RwLock<HashMap<HospitalId, Hospital>>,
    next_id: AtomicI64,
}

impl MemoryHospitalRegistry {
    pub fn new() -> Self {
        Self {
            hospitals: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryHospitalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HospitalRegistry for MemoryHospitalRegistry {
    fn register(&self, hospital: NewHospital) -> Result<HospitalId> {
        hospital.validate()?;
        let mut map = self.hospitals.write().map_err(lock_error)?;
        if map.values().any(|h| h.has_name(&hospital.name)) {
            return Err(DispatchError::InvalidRequest(format!(
                "hospital {:?} is already registered",
                hospital.name.trim()
            )));
        }

        let id = HospitalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        map.insert(id, hospital.into_hospital(id));
        debug!(hospital_id = %id, "Hospital registered");
        Ok(id)
    }

    fn get(&self, id: HospitalId) -> Result<Hospital> {
        let map = self.hospitals.read().map_err(lock_error)?;
        map.get(&id)
            .cloned()
            .ok_or(DispatchError::hospital_not_found(id))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Hospital>> {
        let map = self.hospitals.read().map_err(lock_error)?;
        Ok(map.values().find(|h| h.has_name(name)).cloned())
    }

    fn list(&self) -> Result<Vec<Hospital>> {
        let map = self.hospitals.read().map_err(lock_error)?;
        let mut hospitals: Vec<Hospital> = map.values().cloned().collect();
        hospitals.sort_by_key(|h| (h.name.to_lowercase(), h.id));
        Ok(hospitals)
    }
}

/// In-memory listing store
pub struct MemoryListingStore {
    listings: Records<ListingId, OrganListing>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl MemoryListingStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            listings: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            clock,
        }
    }

    fn handle(&self, id: ListingId) -> Result<Arc<Mutex<OrganListing>>> {
        record_handle(&self.listings, &id)?.ok_or(DispatchError::listing_not_found(id))
    }
}

impl ListingStore for MemoryListingStore {
    fn publish(&self, listing: NewListing) -> Result<ListingId> {
        listing.validate()?;
        let id = ListingId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = listing.into_listing(id, self.clock.now());

        let mut map = self.listings.write().map_err(lock_error)?;
        map.insert(id, Arc::new(Mutex::new(record)));
        debug!(listing_id = %id, "Listing published");
        Ok(id)
    }

    fn get(&self, id: ListingId) -> Result<OrganListing> {
        let handle = self.handle(id)?;
        let listing = handle.lock().map_err(lock_error)?;
        Ok(listing.clone())
    }

    fn set_availability(&self, id: ListingId, status: AvailabilityStatus) -> Result<()> {
        let handle = self.handle(id)?;
        let mut listing = handle.lock().map_err(lock_error)?;
        listing.availability = status;
        debug!(listing_id = %id, availability = %status, "Listing availability changed");
        Ok(())
    }

    fn list(&self, filter: &ListingFilter) -> Result<Vec<OrganListing>> {
        let mut listings: Vec<OrganListing> = snapshot(&self.listings)?
            .into_iter()
            .filter(|l| filter.matches(l))
            .collect();
        sort_listings(&mut listings);
        Ok(listings)
    }
}

/// In-memory driver registry
pub struct MemoryDriverRegistry {
    drivers: Records<DriverId, Driver>,
    next_id: AtomicI64,
}

impl MemoryDriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn handle(&self, id: DriverId) -> Result<Arc<Mutex<Driver>>> {
        record_handle(&self.drivers, &id)?.ok_or(DispatchError::driver_not_found(id))
    }

    fn sorted(mut drivers: Vec<Driver>) -> Vec<Driver> {
        drivers.sort_by_key(|d| d.sort_key());
        drivers
    }
}

impl Default for MemoryDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry for MemoryDriverRegistry {
    fn register(&self, driver: NewDriver) -> Result<DriverId> {
        driver.validate()?;
        let id = DriverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut map = self.drivers.write().map_err(lock_error)?;
        map.insert(id, Arc::new(Mutex::new(driver.into_driver(id))));
        debug!(driver_id = %id, "Driver registered");
        Ok(id)
    }

    fn get(&self, id: DriverId) -> Result<Driver> {
        let handle = self.handle(id)?;
        let driver = handle.lock().map_err(lock_error)?;
        Ok(driver.clone())
    }

    fn is_eligible(&self, id: DriverId) -> Result<bool> {
        Ok(self.get(id)?.is_eligible())
    }

    fn list_available(&self) -> Result<Vec<Driver>> {
        Ok(Self::sorted(
            snapshot(&self.drivers)?
                .into_iter()
                .filter(Driver::is_eligible)
                .collect(),
        ))
    }

    fn list(&self) -> Result<Vec<Driver>> {
        Ok(Self::sorted(snapshot(&self.drivers)?))
    }

    fn update_contact(&self, id: DriverId, contact: DriverContact) -> Result<()> {
        let handle = self.handle(id)?;
        let mut driver = handle.lock().map_err(lock_error)?;
        driver.apply_contact(contact);
        Ok(())
    }

    fn claim(&self, id: DriverId, request_id: RequestId) -> Result<()> {
        let handle = self.handle(id)?;
        let mut driver = handle.lock().map_err(lock_error)?;
        driver.claim(request_id)
    }

    fn release(&self, id: DriverId, request_id: RequestId) -> Result<()> {
        let handle = self.handle(id)?;
        let mut driver = handle.lock().map_err(lock_error)?;
        driver.release(request_id);
        Ok(())
    }
}

/// In-memory request ledger
pub struct MemoryRequestLedger {
    requests: Records<RequestId, TransportRequest>,
    listings: Arc<dyn ListingStore>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl MemoryRequestLedger {
    pub fn new(listings: Arc<dyn ListingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            listings,
            next_id: AtomicI64::new(1),
            clock,
        }
    }

    fn handle(&self, id: RequestId) -> Result<Arc<Mutex<TransportRequest>>> {
        record_handle(&self.requests, &id)?.ok_or(DispatchError::request_not_found(id))
    }
}

impl RequestLedger for MemoryRequestLedger {
    fn create(&self, request: NewTransportRequest) -> Result<RequestId> {
        request.validate()?;
        if let Some(listing_id) = request.listing_id {
            let listing = self.listings.get(listing_id).map_err(|err| match err {
                DispatchError::NotFound { .. } => DispatchError::InvalidListing {
                    listing_id,
                    reason: "listing does not exist".into(),
                },
                other => other,
            })?;
            ensure_listing_available(&listing)?;
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = TransportRequest::new(id, request, self.clock.now());

        let mut map = self.requests.write().map_err(lock_error)?;
        map.insert(id, Arc::new(Mutex::new(record)));
        debug!(request_id = %id, "Transport request created");
        Ok(id)
    }

    fn get(&self, id: RequestId) -> Result<TransportRequest> {
        let handle = self.handle(id)?;
        let request = handle.lock().map_err(lock_error)?;
        Ok(request.clone())
    }

    fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransportRequest>> {
        let mut requests: Vec<TransportRequest> = snapshot(&self.requests)?
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    fn list(&self) -> Result<Vec<TransportRequest>> {
        let mut requests = snapshot(&self.requests)?;
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    fn update(&self, id: RequestId, mutator: RequestMutator<'_>) -> Result<TransportRequest> {
        let handle = self.handle(id)?;
        let mut record = handle.lock().map_err(lock_error)?;

        let stamp = next_update_stamp(record.updated_at, self.clock.now());
        let mut updated = record.clone();
        mutator(&mut updated, stamp)?;
        updated.id = record.id;
        updated.created_at = record.created_at;
        updated.updated_at = stamp;

        *record = updated.clone();
        debug!(request_id = %id, status = %updated.status, "Transport request updated");
        Ok(updated)
    }
}

//! Storage abstraction for hospitals, listings, drivers and transport requests.
//!
//! Each entity type has its own trait so backends can be injected and locked
//! independently. Two backends are provided: [`memory`] (per-record mutexes)
//! and [`sqlite`] (durable, rusqlite).
//!
//! Only the assignment coordinator calls the mutating methods that change
//! listing availability, driver capacity slots or request status.

pub mod memory;
pub mod sqlite;

use std::sync::{Arc, PoisonError};

use lifelink_core::{Clock, Timestamp};
use lifelink_domain::{
    AvailabilityStatus, DispatchError, Driver, DriverContact, DriverId, Hospital, HospitalId,
    ListingId, NewDriver, NewHospital, NewListing, NewTransportRequest, OrganListing, RequestId,
    RequestStatus, Result, TransportRequest,
};
use serde::{Deserialize, Serialize};

pub use memory::{
    MemoryDriverRegistry, MemoryHospitalRegistry, MemoryListingStore, MemoryRequestLedger,
};
pub use sqlite::SqliteStore;

/// Field-level change applied by [`RequestLedger::update`].
///
/// Receives the record and the stamp that becomes its new `updated_at`.
/// Returning an error discards the change.
pub type RequestMutator<'a> = &'a mut dyn FnMut(&mut TransportRequest, Timestamp) -> Result<()>;

/// Registered hospitals
pub trait HospitalRegistry: Send + Sync {
    /// Rejects missing fields and a name already registered (case-insensitive)
    fn register(&self, hospital: NewHospital) -> Result<HospitalId>;

    fn get(&self, id: HospitalId) -> Result<Hospital>;

    fn find_by_name(&self, name: &str) -> Result<Option<Hospital>>;

    /// All hospitals, by name
    fn list(&self) -> Result<Vec<Hospital>>;
}

/// Published organ listings
pub trait ListingStore: Send + Sync {
    /// Store a new listing and return its identity
    fn publish(&self, listing: NewListing) -> Result<ListingId>;

    /// Fetch a listing, `NotFound` if absent
    fn get(&self, id: ListingId) -> Result<OrganListing>;

    /// Change availability, `NotFound` if absent
    fn set_availability(&self, id: ListingId, status: AvailabilityStatus) -> Result<()>;

    /// Listings matching `filter`, most urgent first then newest first
    fn list(&self, filter: &ListingFilter) -> Result<Vec<OrganListing>>;
}

/// Onboarded drivers and their capacity slots
pub trait DriverRegistry: Send + Sync {
    fn register(&self, driver: NewDriver) -> Result<DriverId>;

    fn get(&self, id: DriverId) -> Result<Driver>;

    /// True unless the driver holds an active request
    fn is_eligible(&self, id: DriverId) -> Result<bool>;

    /// Drivers without an active request, by name
    fn list_available(&self) -> Result<Vec<Driver>>;

    /// All drivers, by name
    fn list(&self) -> Result<Vec<Driver>>;

    fn update_contact(&self, id: DriverId, contact: DriverContact) -> Result<()>;

    /// Occupy the capacity slot; `DriverUnavailable` if it holds another request
    fn claim(&self, id: DriverId, request_id: RequestId) -> Result<()>;

    /// Free the capacity slot if it holds `request_id`
    fn release(&self, id: DriverId, request_id: RequestId) -> Result<()>;
}

/// Transport requests and their current status
pub trait RequestLedger: Send + Sync {
    /// Insert at `Requested`.
    ///
    /// Rejects empty hospital or organ type, and a linked listing that is
    /// missing or not `Available`.
    fn create(&self, request: NewTransportRequest) -> Result<RequestId>;

    fn get(&self, id: RequestId) -> Result<TransportRequest>;

    fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransportRequest>>;

    /// Every request, oldest first
    fn list(&self) -> Result<Vec<TransportRequest>>;

    /// Apply `mutator` and bump `updated_at`; the sole mutation path.
    ///
    /// Every field except `id` and `created_at` is persisted as the mutator
    /// left it.
    fn update(&self, id: RequestId, mutator: RequestMutator<'_>) -> Result<TransportRequest>;
}

/// Listing search criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilter {
    /// Exact organ type, case-insensitive
    pub organ_type: Option<String>,
    pub availability: Option<AvailabilityStatus>,
    /// Exact owning hospital name
    pub hospital_name: Option<String>,
    /// Free text over organ type, blood type, hospital, city and state
    pub query: Option<String>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &OrganListing) -> bool {
        if let Some(organ_type) = &self.organ_type {
            if !listing.organ_type.eq_ignore_ascii_case(organ_type.trim()) {
                return false;
            }
        }
        if let Some(availability) = self.availability {
            if listing.availability != availability {
                return false;
            }
        }
        if let Some(hospital) = &self.hospital_name {
            if &listing.hospital_name != hospital {
                return false;
            }
        }
        match &self.query {
            Some(query) => listing.matches_query(query),
            None => true,
        }
    }
}

/// Order listings most urgent first, then newest first
pub fn sort_listings(listings: &mut [OrganListing]) {
    listings.sort_by(|a, b| {
        b.priority
            .rank()
            .cmp(&a.priority.rank())
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });
}

/// Next `updated_at`: the clock, but always strictly after the previous stamp
pub fn next_update_stamp(previous: Timestamp, now: Timestamp) -> Timestamp {
    now.max(previous.saturating_add(1))
}

/// Check a linked listing can take a new request
pub(crate) fn ensure_listing_available(listing: &OrganListing) -> Result<()> {
    if listing.is_available() {
        Ok(())
    } else {
        Err(DispatchError::InvalidListing {
            listing_id: listing.id,
            reason: format!("listing is {}", listing.availability),
        })
    }
}

pub(crate) fn lock_error<T>(err: PoisonError<T>) -> DispatchError {
    DispatchError::LockPoisoned(err.to_string())
}

/// The stores a coordinator is wired to
#[derive(Clone)]
pub struct Stores {
    pub hospitals: Arc<dyn HospitalRegistry>,
    pub listings: Arc<dyn ListingStore>,
    pub drivers: Arc<dyn DriverRegistry>,
    pub requests: Arc<dyn RequestLedger>,
}

impl Stores {
    /// Volatile in-process stores
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let listings: Arc<dyn ListingStore> = Arc::new(MemoryListingStore::new(clock.clone()));
        let drivers: Arc<dyn DriverRegistry> = Arc::new(MemoryDriverRegistry::new());
        let requests: Arc<dyn RequestLedger> =
            Arc::new(MemoryRequestLedger::new(listings.clone(), clock));
        Self {
            hospitals: Arc::new(MemoryHospitalRegistry::new()),
            listings,
            drivers,
            requests,
        }
    }

    /// Every store backed by one SQLite database
    pub fn sqlite(store: Arc<SqliteStore>) -> Self {
        Self {
            hospitals: store.clone(),
            listings: store.clone(),
            drivers: store.clone(),
            requests: store,
        }
    }
}

//! Test utilities for dispatch integration tests

use std::path::Path;
use std::sync::{Arc, Once};

use lifelink_core::{Clock, ManualClock, Timestamp};
use lifelink_dispatch::{
    Coordinator, DispatchViews, RecordingSink, SqliteStore, Stores, TransportSubmission,
};
use lifelink_domain::{
    AvailabilityStatus, DriverId, HospitalId, ListingId, ListingSubmission, NewDriver,
    NewHospital, NewListing, PriorityStatus, RequestId, RequestStatus, TransportRequest,
};

static TRACING: Once = Once::new();

/// Install a test subscriber once per process; honours `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Coordinator, views and recorded events over one set of stores
pub struct TestDispatch {
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingSink>,
    pub coordinator: Arc<Coordinator>,
    pub views: DispatchViews,
}

impl TestDispatch {
    /// Volatile in-memory stores
    pub fn in_memory() -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let stores = Stores::in_memory(clock.clone());
        Self::with_stores(clock, stores)
    }

    /// SQLite stores on a file under `dir`
    pub fn sqlite(dir: &Path) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let shared: Arc<dyn Clock> = clock.clone();
        let store = SqliteStore::open(dir.join("lifelink.db"), shared).unwrap();
        Self::with_stores(clock, Stores::sqlite(Arc::new(store)))
    }

    fn with_stores(clock: Arc<ManualClock>, stores: Stores) -> Self {
        init_tracing();
        let events = Arc::new(RecordingSink::new());
        let views = DispatchViews::new(&stores);
        let coordinator = Arc::new(Coordinator::new(stores, events.clone()));
        Self {
            clock,
            events,
            coordinator,
            views,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Registered id of `name`, registering it on first use
    pub fn hospital(&self, name: &str) -> HospitalId {
        let hospitals = self.coordinator.hospitals();
        match hospitals.find_by_name(name).unwrap() {
            Some(hospital) => hospital.id,
            None => hospitals.register(new_hospital(name)).unwrap(),
        }
    }

    pub fn publish(&self, hospital: &str, organ: &str, priority: PriorityStatus) -> ListingId {
        let hospital_id = self.hospital(hospital);
        self.coordinator
            .publish_listing(ListingSubmission {
                hospital_id,
                organ_type: organ.to_string(),
                blood_type: "AB-".to_string(),
                donor_age: 29,
                donor_weight_kg: 64.5,
                priority,
                availability: AvailabilityStatus::Available,
            })
            .unwrap()
    }

    pub fn driver(&self, first: &str, last: &str) -> DriverId {
        self.coordinator
            .drivers()
            .register(new_driver(first, last))
            .unwrap()
    }

    /// Submission from `hospital`, registering it on first use
    pub fn submission(&self, listing_id: ListingId, hospital: &str) -> TransportSubmission {
        TransportSubmission {
            listing_id,
            hospital_id: self.hospital(hospital),
            destination: "1500 Red River St, Austin, TX".to_string(),
            contact_phone: "555-0142".to_string(),
            notes: String::new(),
            priority: None,
        }
    }

    pub fn submit(&self, listing_id: ListingId, hospital: &str) -> RequestId {
        self.coordinator
            .submit_request(self.submission(listing_id, hospital))
            .unwrap()
    }

    pub fn request(&self, id: RequestId) -> TransportRequest {
        self.coordinator.requests().get(id).unwrap()
    }

    pub fn availability(&self, id: ListingId) -> AvailabilityStatus {
        self.coordinator.listings().get(id).unwrap().availability
    }

    pub fn eligible(&self, id: DriverId) -> bool {
        self.coordinator.drivers().is_eligible(id).unwrap()
    }

    /// Every cross-entity invariant over the current store contents
    pub fn assert_invariants(&self) {
        let requests = self.coordinator.requests().list().unwrap();
        for request in &requests {
            assert!(
                request.driver_consistent(),
                "request {} has driver {:?} in status {}",
                request.id,
                request.driver_id,
                request.status
            );
            assert!(request.verify_history(), "request {} history broken", request.id);

            if let Some(listing_id) = request.listing_id {
                let availability = self.availability(listing_id);
                if request.is_active() {
                    assert_eq!(availability, AvailabilityStatus::Reserved);
                }
                if request.status == RequestStatus::Delivered {
                    assert_eq!(availability, AvailabilityStatus::Unavailable);
                }
            }
        }

        for driver in self.coordinator.drivers().list().unwrap() {
            let active: Vec<&TransportRequest> = requests
                .iter()
                .filter(|r| r.is_active() && r.driver_id == Some(driver.id))
                .collect();
            assert!(active.len() <= 1, "driver {} holds {} requests", driver.id, active.len());
            assert_eq!(driver.active_request, active.first().map(|r| r.id));
        }
    }
}

pub fn new_hospital(name: &str) -> NewHospital {
    NewHospital {
        name: name.to_string(),
        city: "Austin".to_string(),
        state: "TX".to_string(),
        email: format!("intake@{}.example.org", name.to_lowercase().replace(' ', "-")),
    }
}

/// Listing row for direct store access, bypassing the hospital lookup
pub fn new_listing(
    hospital_id: HospitalId,
    hospital: &str,
    organ: &str,
    priority: PriorityStatus,
) -> NewListing {
    NewListing {
        hospital_id,
        hospital_name: hospital.to_string(),
        organ_type: organ.to_string(),
        blood_type: "AB-".to_string(),
        donor_age: 29,
        donor_weight_kg: 64.5,
        priority,
        availability: AvailabilityStatus::Available,
        city: "Austin".to_string(),
        state: "TX".to_string(),
    }
}

pub fn new_driver(first: &str, last: &str) -> NewDriver {
    NewDriver {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{}.{}@example.org", first.to_lowercase(), last.to_lowercase()),
        phone: "555-0100".to_string(),
        cdl: format!("TX-{}-{}", first, last),
    }
}

//! Read-only projections for the hospital and driver portals.
//!
//! Views read snapshots through the store traits and never take coordinator
//! locks, so a view may mix records from before and after a concurrent write.

use std::sync::Arc;

use lifelink_domain::{
    Driver, DriverId, ListingId, OrganListing, RequestStatus, Result, TransportRequest,
};
use serde::{Deserialize, Serialize};

use crate::priority;
use crate::store::{
    DriverRegistry, HospitalRegistry, ListingFilter, ListingStore, RequestLedger, Stores,
};

/// Completed deliveries shown on a driver board
pub const COMPLETED_HISTORY: usize = 20;

/// What a driver sees when opening the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverBoard {
    pub driver: Driver,
    /// The Assigned or En-route request held by the driver
    pub current: Option<TransportRequest>,
    /// Latest deliveries, most recent first
    pub completed: Vec<TransportRequest>,
    /// Open requests in dispatch order
    pub available: Vec<TransportRequest>,
}

#[derive(Clone)]
pub struct DispatchViews {
    hospitals: Arc<dyn HospitalRegistry>,
    listings: Arc<dyn ListingStore>,
    drivers: Arc<dyn DriverRegistry>,
    requests: Arc<dyn RequestLedger>,
}

fn newest_first(mut requests: Vec<TransportRequest>) -> Vec<TransportRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    requests
}

impl DispatchViews {
    pub fn new(stores: &Stores) -> Self {
        Self {
            hospitals: stores.hospitals.clone(),
            listings: stores.listings.clone(),
            drivers: stores.drivers.clone(),
            requests: stores.requests.clone(),
        }
    }

    /// Registered spelling of `hospital`, or the name as given when unregistered
    fn hospital_name(&self, hospital: &str) -> Result<String> {
        Ok(self
            .hospitals
            .find_by_name(hospital)?
            .map_or_else(|| hospital.trim().to_string(), |h| h.name))
    }

    /// Requests raised by `hospital`, newest first
    pub fn outbound(&self, hospital: &str) -> Result<Vec<TransportRequest>> {
        let hospital = self.hospital_name(hospital)?;
        let requests = self
            .requests
            .list()?
            .into_iter()
            .filter(|r| r.hospital == hospital)
            .collect();
        Ok(newest_first(requests))
    }

    /// Requests against listings published by `hospital`, newest first
    pub fn inbound(&self, hospital: &str) -> Result<Vec<TransportRequest>> {
        let owned: Vec<ListingId> = self
            .hospital_listings(hospital)?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let requests = self
            .requests
            .list()?
            .into_iter()
            .filter(|r| r.listing_id.map_or(false, |id| owned.contains(&id)))
            .collect();
        Ok(newest_first(requests))
    }

    /// Listings published by `hospital`, newest first
    pub fn hospital_listings(&self, hospital: &str) -> Result<Vec<OrganListing>> {
        let mut listings = self.listings.list(&ListingFilter {
            hospital_name: Some(self.hospital_name(hospital)?),
            ..Default::default()
        })?;
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listings)
    }

    pub fn driver_board(&self, driver_id: DriverId) -> Result<DriverBoard> {
        let driver = self.drivers.get(driver_id)?;
        let all = self.requests.list()?;

        let current = all
            .iter()
            .find(|r| r.is_active() && r.driver_id == Some(driver_id))
            .cloned();

        let mut completed: Vec<TransportRequest> = all
            .iter()
            .filter(|r| r.status == RequestStatus::Delivered && r.driver_id == Some(driver_id))
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        completed.truncate(COMPLETED_HISTORY);

        let ranking = priority::rank(&all);
        let available = ranking
            .iter()
            .filter_map(|id| all.iter().find(|r| r.id == id).cloned())
            .collect();

        Ok(DriverBoard {
            driver,
            current,
            completed,
            available,
        })
    }
}

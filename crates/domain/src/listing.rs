//! Organ availability listings published by hospitals

use lifelink_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::hospital::Hospital;
use crate::ids::{HospitalId, ListingId};
use crate::status::{AvailabilityStatus, PriorityStatus};

/// A hospital's published organ-availability record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganListing {
    /// Unique listing identifier
    pub id: ListingId,

    /// Owning hospital
    pub hospital_id: HospitalId,

    /// Owning hospital name, denormalized for display
    pub hospital_name: String,

    /// Organ type (kidney, liver, ...)
    pub organ_type: String,

    /// Donor blood type
    pub blood_type: String,

    /// Donor age in years
    pub donor_age: u32,

    /// Donor weight in kilograms
    pub donor_weight_kg: f64,

    /// Urgency of the listing
    pub priority: PriorityStatus,

    /// Availability, changed only by the assignment coordinator
    pub availability: AvailabilityStatus,

    /// Origin city
    pub city: String,

    /// Origin state
    pub state: String,

    /// Creation timestamp (Unix epoch milliseconds)
    pub created_at: Timestamp,
}

/// Listing as a registered hospital submits it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSubmission {
    pub hospital_id: HospitalId,
    pub organ_type: String,
    pub blood_type: String,
    pub donor_age: u32,
    pub donor_weight_kg: f64,
    #[serde(default)]
    pub priority: PriorityStatus,
    #[serde(default)]
    pub availability: AvailabilityStatus,
}

impl ListingSubmission {
    /// Fill the hospital columns from the registered hospital
    pub fn for_hospital(self, hospital: &Hospital) -> NewListing {
        NewListing {
            hospital_id: hospital.id,
            hospital_name: hospital.name.clone(),
            organ_type: self.organ_type,
            blood_type: self.blood_type,
            donor_age: self.donor_age,
            donor_weight_kg: self.donor_weight_kg,
            priority: self.priority,
            availability: self.availability,
            city: hospital.city.clone(),
            state: hospital.state.clone(),
        }
    }
}

/// Listing row as persisted, hospital columns denormalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub hospital_id: HospitalId,
    pub hospital_name: String,
    pub organ_type: String,
    pub blood_type: String,
    pub donor_age: u32,
    pub donor_weight_kg: f64,
    #[serde(default)]
    pub priority: PriorityStatus,
    #[serde(default)]
    pub availability: AvailabilityStatus,
    pub city: String,
    pub state: String,
}

impl NewListing {
    /// Reject listings that cannot be shown or requested.
    pub fn validate(&self) -> Result<()> {
        if self.hospital_name.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "listing hospital name is required".into(),
            ));
        }
        if self.organ_type.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "listing organ type is required".into(),
            ));
        }
        if !self.donor_weight_kg.is_finite() || self.donor_weight_kg < 0.0 {
            return Err(DispatchError::InvalidRequest(format!(
                "donor weight must be a non-negative number, got {}",
                self.donor_weight_kg
            )));
        }
        Ok(())
    }

    /// Materialize the listing once the store has assigned its identity
    pub fn into_listing(self, id: ListingId, created_at: Timestamp) -> OrganListing {
        OrganListing {
            id,
            hospital_id: self.hospital_id,
            hospital_name: self.hospital_name,
            organ_type: self.organ_type,
            blood_type: self.blood_type,
            donor_age: self.donor_age,
            donor_weight_kg: self.donor_weight_kg,
            priority: self.priority,
            availability: self.availability,
            city: self.city,
            state: self.state,
            created_at,
        }
    }
}

impl OrganListing {
    /// Origin label snapshotted into transport requests
    pub fn origin_label(&self) -> String {
        format!("{} ({}, {})", self.hospital_name, self.city, self.state)
    }

    pub fn is_available(&self) -> bool {
        self.availability == AvailabilityStatus::Available
    }

    /// Case-insensitive free-text match over the searchable fields
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            &self.organ_type,
            &self.blood_type,
            &self.hospital_name,
            &self.city,
            &self.state,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
pub(crate) fn sample_new_listing() -> NewListing {
    NewListing {
        hospital_id: HospitalId(1),
        hospital_name: "Mercy General".to_string(),
        organ_type: "Kidney".to_string(),
        blood_type: "O+".to_string(),
        donor_age: 34,
        donor_weight_kg: 72.5,
        priority: PriorityStatus::Critical,
        availability: AvailabilityStatus::Available,
        city: "Austin".to_string(),
        state: "TX".to_string(),
    }
}

//! Registered hospitals
//!
//! Listings and linked transport requests name their hospitals through this
//! registry, so the hospital views match on names that were vetted once at
//! registration.

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::ids::HospitalId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    /// Unique, compared case-insensitively
    pub name: String,
    pub city: String,
    pub state: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHospital {
    pub name: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub email: String,
}

impl NewHospital {
    pub fn validate(&self) -> Result<()> {
        for (value, field) in [
            (&self.name, "name"),
            (&self.city, "city"),
            (&self.state, "state"),
        ] {
            if value.trim().is_empty() {
                return Err(DispatchError::InvalidRequest(format!(
                    "hospital {field} is required"
                )));
            }
        }
        Ok(())
    }

    pub fn into_hospital(self, id: HospitalId) -> Hospital {
        Hospital {
            id,
            name: self.name.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }
}

impl Hospital {
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

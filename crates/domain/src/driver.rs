//! Vetted transport drivers

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::ids::{DriverId, RequestId};

/// Driver eligible for assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Commercial driver's license number
    pub cdl: String,
    /// Capacity slot: the Assigned or En-route request this driver holds
    pub active_request: Option<RequestId>,
}

/// Driver as submitted after vetting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDriver {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub cdl: String,
}

/// The only driver fields that change after registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverContact {
    pub email: String,
    pub phone: String,
}

impl NewDriver {
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "driver first and last name are required".into(),
            ));
        }
        if self.cdl.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "driver CDL credential is required".into(),
            ));
        }
        Ok(())
    }

    pub fn into_driver(self, id: DriverId) -> Driver {
        Driver {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            cdl: self.cdl,
            active_request: None,
        }
    }
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// A driver may hold at most one active request
    pub fn is_eligible(&self) -> bool {
        self.active_request.is_none()
    }

    pub fn apply_contact(&mut self, contact: DriverContact) {
        self.email = contact.email;
        self.phone = contact.phone;
    }

    /// Occupy the capacity slot with `request_id`.
    ///
    /// Re-claiming for the request already held is accepted.
    pub fn claim(&mut self, request_id: RequestId) -> Result<()> {
        match self.active_request {
            Some(held) if held != request_id => Err(DispatchError::DriverUnavailable {
                driver_id: self.id,
            }),
            _ => {
                self.active_request = Some(request_id);
                Ok(())
            }
        }
    }

    /// Free the capacity slot if it holds `request_id`
    pub fn release(&mut self, request_id: RequestId) {
        if self.active_request == Some(request_id) {
            self.active_request = None;
        }
    }

    /// Ordering key used by driver listings
    pub fn sort_key(&self) -> (String, String, DriverId) {
        (
            self.first_name.to_lowercase(),
            self.last_name.to_lowercase(),
            self.id,
        )
    }
}

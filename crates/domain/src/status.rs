//! Closed status taxonomies
//!
//! Stored and wire spellings are the canonical strings below. Parsing is
//! case-insensitive; anything outside the set is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DispatchError;

/// Generates a closed enum with `as_str`, `ALL`, `Display` and `FromStr`
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $err:path { $($(#[$vmeta:meta])* $variant:ident => $s:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $s)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DispatchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| $err(s.to_string()))
            }
        }
    };
}

status_enum!(
    /// Lifecycle status of a transport request
    RequestStatus, DispatchError::InvalidStatus {
        /// Raised, waiting for a driver
        Requested => "Requested",
        /// Driver bound, not yet moving
        Assigned => "Assigned",
        /// Organ in transit
        EnRoute => "En-route",
        /// Handed over at destination
        Delivered => "Delivered",
        /// Withdrawn before delivery
        Cancelled => "Cancelled",
    }
);

status_enum!(
    /// Urgency taxonomy shared by listings and requests
    PriorityStatus, DispatchError::InvalidPriority {
        Normal => "Normal",
        Urgent => "Urgent",
        Critical => "Critical",
        Emergency => "Emergency",
    }
);

status_enum!(
    /// Availability of a published listing
    AvailabilityStatus, DispatchError::InvalidAvailability {
        Available => "Available",
        Reserved => "Reserved",
        Unavailable => "Unavailable",
    }
);

impl RequestStatus {
    /// Check if status is terminal (delivered or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Delivered | RequestStatus::Cancelled)
    }

    /// Request holds a driver in this status
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            RequestStatus::Assigned | RequestStatus::EnRoute | RequestStatus::Delivered
        )
    }

    /// Request occupies its driver's capacity slot in this status
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Assigned | RequestStatus::EnRoute)
    }

    /// Next status along the forward chain
    pub fn successor(&self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Requested => Some(RequestStatus::Assigned),
            RequestStatus::Assigned => Some(RequestStatus::EnRoute),
            RequestStatus::EnRoute => Some(RequestStatus::Delivered),
            RequestStatus::Delivered | RequestStatus::Cancelled => None,
        }
    }

    /// Check if transition to new status is valid
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        match (self, next) {
            // Forward chain
            (RequestStatus::Requested, RequestStatus::Assigned) => true,
            (RequestStatus::Assigned, RequestStatus::EnRoute) => true,
            (RequestStatus::EnRoute, RequestStatus::Delivered) => true,
            // Cancellation from any non-terminal status
            (RequestStatus::Requested, RequestStatus::Cancelled) => true,
            (RequestStatus::Assigned, RequestStatus::Cancelled) => true,
            (RequestStatus::EnRoute, RequestStatus::Cancelled) => true,
            // Terminal states cannot transition
            (RequestStatus::Delivered, _) => false,
            (RequestStatus::Cancelled, _) => false,
            _ => false,
        }
    }
}

impl PriorityStatus {
    /// Ranking weight, higher is more urgent
    pub fn rank(&self) -> u8 {
        match self {
            PriorityStatus::Emergency => 3,
            PriorityStatus::Critical => 2,
            PriorityStatus::Urgent => 1,
            PriorityStatus::Normal => 0,
        }
    }
}

impl Default for PriorityStatus {
    fn default() -> Self {
        PriorityStatus::Normal
    }
}

impl Default for AvailabilityStatus {
    fn default() -> Self {
        AvailabilityStatus::Available
    }
}

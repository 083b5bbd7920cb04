// Vendor Domain Model

use serde::{Deserialize, Serialize};

/// Vendor ID (UUID v4)
pub type VendorId = String;

/// Vendor availability flag, as reported by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    Busy,
    Offline,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "AVAILABLE"),
            Availability::Busy => write!(f, "BUSY"),
            Availability::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Vendor entity
///
/// Owned by the vendor directory; the dispatcher only ever reads the
/// reachability flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub is_online: bool,
    pub availability: Availability,
}

impl Vendor {
    /// A vendor is reachable when online and not explicitly OFFLINE.
    /// BUSY vendors still receive offers (they may finish their current job).
    pub fn is_reachable(&self) -> bool {
        self.is_online && matches!(self.availability, Availability::Available | Availability::Busy)
    }
}

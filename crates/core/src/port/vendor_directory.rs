// Vendor Directory Port (Interface)

use crate::domain::VendorId;
use crate::error::Result;
use async_trait::async_trait;

/// Live reachability lookup against the vendor directory
///
/// Filtering happens at escalation time, not at job creation, so a vendor
/// who comes online between waves can still be reached in a later wave.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    /// Subset of `vendor_ids` that are currently reachable: online AND
    /// availability in {AVAILABLE, BUSY}. Order of the result is not
    /// significant; callers re-apply ranking order themselves.
    async fn filter_reachable(&self, vendor_ids: &[VendorId]) -> Result<Vec<VendorId>>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Directory mock with a settable reachable set
    pub struct MockVendorDirectory {
        reachable: Mutex<HashSet<VendorId>>,
    }

    impl MockVendorDirectory {
        pub fn new() -> Self {
            Self {
                reachable: Mutex::new(HashSet::new()),
            }
        }

        /// Mark vendors reachable (everyone else is treated as offline)
        pub fn set_reachable<I: IntoIterator<Item = S>, S: Into<String>>(&self, ids: I) {
            let mut set = self.reachable.lock().unwrap();
            set.clear();
            set.extend(ids.into_iter().map(Into::into));
        }

        pub fn go_offline(&self, id: &str) {
            self.reachable.lock().unwrap().remove(id);
        }

        pub fn come_online(&self, id: impl Into<String>) {
            self.reachable.lock().unwrap().insert(id.into());
        }
    }

    impl Default for MockVendorDirectory {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl VendorDirectory for MockVendorDirectory {
        async fn filter_reachable(&self, vendor_ids: &[VendorId]) -> Result<Vec<VendorId>> {
            let set = self.reachable.lock().unwrap();
            Ok(vendor_ids
                .iter()
                .filter(|id| set.contains(*id))
                .cloned()
                .collect())
        }
    }
}

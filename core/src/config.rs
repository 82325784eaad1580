//! Engine tunables.

use serde::{Deserialize, Serialize};

/// Default upper bound on rows touched by one bulk attendance/payment update.
pub const DEFAULT_BULK_UPDATE_LIMIT: usize = 500;

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest accepted batch for bulk attendance/payment updates
    pub bulk_update_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bulk_update_limit: DEFAULT_BULK_UPDATE_LIMIT,
        }
    }
}

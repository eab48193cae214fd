//! Region records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::RegionCode;

/// A geographic region tracked by the notifier.
///
/// Created on first subscription or by an admin add; deletion cascades to
/// the region's item partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub code: RegionCode,
    /// Human-readable name shown in notifications (e.g. city or state).
    pub display_name: String,
    /// Last time a subscription touched this region; used by operators to
    /// spot regions nobody cares about anymore.
    pub last_interacted: DateTime<Utc>,
}

impl RegionRecord {
    pub fn new(code: RegionCode, display_name: impl Into<String>) -> Self {
        Self {
            code,
            display_name: display_name.into(),
            last_interacted: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_interacted = Utc::now();
    }
}

//! Region administration: add/remove regions with cascade semantics.

use std::sync::Arc;

use tracing::info;

use restock_catalog::RegionRecord;
use restock_core::{DomainError, RegionCode};
use restock_queue::{Job, JobKind, JobStore, RetryPolicy};

use crate::error::PipelineError;
use crate::payloads::ExpiryNoticePayload;
use crate::stores::RegionStore;

/// Operator-facing region management. The admin surface (auth, UI) lives
/// elsewhere; this owns the cascade semantics of removing a region.
pub struct RegionAdmin {
    regions: Arc<dyn RegionStore>,
    queue: Arc<dyn JobStore>,
    retry_policy: RetryPolicy,
}

impl RegionAdmin {
    pub fn new(
        regions: Arc<dyn RegionStore>,
        queue: Arc<dyn JobStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            regions,
            queue,
            retry_policy,
        }
    }

    pub fn add_region(
        &self,
        code: RegionCode,
        display_name: &str,
    ) -> Result<RegionRecord, PipelineError> {
        if display_name.trim().is_empty() {
            return Err(DomainError::validation("region display name is empty").into());
        }
        let record = RegionRecord::new(code, display_name.trim());
        if !self.regions.insert_region(record.clone())? {
            return Err(DomainError::conflict("region already exists").into());
        }
        info!(region = %record.code, "region added");
        Ok(record)
    }

    pub fn list_regions(&self) -> Result<Vec<RegionRecord>, PipelineError> {
        Ok(self.regions.list_regions()?)
    }

    /// Remove a region: enqueue one expiry notice per unique subscriber
    /// across all its items, then delete the region record and drop the
    /// item partition.
    ///
    /// Notices are enqueued before the partition is dropped, so the notice
    /// jobs never depend on data that is already gone. Returns the number
    /// of notices enqueued.
    pub fn remove_region(&self, code: &RegionCode) -> Result<usize, PipelineError> {
        let record = self
            .regions
            .get_region(code)?
            .ok_or(DomainError::NotFound)?;

        let affected = self.regions.region_subscribers(code)?;
        for email in &affected {
            let payload = ExpiryNoticePayload {
                email: email.clone(),
                region: code.clone(),
                region_name: record.display_name.clone(),
            };
            let job = Job::new(JobKind::SendExpiryNotice, serde_json::to_value(&payload)?)
                .with_retry_policy(self.retry_policy.clone());
            self.queue.enqueue(job)?;
        }

        self.regions.delete_region(code)?;
        let dropped = self.regions.drop_partition(code)?;

        info!(
            region = %code,
            notices = affected.len(),
            items_dropped = dropped,
            "region removed"
        );
        Ok(affected.len())
    }
}

#[cfg(test)]
mod tests {
    use restock_core::{EmailAddress, ItemId};
    use restock_queue::InMemoryJobStore;

    use super::*;
    use crate::stores::InMemoryRegionStore;

    fn region() -> RegionCode {
        RegionCode::new("560001").unwrap()
    }

    fn setup() -> (Arc<InMemoryRegionStore>, Arc<InMemoryJobStore>, RegionAdmin) {
        let regions = InMemoryRegionStore::arc();
        let queue = InMemoryJobStore::arc();
        let admin = RegionAdmin::new(regions.clone(), queue.clone(), RetryPolicy::default());
        (regions, queue, admin)
    }

    #[test]
    fn add_region_rejects_duplicates_and_blank_names() {
        let (_, _, admin) = setup();
        admin.add_region(region(), "Bengaluru").unwrap();
        assert!(admin.add_region(region(), "Again").unwrap_err().is_conflict());
        assert!(matches!(
            admin.add_region(RegionCode::new("110001").unwrap(), "  "),
            Err(PipelineError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn remove_region_notifies_each_unique_subscriber_once() {
        let (regions, queue, admin) = setup();
        admin.add_region(region(), "Bengaluru").unwrap();

        let shared = EmailAddress::new("shared@x.com").unwrap();
        for id in ["a", "b", "c"] {
            regions
                .add_subscriber(&region(), &ItemId::new(id).unwrap(), &shared)
                .unwrap();
        }
        regions
            .add_subscriber(
                &region(),
                &ItemId::new("a").unwrap(),
                &EmailAddress::new("other@x.com").unwrap(),
            )
            .unwrap();

        let notices = admin.remove_region(&region()).unwrap();
        assert_eq!(notices, 2);
        assert_eq!(queue.status().unwrap().waiting, 2);

        // Region record and partition are both gone.
        assert!(regions.get_region(&region()).unwrap().is_none());
        assert!(regions.list_items(&region()).unwrap().is_empty());
    }

    #[test]
    fn remove_unknown_region_is_not_found() {
        let (_, _, admin) = setup();
        assert!(admin.remove_region(&region()).unwrap_err().is_not_found());
    }
}

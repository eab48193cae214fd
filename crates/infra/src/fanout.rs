//! Fan-out: group restock events by subscriber and enqueue notification
//! jobs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use restock_catalog::{RestockEvent, RestockedItem};
use restock_core::{EmailAddress, RegionCode};
use restock_queue::{Job, JobId, JobKind, JobStore, RetryPolicy};

use crate::error::PipelineError;
use crate::payloads::NotificationPayload;
use crate::stores::RegionStore;

/// Builds one batched notification job per subscriber out of a region's
/// restock events.
pub struct FanoutBuilder {
    regions: Arc<dyn RegionStore>,
    queue: Arc<dyn JobStore>,
    retry_policy: RetryPolicy,
}

impl FanoutBuilder {
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

    /// Enqueue exactly one `SendNotification` job per subscriber with an
    /// interest in any of the restocked items.
    ///
    /// The subscriber set is re-read from the store here rather than taken
    /// from the detector's snapshot: a subscriber who unsubscribed between
    /// detection and fan-out should not receive mail. An item whose set is
    /// empty simply produces no job.
    pub fn enqueue_notifications(
        &self,
        region: &RegionCode,
        events: &[RestockEvent],
    ) -> Result<Vec<JobId>, PipelineError> {
        let mut per_subscriber: BTreeMap<EmailAddress, Vec<RestockedItem>> = BTreeMap::new();

        for event in events {
            let current = self.regions.subscribers_of(region, &event.item.id)?;
            for email in current {
                per_subscriber
                    .entry(email)
                    .or_default()
                    .push(event.item.clone());
            }
        }

        let mut job_ids = Vec::with_capacity(per_subscriber.len());
        for (email, items) in per_subscriber {
            let payload = NotificationPayload {
                email,
                region: region.clone(),
                items,
            };
            let job = Job::new(JobKind::SendNotification, serde_json::to_value(&payload)?)
                .with_retry_policy(self.retry_policy.clone());
            job_ids.push(self.queue.enqueue(job)?);
        }

        info!(
            region = %region,
            events = events.len(),
            jobs = job_ids.len(),
            "fan-out enqueued notification jobs"
        );
        Ok(job_ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use restock_catalog::ScrapedItem;
    use restock_core::ItemId;
    use restock_queue::InMemoryJobStore;

    use super::*;
    use crate::stores::InMemoryRegionStore;

    fn region() -> RegionCode {
        RegionCode::new("560001").unwrap()
    }

    fn email(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    fn item_id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    fn event(id: &str, subscribers: &[&str]) -> RestockEvent {
        RestockEvent {
            item: RestockedItem {
                id: item_id(id),
                name: format!("Item {id}"),
                page_url: None,
                image_url: None,
            },
            subscribers: subscribers.iter().map(|s| email(s)).collect(),
        }
    }

    fn seed_item(store: &InMemoryRegionStore, id: &str, subscribers: &[&str]) {
        store
            .apply_scraped(
                &region(),
                &ScrapedItem {
                    id: item_id(id),
                    name: format!("Item {id}"),
                    available: true,
                    page_url: None,
                    image_url: None,
                },
            )
            .unwrap();
        for s in subscribers {
            store
                .add_subscriber(&region(), &item_id(id), &email(s))
                .unwrap();
        }
    }

    fn setup() -> (Arc<InMemoryRegionStore>, Arc<InMemoryJobStore>, FanoutBuilder) {
        let regions = InMemoryRegionStore::arc();
        let queue = InMemoryJobStore::arc();
        let fanout = FanoutBuilder::new(
            regions.clone(),
            queue.clone(),
            RetryPolicy::default(),
        );
        (regions, queue, fanout)
    }

    #[test]
    fn one_job_per_subscriber_batched_across_items() {
        let (regions, queue, fanout) = setup();
        seed_item(&regions, "a", &["both@x.com", "only-a@x.com"]);
        seed_item(&regions, "b", &["both@x.com"]);

        let ids = fanout
            .enqueue_notifications(&region(), &[event("a", &[]), event("b", &[])])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let mut per_email: Vec<(String, usize)> = ids
            .iter()
            .map(|id| {
                let job = queue.get(*id).unwrap().unwrap();
                let payload: NotificationPayload =
                    serde_json::from_value(job.payload).unwrap();
                (payload.email.as_str().to_string(), payload.items.len())
            })
            .collect();
        per_email.sort();
        assert_eq!(
            per_email,
            vec![("both@x.com".to_string(), 2), ("only-a@x.com".to_string(), 1)]
        );
    }

    #[test]
    fn stale_detector_snapshot_is_ignored() {
        let (regions, queue, fanout) = setup();
        seed_item(&regions, "a", &[]);

        // Detector saw a subscriber, but they unsubscribed before fan-out.
        let stale = event("a", &["gone@x.com"]);
        let ids = fanout.enqueue_notifications(&region(), &[stale]).unwrap();
        assert!(ids.is_empty());
        assert_eq!(queue.status().unwrap().waiting, 0);
    }

    #[test]
    fn zero_subscribers_creates_zero_jobs() {
        let (regions, _queue, fanout) = setup();
        seed_item(&regions, "a", &[]);
        let ids = fanout
            .enqueue_notifications(&region(), &[event("a", &[])])
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn subscriber_added_after_detection_is_included() {
        let (regions, _queue, fanout) = setup();
        seed_item(&regions, "a", &["late@x.com"]);

        // Snapshot from detection time was empty; fan-out re-reads.
        let mut stale = event("a", &[]);
        stale.subscribers = BTreeSet::new();
        let ids = fanout.enqueue_notifications(&region(), &[stale]).unwrap();
        assert_eq!(ids.len(), 1);
    }
}

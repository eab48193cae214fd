//! Region directory and per-region item partitions.
//!
//! One logical item table partitioned by `RegionCode`; dropping a region is
//! a bulk delete of its partition key. Mutations that read-then-write an
//! item (scraper upserts, subscriber-set updates) happen under the store
//! lock, so concurrent reports for the same item serialize on the store
//! rather than in the caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use restock_catalog::{ItemRecord, RegionRecord, RestockedItem, ScrapedItem};
use restock_core::{EmailAddress, ItemId, RegionCode};

use super::StoreError;

/// Result of atomically applying one scraper report to a stored item.
///
/// `subscribers` is the snapshot read before the write; it is only
/// populated when the report was a restock.
#[derive(Debug, Clone)]
pub struct AppliedReport {
    pub restocked: bool,
    pub subscribers: BTreeSet<EmailAddress>,
    pub item: RestockedItem,
}

/// Port for the region directory and item partitions.
pub trait RegionStore: Send + Sync {
    /// Insert a region record. Returns `false` if the code already exists
    /// (the existing record is left untouched).
    fn insert_region(&self, record: RegionRecord) -> Result<bool, StoreError>;

    fn get_region(&self, code: &RegionCode) -> Result<Option<RegionRecord>, StoreError>;

    fn list_regions(&self) -> Result<Vec<RegionRecord>, StoreError>;

    /// Bump the region's `last_interacted` timestamp. No-op if absent.
    fn touch_region(&self, code: &RegionCode) -> Result<(), StoreError>;

    /// Delete the region record only (the partition is dropped separately,
    /// after expiry notices are enqueued). Returns `false` if absent.
    fn delete_region(&self, code: &RegionCode) -> Result<bool, StoreError>;

    /// Atomically apply one scraper report: read the stored availability
    /// and subscriber snapshot, then upsert the item. Absent items are
    /// inserted with an empty subscriber set and never count as restocked.
    fn apply_scraped(
        &self,
        region: &RegionCode,
        report: &ScrapedItem,
    ) -> Result<AppliedReport, StoreError>;

    /// Add an email to an item's subscriber set, upserting a placeholder
    /// item if the scraper has not reported it yet. Set semantics: adding
    /// twice is a no-op.
    fn add_subscriber(
        &self,
        region: &RegionCode,
        item: &ItemId,
        email: &EmailAddress,
    ) -> Result<(), StoreError>;

    /// Remove an email from an item's subscriber set. No-op if either the
    /// item or the membership is absent.
    fn remove_subscriber(
        &self,
        region: &RegionCode,
        item: &ItemId,
        email: &EmailAddress,
    ) -> Result<(), StoreError>;

    /// The authoritative subscriber set for one item (empty if absent).
    fn subscribers_of(
        &self,
        region: &RegionCode,
        item: &ItemId,
    ) -> Result<BTreeSet<EmailAddress>, StoreError>;

    /// Union of subscriber emails across every item in the region.
    fn region_subscribers(&self, region: &RegionCode) -> Result<BTreeSet<EmailAddress>, StoreError>;

    fn get_item(
        &self,
        region: &RegionCode,
        item: &ItemId,
    ) -> Result<Option<ItemRecord>, StoreError>;

    fn list_items(&self, region: &RegionCode) -> Result<Vec<ItemRecord>, StoreError>;

    /// Display names for the given items, in input order; unknown items
    /// fall back to their raw id.
    fn resolve_names(
        &self,
        region: &RegionCode,
        items: &BTreeSet<ItemId>,
    ) -> Result<Vec<String>, StoreError>;

    /// Drop the region's whole item partition. Returns the number of items
    /// removed.
    fn drop_partition(&self, region: &RegionCode) -> Result<usize, StoreError>;
}

type Partition = HashMap<ItemId, ItemRecord>;

/// In-memory region store.
#[derive(Debug, Default)]
pub struct InMemoryRegionStore {
    regions: RwLock<HashMap<RegionCode, RegionRecord>>,
    partitions: RwLock<HashMap<RegionCode, Partition>>,
}

impl InMemoryRegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn restocked_item(record: &ItemRecord) -> RestockedItem {
    RestockedItem {
        id: record.id.clone(),
        name: record.name.clone(),
        page_url: record.page_url.clone(),
        image_url: record.image_url.clone(),
    }
}

impl RegionStore for InMemoryRegionStore {
    fn insert_region(&self, record: RegionRecord) -> Result<bool, StoreError> {
        let mut regions = self.regions.write().map_err(|_| StoreError::Poisoned)?;
        if regions.contains_key(&record.code) {
            return Ok(false);
        }
        regions.insert(record.code.clone(), record);
        Ok(true)
    }

    fn get_region(&self, code: &RegionCode) -> Result<Option<RegionRecord>, StoreError> {
        let regions = self.regions.read().map_err(|_| StoreError::Poisoned)?;
        Ok(regions.get(code).cloned())
    }

    fn list_regions(&self) -> Result<Vec<RegionRecord>, StoreError> {
        let regions = self.regions.read().map_err(|_| StoreError::Poisoned)?;
        let mut all: Vec<_> = regions.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    fn touch_region(&self, code: &RegionCode) -> Result<(), StoreError> {
        let mut regions = self.regions.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(region) = regions.get_mut(code) {
            region.touch();
        }
        Ok(())
    }

    fn delete_region(&self, code: &RegionCode) -> Result<bool, StoreError> {
        let mut regions = self.regions.write().map_err(|_| StoreError::Poisoned)?;
        Ok(regions.remove(code).is_some())
    }

    fn apply_scraped(
        &self,
        region: &RegionCode,
        report: &ScrapedItem,
    ) -> Result<AppliedReport, StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        let partition = partitions.entry(region.clone()).or_default();

        match partition.get_mut(&report.id) {
            Some(stored) => {
                // Snapshot before the write: detection must not race its
                // own mutation within a batch.
                let snapshot = stored.subscribers.clone();
                let restocked = stored.apply_report(report);
                Ok(AppliedReport {
                    restocked,
                    subscribers: if restocked { snapshot } else { BTreeSet::new() },
                    item: restocked_item(stored),
                })
            }
            None => {
                let record = ItemRecord::from_report(report);
                let applied = AppliedReport {
                    restocked: false,
                    subscribers: BTreeSet::new(),
                    item: restocked_item(&record),
                };
                partition.insert(record.id.clone(), record);
                Ok(applied)
            }
        }
    }

    fn add_subscriber(
        &self,
        region: &RegionCode,
        item: &ItemId,
        email: &EmailAddress,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        let partition = partitions.entry(region.clone()).or_default();
        let record = partition
            .entry(item.clone())
            .or_insert_with(|| ItemRecord::placeholder(item.clone()));
        record.subscribers.insert(email.clone());
        Ok(())
    }

    fn remove_subscriber(
        &self,
        region: &RegionCode,
        item: &ItemId,
        email: &EmailAddress,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(record) = partitions.get_mut(region).and_then(|p| p.get_mut(item)) {
            record.subscribers.remove(email);
        }
        Ok(())
    }

    fn subscribers_of(
        &self,
        region: &RegionCode,
        item: &ItemId,
    ) -> Result<BTreeSet<EmailAddress>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        Ok(partitions
            .get(region)
            .and_then(|p| p.get(item))
            .map(|r| r.subscribers.clone())
            .unwrap_or_default())
    }

    fn region_subscribers(&self, region: &RegionCode) -> Result<BTreeSet<EmailAddress>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let mut union = BTreeSet::new();
        if let Some(partition) = partitions.get(region) {
            for record in partition.values() {
                union.extend(record.subscribers.iter().cloned());
            }
        }
        Ok(union)
    }

    fn get_item(
        &self,
        region: &RegionCode,
        item: &ItemId,
    ) -> Result<Option<ItemRecord>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        Ok(partitions.get(region).and_then(|p| p.get(item)).cloned())
    }

    fn list_items(&self, region: &RegionCode) -> Result<Vec<ItemRecord>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let mut items: Vec<_> = partitions
            .get(region)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    fn resolve_names(
        &self,
        region: &RegionCode,
        items: &BTreeSet<ItemId>,
    ) -> Result<Vec<String>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let partition = partitions.get(region);
        Ok(items
            .iter()
            .map(|id| {
                partition
                    .and_then(|p| p.get(id))
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| id.as_str().to_string())
            })
            .collect())
    }

    fn drop_partition(&self, region: &RegionCode) -> Result<usize, StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        Ok(partitions.remove(region).map(|p| p.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> RegionCode {
        RegionCode::new("560001").unwrap()
    }

    fn item_id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    fn email(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    fn scraped(id: &str, available: bool) -> ScrapedItem {
        ScrapedItem {
            id: item_id(id),
            name: format!("Item {id}"),
            available,
            page_url: None,
            image_url: None,
        }
    }

    #[test]
    fn first_sighting_inserts_without_restock() {
        let store = InMemoryRegionStore::new();
        let applied = store.apply_scraped(&region(), &scraped("whey", true)).unwrap();
        assert!(!applied.restocked);
        assert!(store.get_item(&region(), &item_id("whey")).unwrap().is_some());
    }

    #[test]
    fn restock_snapshot_is_read_before_the_write() {
        let store = InMemoryRegionStore::new();
        store.apply_scraped(&region(), &scraped("whey", false)).unwrap();
        store
            .add_subscriber(&region(), &item_id("whey"), &email("a@x.com"))
            .unwrap();

        let applied = store.apply_scraped(&region(), &scraped("whey", true)).unwrap();
        assert!(applied.restocked);
        assert!(applied.subscribers.contains(&email("a@x.com")));
    }

    #[test]
    fn add_subscriber_upserts_a_placeholder() {
        let store = InMemoryRegionStore::new();
        store
            .add_subscriber(&region(), &item_id("ghee"), &email("a@x.com"))
            .unwrap();
        let item = store.get_item(&region(), &item_id("ghee")).unwrap().unwrap();
        assert_eq!(item.subscribers.len(), 1);
        // Set semantics: adding again changes nothing.
        store
            .add_subscriber(&region(), &item_id("ghee"), &email("a@x.com"))
            .unwrap();
        let item = store.get_item(&region(), &item_id("ghee")).unwrap().unwrap();
        assert_eq!(item.subscribers.len(), 1);
    }

    #[test]
    fn region_subscribers_returns_the_union() {
        let store = InMemoryRegionStore::new();
        store
            .add_subscriber(&region(), &item_id("a"), &email("one@x.com"))
            .unwrap();
        store
            .add_subscriber(&region(), &item_id("b"), &email("one@x.com"))
            .unwrap();
        store
            .add_subscriber(&region(), &item_id("b"), &email("two@x.com"))
            .unwrap();

        let union = store.region_subscribers(&region()).unwrap();
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn drop_partition_removes_all_items() {
        let store = InMemoryRegionStore::new();
        store.apply_scraped(&region(), &scraped("a", true)).unwrap();
        store.apply_scraped(&region(), &scraped("b", false)).unwrap();
        assert_eq!(store.drop_partition(&region()).unwrap(), 2);
        assert!(store.list_items(&region()).unwrap().is_empty());
    }

    #[test]
    fn resolve_names_falls_back_to_the_id() {
        let store = InMemoryRegionStore::new();
        store.apply_scraped(&region(), &scraped("a", true)).unwrap();
        let mut wanted = BTreeSet::new();
        wanted.insert(item_id("a"));
        wanted.insert(item_id("unknown"));
        let names = store.resolve_names(&region(), &wanted).unwrap();
        assert_eq!(names, vec!["Item a".to_string(), "unknown".to_string()]);
    }

    #[test]
    fn insert_region_is_first_writer_wins() {
        let store = InMemoryRegionStore::new();
        assert!(store
            .insert_region(RegionRecord::new(region(), "Bengaluru"))
            .unwrap());
        assert!(!store
            .insert_region(RegionRecord::new(region(), "Somewhere else"))
            .unwrap());
        let stored = store.get_region(&region()).unwrap().unwrap();
        assert_eq!(stored.display_name, "Bengaluru");
    }
}

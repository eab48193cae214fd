//! Stock-change detection over scraper reports.

use std::sync::Arc;

use tracing::{debug, info};

use restock_catalog::{IngestReport, RestockEvent};
use restock_core::DomainError;

use crate::error::PipelineError;
use crate::stores::RegionStore;

/// What ingestion did, returned to the reporting scraper for
/// observability. Decoupled from whether notification delivery later
/// succeeds.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Items upserted.
    pub processed: usize,
    /// Restock transitions actually observed, in report order.
    pub restocks: Vec<RestockEvent>,
}

/// Compares incoming scraper reports to stored state and emits restock
/// events. Runs synchronously within the ingestion request; everything
/// after enqueue is the workers' problem.
pub struct StockChangeDetector {
    regions: Arc<dyn RegionStore>,
}

impl StockChangeDetector {
    pub fn new(regions: Arc<dyn RegionStore>) -> Self {
        Self { regions }
    }

    /// Process one batch of scraper-reported items for one region.
    ///
    /// Items are processed sequentially, so a duplicate item id within the
    /// batch sees the effect of the earlier report (last-write-wins on
    /// availability, at most one event per transition actually observed).
    pub fn process(&self, report: &IngestReport) -> Result<IngestOutcome, PipelineError> {
        if report.items.is_empty() {
            return Err(DomainError::validation("ingest report has no items").into());
        }
        if self.regions.get_region(&report.region)?.is_none() {
            return Err(DomainError::NotFound.into());
        }

        let mut restocks = Vec::new();
        for scraped in &report.items {
            let applied = self.regions.apply_scraped(&report.region, scraped)?;
            if applied.restocked {
                debug!(
                    region = %report.region,
                    item = %applied.item.id,
                    subscribers = applied.subscribers.len(),
                    "restock detected"
                );
                restocks.push(RestockEvent {
                    item: applied.item,
                    subscribers: applied.subscribers,
                });
            }
        }

        info!(
            region = %report.region,
            scraper = report.scraper_id.as_deref().unwrap_or("unknown"),
            processed = report.items.len(),
            restocked = restocks.len(),
            "ingest batch processed"
        );

        Ok(IngestOutcome {
            processed: report.items.len(),
            restocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use restock_catalog::{RegionRecord, ScrapedItem};
    use restock_core::{EmailAddress, ItemId, RegionCode};

    use super::*;
    use crate::stores::InMemoryRegionStore;

    fn region() -> RegionCode {
        RegionCode::new("560001").unwrap()
    }

    fn scraped(id: &str, available: bool) -> ScrapedItem {
        ScrapedItem {
            id: ItemId::new(id).unwrap(),
            name: format!("Item {id}"),
            available,
            page_url: None,
            image_url: None,
        }
    }

    fn report(items: Vec<ScrapedItem>) -> IngestReport {
        IngestReport {
            region: region(),
            items,
            timestamp: None,
            scraper_id: Some("test-scraper".to_string()),
        }
    }

    fn setup() -> (Arc<InMemoryRegionStore>, StockChangeDetector) {
        let store = InMemoryRegionStore::arc();
        store
            .insert_region(RegionRecord::new(region(), "Bengaluru"))
            .unwrap();
        (store.clone(), StockChangeDetector::new(store))
    }

    #[test]
    fn empty_batch_is_a_validation_error() {
        let (_, detector) = setup();
        let err = detector.process(&report(vec![])).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Domain(DomainError::Validation(_))
        ));
    }

    #[test]
    fn unknown_region_is_not_found() {
        let store = InMemoryRegionStore::arc();
        let detector = StockChangeDetector::new(store);
        let err = detector.process(&report(vec![scraped("a", true)])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn transition_emits_exactly_one_event() {
        let (store, detector) = setup();
        detector.process(&report(vec![scraped("a", false)])).unwrap();
        store
            .add_subscriber(&region(), &ItemId::new("a").unwrap(), &EmailAddress::new("s@x.com").unwrap())
            .unwrap();

        let outcome = detector.process(&report(vec![scraped("a", true)])).unwrap();
        assert_eq!(outcome.restocks.len(), 1);
        assert_eq!(outcome.restocks[0].subscribers.len(), 1);

        // Repeated availability does not re-emit.
        let outcome = detector.process(&report(vec![scraped("a", true)])).unwrap();
        assert!(outcome.restocks.is_empty());
    }

    #[test]
    fn duplicate_item_in_one_batch_is_sequential() {
        let (store, detector) = setup();
        detector.process(&report(vec![scraped("a", false)])).unwrap();

        // available then unavailable within one batch: net state is
        // unavailable and no sustained restock is reported as stocked.
        let outcome = detector
            .process(&report(vec![scraped("a", true), scraped("a", false)]))
            .unwrap();
        // The upward transition was observed once before the stock-out.
        assert_eq!(outcome.restocks.len(), 1);
        let item = store
            .get_item(&region(), &ItemId::new("a").unwrap())
            .unwrap()
            .unwrap();
        assert!(!item.availability.is_available());
    }
}

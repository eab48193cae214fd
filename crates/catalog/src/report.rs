//! Scraper report and restock event types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{EmailAddress, ItemId, RegionCode};

/// One item as reported by an external scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub id: ItemId,
    pub name: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A batch of scraper-reported items for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub region: RegionCode,
    pub items: Vec<ScrapedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper_id: Option<String>,
}

/// An item that came back in stock, as carried inside a restock event or a
/// notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockedItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A detected `unavailable -> available` transition.
///
/// `subscribers` is the snapshot read at detection time, before any
/// subsequent write in the same batch. Fan-out re-reads the authoritative
/// set; the snapshot is kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockEvent {
    pub item: RestockedItem,
    pub subscribers: BTreeSet<EmailAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scraped_item_deserializes_without_optional_urls() {
        let item: ScrapedItem =
            serde_json::from_str(r#"{"id":"whey-1kg","name":"Whey 1kg","available":true}"#)
                .unwrap();
        assert!(item.page_url.is_none());
        assert!(item.available);
    }

    #[test]
    fn ingest_report_round_trips() {
        let report = IngestReport {
            region: RegionCode::new("560001").unwrap(),
            items: vec![ScrapedItem {
                id: ItemId::new("whey-1kg").unwrap(),
                name: "Whey 1kg".to_string(),
                available: false,
                page_url: Some("https://shop.example/whey".to_string()),
                image_url: None,
            }],
            timestamp: None,
            scraper_id: Some("scraper-7".to_string()),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: IngestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}

//! Catalog items and the availability-transition rule.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{EmailAddress, ItemId};

use crate::report::ScrapedItem;

/// Reported availability of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Unavailable,
    Available,
}

impl Availability {
    pub fn is_available(self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn from_flag(available: bool) -> Self {
        if available {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

/// A catalog item within one region partition.
///
/// Invariant: an item belongs to exactly one region partition; the
/// subscriber set holds unique emails with no meaningful order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub availability: Availability,
    pub page_url: Option<String>,
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub subscribers: BTreeSet<EmailAddress>,
}

impl ItemRecord {
    /// Create a record from the first scraper sighting of an item.
    ///
    /// First sightings never count as a restock: there is no stored
    /// `unavailable` state to transition from.
    pub fn from_report(report: &ScrapedItem) -> Self {
        Self {
            id: report.id.clone(),
            name: report.name.clone(),
            availability: Availability::from_flag(report.available),
            page_url: report.page_url.clone(),
            image_url: report.image_url.clone(),
            last_updated: Utc::now(),
            subscribers: BTreeSet::new(),
        }
    }

    /// Create an empty placeholder for an item a subscriber asked about
    /// before any scraper has reported it.
    pub fn placeholder(id: ItemId) -> Self {
        Self {
            name: id.as_str().to_string(),
            id,
            availability: Availability::Unavailable,
            page_url: None,
            image_url: None,
            last_updated: Utc::now(),
            subscribers: BTreeSet::new(),
        }
    }

    /// Apply one scraper report to the stored record.
    ///
    /// Returns `true` iff this report is a restock, i.e. the stored
    /// availability was `Unavailable` and the report says available.
    /// Repeated `available` reports do not re-trigger. Name, availability
    /// and `last_updated` always follow the report; URL fields are only
    /// overwritten when the new value is non-empty.
    pub fn apply_report(&mut self, report: &ScrapedItem) -> bool {
        let restocked =
            !self.availability.is_available() && report.available;

        self.name = report.name.clone();
        self.availability = Availability::from_flag(report.available);
        self.last_updated = Utc::now();
        if let Some(url) = non_empty(&report.page_url) {
            self.page_url = Some(url);
        }
        if let Some(url) = non_empty(&report.image_url) {
            self.image_url = Some(url);
        }

        restocked
    }
}

fn non_empty(url: &Option<String>) -> Option<String> {
    url.as_deref().filter(|u| !u.is_empty()).map(str::to_string)
}

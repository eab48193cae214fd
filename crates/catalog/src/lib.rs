//! Catalog domain module: regions, items, and restock detection.
//!
//! This crate contains the availability-transition rules for catalog items,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod item;
pub mod region;
pub mod report;

pub use item::{Availability, ItemRecord};
pub use region::RegionRecord;
pub use report::{IngestReport, RestockEvent, RestockedItem, ScrapedItem};

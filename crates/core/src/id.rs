//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Geographic partition key scoping items and subscriptions (e.g. a postal
/// code). Items and subscriber sets are partitioned by this value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    /// Parse and validate a region code: non-empty, alphanumeric only.
    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.is_empty() {
            return Err(DomainError::invalid_id("RegionCode: empty"));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_id(format!(
                "RegionCode: non-alphanumeric: {code}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RegionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of a catalog item, assigned by the upstream catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Parse and validate an item id: non-empty, no interior whitespace.
    pub fn new(id: impl Into<String>) -> DomainResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::invalid_id("ItemId: empty"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_id(format!(
                "ItemId: contains whitespace: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Opaque capability credential for passwordless subscriber actions
/// (verify / edit / unsubscribe links).
///
/// Generated once at subscription time and immutable until the subscriber
/// record is deleted. Random (UUIDv4) so links are not guessable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberToken(Uuid);

impl SubscriberToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for SubscriberToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SubscriberToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("SubscriberToken: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_code_rejects_empty_and_punctuation() {
        assert!(RegionCode::new("").is_err());
        assert!(RegionCode::new("560 001").is_err());
        assert!(RegionCode::new("560001").is_ok());
        assert!(RegionCode::new("SW1A").is_ok());
    }

    #[test]
    fn item_id_rejects_whitespace() {
        assert!(ItemId::new("milk 1l").is_err());
        assert!(ItemId::new("").is_err());
        assert_eq!(ItemId::new("milk-1l").unwrap().as_str(), "milk-1l");
    }

    #[test]
    fn token_round_trips_through_string() {
        let token = SubscriberToken::generate();
        let parsed: SubscriberToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(SubscriberToken::generate(), SubscriberToken::generate());
    }
}

//! Subscriber records and lifecycle transitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{EmailAddress, ItemId, RegionCode, SubscriberToken};

/// Lifecycle state of a subscriber.
///
/// Deletion is not a state: a deleted subscriber has no record. The only
/// transition is `Unverified -> Verified`; expiry removes unverified
/// records outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unverified,
    Verified,
}

/// A subscriber: one record per contact email, one per token.
///
/// Invariant: `items` is always a subset of the owning region's item
/// partition (the stores maintain this by upserting placeholders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: EmailAddress,
    pub items: BTreeSet<ItemId>,
    pub region: RegionCode,
    pub token: SubscriberToken,
    pub state: LifecycleState,
    /// Set only while unverified; cleared permanently on verification and
    /// never re-armed.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// Create a fresh unverified subscriber with a newly generated token
    /// and a verification deadline of `now + ttl`.
    pub fn new(
        email: EmailAddress,
        items: BTreeSet<ItemId>,
        region: RegionCode,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            email,
            items,
            region,
            token: SubscriberToken::generate(),
            state: LifecycleState::Unverified,
            expires_at: Some(now + ttl),
            created_at: now,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.state == LifecycleState::Verified
    }

    /// Whether the verification window has lapsed. Verified subscribers
    /// never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.state, self.expires_at) {
            (LifecycleState::Unverified, Some(deadline)) => deadline <= now,
            _ => false,
        }
    }

    /// Flip to verified, clearing the expiry deadline permanently.
    ///
    /// Returns `true` if the state actually changed; a second call is a
    /// no-op, which is what makes verification safe under at-least-once
    /// job redelivery.
    pub fn verify(&mut self) -> bool {
        if self.state == LifecycleState::Verified {
            return false;
        }
        self.state = LifecycleState::Verified;
        self.expires_at = None;
        true
    }

    /// Capture the fields needed for post-delete cleanup.
    pub fn snapshot(&self) -> SubscriberSnapshot {
        SubscriberSnapshot {
            email: self.email.clone(),
            items: self.items.clone(),
            region: self.region.clone(),
        }
    }
}

/// Pre-delete snapshot of a subscriber, carried in unsubscribe-cleanup job
/// payloads. The record itself is deleted synchronously before the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberSnapshot {
    pub email: EmailAddress,
    pub items: BTreeSet<ItemId>,
    pub region: RegionCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(ttl_secs: i64) -> Subscriber {
        let mut items = BTreeSet::new();
        items.insert(ItemId::new("whey-1kg").unwrap());
        Subscriber::new(
            EmailAddress::new("a@x.com").unwrap(),
            items,
            RegionCode::new("560001").unwrap(),
            Duration::seconds(ttl_secs),
        )
    }

    #[test]
    fn new_subscriber_is_unverified_with_deadline() {
        let sub = subscriber(300);
        assert_eq!(sub.state, LifecycleState::Unverified);
        let deadline = sub.expires_at.unwrap();
        let expected = Utc::now() + Duration::seconds(300);
        assert!((deadline - expected).num_seconds().abs() <= 2);
    }

    #[test]
    fn verify_clears_deadline_and_is_idempotent() {
        let mut sub = subscriber(300);
        assert!(sub.verify());
        assert!(sub.is_verified());
        assert!(sub.expires_at.is_none());
        // Second verification is a no-op.
        assert!(!sub.verify());
        assert!(sub.expires_at.is_none());
    }

    #[test]
    fn expiry_applies_only_while_unverified() {
        let mut sub = subscriber(-1);
        assert!(sub.is_expired(Utc::now()));
        sub.verify();
        assert!(!sub.is_expired(Utc::now()));
    }

    #[test]
    fn snapshot_captures_cleanup_fields() {
        let sub = subscriber(300);
        let snap = sub.snapshot();
        assert_eq!(snap.email, sub.email);
        assert_eq!(snap.items, sub.items);
        assert_eq!(snap.region, sub.region);
    }
}

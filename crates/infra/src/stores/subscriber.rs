//! Subscriber store: one record per email, one per token, TTL-aware.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use restock_core::{EmailAddress, SubscriberToken};
use restock_subscriptions::Subscriber;

use super::StoreError;

/// Port for subscriber records.
///
/// Lookups are lazy-expiring: an unverified record whose deadline has
/// passed is reported as absent even before the sweep physically removes
/// it, so expiry never races verification observably.
pub trait SubscriberStore: Send + Sync {
    /// Insert a new record. Returns `false` on conflict (a live record for
    /// the same email already exists). An expired record for the same
    /// email is replaced.
    fn insert(&self, subscriber: Subscriber) -> Result<bool, StoreError>;

    fn get_by_email(&self, email: &EmailAddress) -> Result<Option<Subscriber>, StoreError>;

    fn get_by_token(&self, token: &SubscriberToken) -> Result<Option<Subscriber>, StoreError>;

    /// Replace the record for `subscriber.email`. Returns `false` if no
    /// live record exists.
    fn update(&self, subscriber: &Subscriber) -> Result<bool, StoreError>;

    /// Delete by email, returning the removed record and stamping the
    /// recently-removed entry.
    fn delete_by_email(&self, email: &EmailAddress) -> Result<Option<Subscriber>, StoreError>;

    /// Delete by token, returning the removed record and stamping the
    /// recently-removed entry.
    fn delete_by_token(&self, token: &SubscriberToken)
        -> Result<Option<Subscriber>, StoreError>;

    /// Physically remove unverified records whose deadline has passed, and
    /// prune recently-removed entries older than `cooldown` (they can no
    /// longer block a resubscribe, so keeping them only leaks memory).
    /// Returns how many expired records were removed. Pure deletion: no
    /// notification.
    fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<usize, StoreError>;

    /// When this email last unsubscribed, if recently. Used by the
    /// controller to enforce the resubscribe cooldown.
    fn recently_removed_at(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    by_email: HashMap<EmailAddress, Subscriber>,
    token_index: HashMap<SubscriberToken, EmailAddress>,
    recently_removed: HashMap<EmailAddress, DateTime<Utc>>,
}

/// In-memory subscriber store.
#[derive(Debug, Default)]
pub struct InMemorySubscriberStore {
    inner: RwLock<Inner>,
}

impl InMemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn live<'a>(sub: Option<&'a Subscriber>, now: DateTime<Utc>) -> Option<&'a Subscriber> {
    sub.filter(|s| !s.is_expired(now))
}

impl SubscriberStore for InMemorySubscriberStore {
    fn insert(&self, subscriber: Subscriber) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();

        if let Some(existing) = inner.by_email.get(&subscriber.email) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
            // The old unverified signup timed out; let the email retry.
            let stale_token = existing.token;
            inner.token_index.remove(&stale_token);
            inner.by_email.remove(&subscriber.email);
        }

        inner
            .token_index
            .insert(subscriber.token, subscriber.email.clone());
        inner.by_email.insert(subscriber.email.clone(), subscriber);
        Ok(true)
    }

    fn get_by_email(&self, email: &EmailAddress) -> Result<Option<Subscriber>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(live(inner.by_email.get(email), Utc::now()).cloned())
    }

    fn get_by_token(&self, token: &SubscriberToken) -> Result<Option<Subscriber>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let email = match inner.token_index.get(token) {
            Some(email) => email,
            None => return Ok(None),
        };
        Ok(live(inner.by_email.get(email), Utc::now()).cloned())
    }

    fn update(&self, subscriber: &Subscriber) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if !inner.by_email.contains_key(&subscriber.email) {
            return Ok(false);
        }
        inner.by_email.insert(subscriber.email.clone(), subscriber.clone());
        Ok(true)
    }

    fn delete_by_email(&self, email: &EmailAddress) -> Result<Option<Subscriber>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let removed = inner.by_email.remove(email);
        if let Some(sub) = &removed {
            inner.token_index.remove(&sub.token);
            inner.recently_removed.insert(sub.email.clone(), Utc::now());
        }
        Ok(removed)
    }

    fn delete_by_token(
        &self,
        token: &SubscriberToken,
    ) -> Result<Option<Subscriber>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let email = match inner.token_index.remove(token) {
            Some(email) => email,
            None => return Ok(None),
        };
        let removed = inner.by_email.remove(&email);
        if removed.is_some() {
            inner.recently_removed.insert(email, Utc::now());
        }
        Ok(removed)
    }

    fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let expired: Vec<EmailAddress> = inner
            .by_email
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.email.clone())
            .collect();
        for email in &expired {
            if let Some(sub) = inner.by_email.remove(email) {
                inner.token_index.remove(&sub.token);
            }
        }
        let horizon = now - cooldown;
        inner.recently_removed.retain(|_, removed_at| *removed_at > horizon);
        Ok(expired.len())
    }

    fn recently_removed_at(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.recently_removed.get(email).copied())
    }
}

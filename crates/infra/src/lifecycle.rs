//! Subscription lifecycle controller.
//!
//! Owns the subscriber state machine and token-based action resolution.
//! State transitions that must be immediately consistent (creation,
//! deletion, edits) mutate the stores synchronously; side effects that
//! tolerate eventual consistency (mail sends, subscriber-set updates after
//! verification, post-delete cleanup) are enqueued as jobs.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use restock_catalog::RegionRecord;
use restock_core::{DomainError, EmailAddress, ItemId, RegionCode, SubscriberToken};
use restock_queue::{Job, JobKind, JobStore, RetryPolicy};
use restock_subscriptions::{Subscriber, SubscriberSnapshot};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::payloads::{UnsubscribePayload, VerificationPayload};
use crate::stores::{RegionStore, SubscriberStore};

/// How a caller identifies a subscriber: by contact email or by the opaque
/// token from a mail link.
#[derive(Debug, Clone)]
pub enum SubscriberRef {
    Email(EmailAddress),
    Token(SubscriberToken),
}

/// Synchronous entry point for all subscriber lifecycle actions.
pub struct LifecycleController {
    subscribers: Arc<dyn SubscriberStore>,
    regions: Arc<dyn RegionStore>,
    queue: Arc<dyn JobStore>,
    config: PipelineConfig,
}

impl LifecycleController {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        regions: Arc<dyn RegionStore>,
        queue: Arc<dyn JobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            subscribers,
            regions,
            queue,
            config,
        }
    }

    fn enqueue(&self, kind: JobKind, payload: impl serde::Serialize) -> Result<(), PipelineError> {
        let job = Job::new(kind, serde_json::to_value(payload)?)
            .with_retry_policy(self.config.retry_policy.clone());
        self.queue.enqueue(job)?;
        Ok(())
    }

    /// Create an unverified subscription and enqueue the verification mail.
    ///
    /// The region record is created on first subscription. Rejected with a
    /// conflict if the email already has a live record, or unsubscribed
    /// within the cooldown window.
    pub fn subscribe(
        &self,
        email: EmailAddress,
        items: BTreeSet<ItemId>,
        region: RegionCode,
        region_name: &str,
    ) -> Result<Subscriber, PipelineError> {
        if items.is_empty() {
            return Err(DomainError::validation("subscription has no items").into());
        }

        if let Some(removed_at) = self.subscribers.recently_removed_at(&email)? {
            if Utc::now() - removed_at < self.config.resubscribe_cooldown {
                return Err(DomainError::conflict(
                    "recently unsubscribed; try again later",
                )
                .into());
            }
        }

        let subscriber = Subscriber::new(
            email.clone(),
            items,
            region.clone(),
            self.config.verification_ttl,
        );
        if !self.subscribers.insert(subscriber.clone())? {
            return Err(DomainError::conflict("subscriber already exists").into());
        }

        self.regions
            .insert_region(RegionRecord::new(region.clone(), region_name))?;
        self.regions.touch_region(&region)?;

        self.enqueue(
            JobKind::SendVerification,
            VerificationPayload {
                token: subscriber.token,
            },
        )?;

        info!(email = %email, region = %region, "subscriber created, verification pending");
        Ok(subscriber)
    }

    /// Accept a clicked verification link: resolve the token synchronously,
    /// then enqueue completion (state flip + subscriber-set additions).
    pub fn verify(&self, token: SubscriberToken) -> Result<(), PipelineError> {
        if self.subscribers.get_by_token(&token)?.is_none() {
            return Err(DomainError::NotFound.into());
        }
        self.enqueue(JobKind::ProcessVerification, VerificationPayload { token })
    }

    /// Rewrite a subscription's item set (and possibly region)
    /// synchronously. Subscriber-set membership follows immediately for
    /// verified subscribers; unverified ones get their sets materialized at
    /// verification.
    pub fn edit(
        &self,
        subscriber: SubscriberRef,
        new_items: BTreeSet<ItemId>,
        new_region: RegionCode,
        region_name: &str,
    ) -> Result<Subscriber, PipelineError> {
        if new_items.is_empty() {
            return Err(DomainError::validation("subscription has no items").into());
        }

        let mut record = self.resolve(&subscriber)?;
        let old_items = std::mem::take(&mut record.items);
        let old_region = record.region.clone();

        for item in &old_items {
            self.regions.remove_subscriber(&old_region, item, &record.email)?;
        }

        record.items = new_items;
        record.region = new_region.clone();
        self.subscribers.update(&record)?;

        if record.is_verified() {
            for item in &record.items {
                self.regions.add_subscriber(&new_region, item, &record.email)?;
            }
        }

        self.regions
            .insert_region(RegionRecord::new(new_region.clone(), region_name))?;
        self.regions.touch_region(&old_region)?;
        self.regions.touch_region(&new_region)?;

        info!(email = %record.email, region = %new_region, "subscription edited");
        Ok(record)
    }

    /// Delete the subscriber record synchronously and enqueue the cleanup
    /// job with a pre-delete snapshot. The caller gets success as soon as
    /// the record is gone; set cleanup and the confirmation mail are
    /// asynchronous.
    pub fn unsubscribe(
        &self,
        subscriber: SubscriberRef,
    ) -> Result<SubscriberSnapshot, PipelineError> {
        let (removed, kind) = match &subscriber {
            SubscriberRef::Email(email) => (
                self.subscribers.delete_by_email(email)?,
                JobKind::ProcessUnsubscribe,
            ),
            SubscriberRef::Token(token) => (
                self.subscribers.delete_by_token(token)?,
                JobKind::ProcessUnsubscribeByToken,
            ),
        };
        let removed = removed.ok_or(DomainError::NotFound)?;

        let snapshot = removed.snapshot();
        self.enqueue(
            kind,
            UnsubscribePayload {
                snapshot: snapshot.clone(),
            },
        )?;

        info!(email = %snapshot.email, "subscriber deleted, cleanup enqueued");
        Ok(snapshot)
    }

    pub fn get_by_email(&self, email: &EmailAddress) -> Result<Subscriber, PipelineError> {
        self.subscribers
            .get_by_email(email)?
            .ok_or_else(|| DomainError::NotFound.into())
    }

    pub fn get_by_token(&self, token: &SubscriberToken) -> Result<Subscriber, PipelineError> {
        self.subscribers
            .get_by_token(token)?
            .ok_or_else(|| DomainError::NotFound.into())
    }

    fn resolve(&self, subscriber: &SubscriberRef) -> Result<Subscriber, PipelineError> {
        match subscriber {
            SubscriberRef::Email(email) => self.get_by_email(email),
            SubscriberRef::Token(token) => self.get_by_token(token),
        }
    }

    /// The retry policy the controller attaches to jobs it enqueues.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry_policy
    }
}

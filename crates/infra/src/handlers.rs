//! Job handlers: one per kind, registered on the executor's dispatch table.
//!
//! Handlers run under at-least-once delivery, so each one checks current
//! state before mutating (set semantics, verified-flag checks) rather than
//! assuming single delivery. Preconditions that retrying cannot fix
//! (unknown token or email, malformed payload) discard the job instead of
//! burning retries.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use restock_core::RegionCode;
use restock_queue::{Job, JobExecutor, JobKind, JobResult, JobStore, RetryPolicy};

use crate::mailer::{Mailer, MailerError, OutboundMail};
use crate::payloads::{
    ExpiryNoticePayload, NotificationPayload, SubscribePayload, UnsubscribePayload,
    VerificationPayload,
};
use crate::stores::{RegionStore, StoreError, SubscriberStore};

/// Everything a handler needs, shared across all kinds.
#[derive(Clone)]
pub struct HandlerContext {
    pub regions: Arc<dyn RegionStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub queue: Arc<dyn JobStore>,
    pub mailer: Arc<dyn Mailer>,
    pub retry_policy: RetryPolicy,
}

/// Register the handler for every job kind on the executor.
pub fn register_all<S: JobStore + 'static>(executor: &mut JobExecutor<S>, ctx: &HandlerContext) {
    let c = ctx.clone();
    executor.register(JobKind::SendNotification, move |job| {
        run(send_notification(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::SendExpiryNotice, move |job| {
        run(send_expiry_notice(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::ProcessSubscribe, move |job| {
        run(process_subscribe(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::ProcessUnsubscribe, move |job| {
        run(process_unsubscribe(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::ProcessUnsubscribeByToken, move |job| {
        run(process_unsubscribe(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::SendVerification, move |job| {
        run(send_verification(&c, job))
    });
    let c = ctx.clone();
    executor.register(JobKind::ProcessVerification, move |job| {
        run(process_verification(&c, job))
    });
}

/// Handler-internal failure, split by whether a retry can help.
enum HandlerError {
    Retry(String),
    Discard(String),
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        HandlerError::Retry(format!("store unavailable: {e}"))
    }
}

impl From<MailerError> for HandlerError {
    fn from(e: MailerError) -> Self {
        match e {
            MailerError::Transient(msg) => {
                HandlerError::Retry(format!("mail sender unavailable: {msg}"))
            }
            MailerError::Rejected(msg) => HandlerError::Discard(format!("mail rejected: {msg}")),
        }
    }
}

impl From<restock_queue::JobStoreError> for HandlerError {
    fn from(e: restock_queue::JobStoreError) -> Self {
        HandlerError::Retry(format!("queue unavailable: {e}"))
    }
}

fn run(outcome: Result<(), HandlerError>) -> JobResult {
    match outcome {
        Ok(()) => JobResult::Success,
        Err(HandlerError::Retry(msg)) => JobResult::Retry(msg),
        Err(HandlerError::Discard(msg)) => JobResult::Discard(msg),
    }
}

fn decode<T: DeserializeOwned>(job: &Job) -> Result<T, HandlerError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| HandlerError::Discard(format!("malformed payload: {e}")))
}

fn region_display_name(
    regions: &Arc<dyn RegionStore>,
    code: &RegionCode,
) -> Result<String, HandlerError> {
    Ok(regions
        .get_region(code)?
        .map(|r| r.display_name)
        .unwrap_or_else(|| code.as_str().to_string()))
}

fn send_notification(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: NotificationPayload = decode(job)?;

    let subscriber = ctx
        .subscribers
        .get_by_email(&payload.email)?
        .ok_or_else(|| HandlerError::Discard("subscriber no longer exists".to_string()))?;
    if !subscriber.is_verified() {
        return Err(HandlerError::Discard("subscriber is not verified".to_string()));
    }

    let region_name = region_display_name(&ctx.regions, &payload.region)?;
    ctx.mailer.deliver(&OutboundMail::RestockNotice {
        to: payload.email,
        region_name,
        items: payload.items,
        token: subscriber.token,
    })?;
    Ok(())
}

fn send_expiry_notice(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: ExpiryNoticePayload = decode(job)?;
    ctx.mailer.deliver(&OutboundMail::RegionExpired {
        to: payload.email,
        region_name: payload.region_name,
    })?;
    Ok(())
}

fn process_subscribe(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: SubscribePayload = decode(job)?;

    // Set semantics make re-delivery harmless.
    for item in &payload.items {
        ctx.regions.add_subscriber(&payload.region, item, &payload.email)?;
    }
    ctx.regions.touch_region(&payload.region)?;

    let item_names = ctx.regions.resolve_names(&payload.region, &payload.items)?;
    ctx.mailer.deliver(&OutboundMail::SubscriptionConfirmed {
        to: payload.email,
        item_names,
    })?;
    debug!(region = %payload.region, items = payload.items.len(), "subscription materialized");
    Ok(())
}

fn process_unsubscribe(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: UnsubscribePayload = decode(job)?;
    let snapshot = payload.snapshot;

    // The record is already deleted; only the item sets need cleanup.
    // Removal is a no-op when re-delivered.
    for item in &snapshot.items {
        ctx.regions.remove_subscriber(&snapshot.region, item, &snapshot.email)?;
    }

    let item_names = ctx.regions.resolve_names(&snapshot.region, &snapshot.items)?;
    ctx.mailer.deliver(&OutboundMail::UnsubscribeConfirmed {
        to: snapshot.email,
        item_names,
    })?;
    Ok(())
}

fn send_verification(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: VerificationPayload = decode(job)?;
    let subscriber = ctx
        .subscribers
        .get_by_token(&payload.token)?
        .ok_or_else(|| HandlerError::Discard("no live subscriber for token".to_string()))?;

    ctx.mailer.deliver(&OutboundMail::VerificationRequest {
        to: subscriber.email,
        token: payload.token,
    })?;
    Ok(())
}

fn process_verification(ctx: &HandlerContext, job: &Job) -> Result<(), HandlerError> {
    let payload: VerificationPayload = decode(job)?;
    let mut subscriber = ctx
        .subscribers
        .get_by_token(&payload.token)?
        .ok_or_else(|| HandlerError::Discard("no live subscriber for token".to_string()))?;

    // Already verified: a duplicate delivery must not re-run the
    // subscription materialization.
    if !subscriber.verify() {
        return Ok(());
    }
    ctx.subscribers.update(&subscriber)?;

    let materialize = SubscribePayload {
        email: subscriber.email.clone(),
        items: subscriber.items.clone(),
        region: subscriber.region.clone(),
    };
    let job = Job::new(
        JobKind::ProcessSubscribe,
        serde_json::to_value(&materialize)
            .map_err(|e| HandlerError::Discard(format!("payload serialization failed: {e}")))?,
    )
    .with_retry_policy(ctx.retry_policy.clone());
    ctx.queue.enqueue(job)?;
    Ok(())
}

//! Kind-specific job payloads, carried as JSON inside [`restock_queue::Job`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use restock_catalog::RestockedItem;
use restock_core::{EmailAddress, ItemId, RegionCode, SubscriberToken};
use restock_subscriptions::SubscriberSnapshot;

/// Payload of `JobKind::SendNotification`: one batched mail per subscriber
/// per restock batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub email: EmailAddress,
    pub region: RegionCode,
    pub items: Vec<RestockedItem>,
}

/// Payload of `JobKind::SendExpiryNotice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryNoticePayload {
    pub email: EmailAddress,
    pub region: RegionCode,
    pub region_name: String,
}

/// Payload of `JobKind::ProcessSubscribe`: materialize the subscription
/// after verification (subscriber-set additions + confirmation mail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub email: EmailAddress,
    pub items: BTreeSet<ItemId>,
    pub region: RegionCode,
}

/// Payload of `JobKind::ProcessUnsubscribe` and
/// `JobKind::ProcessUnsubscribeByToken`: the pre-delete snapshot (the
/// record itself is already gone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribePayload {
    #[serde(flatten)]
    pub snapshot: SubscriberSnapshot,
}

/// Payload of `JobKind::SendVerification` and
/// `JobKind::ProcessVerification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPayload {
    pub token: SubscriberToken,
}

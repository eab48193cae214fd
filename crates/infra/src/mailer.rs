//! Mail sender port.
//!
//! The pipeline decides *what* to send and *to whom*; rendering bodies and
//! actually talking to a mail provider are the adapter's problem.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use restock_catalog::RestockedItem;
use restock_core::{EmailAddress, SubscriberToken};

/// A notification the pipeline wants delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMail {
    /// Batched restock notice: every item in one mail, with the token so
    /// the template can build edit/unsubscribe links.
    RestockNotice {
        to: EmailAddress,
        region_name: String,
        items: Vec<RestockedItem>,
        token: SubscriberToken,
    },
    /// Verification link for a fresh signup.
    VerificationRequest {
        to: EmailAddress,
        token: SubscriberToken,
    },
    /// Subscription is live.
    SubscriptionConfirmed {
        to: EmailAddress,
        item_names: Vec<String>,
    },
    /// Unsubscribe processed.
    UnsubscribeConfirmed {
        to: EmailAddress,
        item_names: Vec<String>,
    },
    /// The subscriber's region was removed by an operator.
    RegionExpired {
        to: EmailAddress,
        region_name: String,
    },
}

impl OutboundMail {
    pub fn recipient(&self) -> &EmailAddress {
        match self {
            OutboundMail::RestockNotice { to, .. }
            | OutboundMail::VerificationRequest { to, .. }
            | OutboundMail::SubscriptionConfirmed { to, .. }
            | OutboundMail::UnsubscribeConfirmed { to, .. }
            | OutboundMail::RegionExpired { to, .. } => to,
        }
    }
}

/// Mail delivery failure.
#[derive(Debug, Clone, Error)]
pub enum MailerError {
    /// Provider unavailable / timed out; worth retrying.
    #[error("transient mail failure: {0}")]
    Transient(String),
    /// Provider rejected the message; retrying will not help.
    #[error("mail rejected: {0}")]
    Rejected(String),
}

/// External mail sender boundary.
pub trait Mailer: Send + Sync {
    fn deliver(&self, mail: &OutboundMail) -> Result<(), MailerError>;
}

/// Mailer that only logs. Useful as a stand-in while no provider is wired.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn deliver(&self, mail: &OutboundMail) -> Result<(), MailerError> {
        info!(to = %mail.recipient(), mail = ?mail, "mail delivered (log only)");
        Ok(())
    }
}

/// Mailer that records every delivery, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    pub fn sent_to(&self, email: &EmailAddress) -> Vec<OutboundMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient() == email)
            .collect()
    }
}

impl Mailer for RecordingMailer {
    fn deliver(&self, mail: &OutboundMail) -> Result<(), MailerError> {
        self.sent
            .lock()
            .map_err(|_| MailerError::Transient("recorder lock poisoned".to_string()))?
            .push(mail.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_mailer_collects_per_recipient() {
        let mailer = RecordingMailer::new();
        let a = EmailAddress::new("a@x.com").unwrap();
        let b = EmailAddress::new("b@x.com").unwrap();
        mailer
            .deliver(&OutboundMail::RegionExpired {
                to: a.clone(),
                region_name: "Bengaluru".to_string(),
            })
            .unwrap();
        mailer
            .deliver(&OutboundMail::RegionExpired {
                to: b,
                region_name: "Bengaluru".to_string(),
            })
            .unwrap();

        assert_eq!(mailer.sent().len(), 2);
        assert_eq!(mailer.sent_to(&a).len(), 1);
    }
}

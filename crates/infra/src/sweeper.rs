//! Background sweep of expired unverified subscribers.
//!
//! Store reads already filter expired records out; the sweeper only
//! reclaims their storage on a fixed interval.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::stores::SubscriberStore;

/// Shutdown handle for a spawned [`ExpirySweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.join.join();
    }
}

pub struct ExpirySweeper {
    subscribers: Arc<dyn SubscriberStore>,
    interval: Duration,
    cooldown: chrono::Duration,
}

impl ExpirySweeper {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        interval: Duration,
        cooldown: chrono::Duration,
    ) -> Self {
        Self {
            subscribers,
            interval,
            cooldown,
        }
    }

    /// Run one sweep now. Returns the number of records removed.
    pub fn sweep_once(&self) -> Result<usize, crate::stores::StoreError> {
        let removed = self.subscribers.sweep_expired(Utc::now(), self.cooldown)?;
        if removed > 0 {
            info!(removed, "swept expired unverified subscribers");
        } else {
            debug!("expiry sweep found nothing to remove");
        }
        Ok(removed)
    }

    /// Spawn the sweep loop on a dedicated thread.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("expiry-sweeper".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(self.interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if let Err(e) = self.sweep_once() {
                    warn!(error = %e, "expiry sweep failed");
                }
            })
            .expect("failed to spawn expiry sweeper thread");
        SweeperHandle { shutdown_tx, join }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use restock_core::{EmailAddress, ItemId, RegionCode};
    use restock_subscriptions::Subscriber;

    use super::*;
    use crate::stores::InMemorySubscriberStore;

    fn expired_subscriber(addr: &str) -> Subscriber {
        Subscriber::new(
            EmailAddress::new(addr).unwrap(),
            BTreeSet::from([ItemId::new("whey").unwrap()]),
            RegionCode::new("560001").unwrap(),
            chrono::Duration::minutes(-1),
        )
    }

    #[test]
    fn sweep_once_reports_removals() {
        let store = InMemorySubscriberStore::arc();
        store.insert(expired_subscriber("a@x.com")).unwrap();
        store.insert(expired_subscriber("b@x.com")).unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), Duration::from_secs(60), chrono::Duration::minutes(10));
        assert_eq!(sweeper.sweep_once().unwrap(), 2);
        assert_eq!(sweeper.sweep_once().unwrap(), 0);
    }

    #[test]
    fn spawned_sweeper_shuts_down_cleanly() {
        let store = InMemorySubscriberStore::arc();
        store.insert(expired_subscriber("a@x.com")).unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), Duration::from_millis(5), chrono::Duration::minutes(10));
        let handle = sweeper.spawn();
        std::thread::sleep(Duration::from_millis(50));
        handle.shutdown();

        assert!(store
            .get_by_email(&EmailAddress::new("a@x.com").unwrap())
            .unwrap()
            .is_none());
    }
}

//! Subscriptions domain module: the subscriber record and its lifecycle
//! state machine (unverified → verified, with TTL expiry racing
//! verification). Pure domain logic, no IO.

pub mod subscriber;

pub use subscriber::{LifecycleState, Subscriber, SubscriberSnapshot};

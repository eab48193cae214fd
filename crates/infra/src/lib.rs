//! Infrastructure layer: stores, the notification pipeline, job handlers,
//! and the background workers that tie them together.

pub mod admin;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod ingest;
pub mod lifecycle;
pub mod mailer;
pub mod payloads;
pub mod runtime;
pub mod stores;
pub mod sweeper;
pub mod telemetry;


pub use admin::RegionAdmin;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use fanout::FanoutBuilder;
pub use handlers::{register_all, HandlerContext};
pub use ingest::{IngestOutcome, StockChangeDetector};
pub use lifecycle::{LifecycleController, SubscriberRef};
pub use mailer::{LogMailer, Mailer, MailerError, OutboundMail, RecordingMailer};
pub use runtime::{PipelineRuntime, RunningPipeline};
pub use stores::{
    InMemoryRegionStore, InMemorySubscriberStore, RegionStore, StoreError, SubscriberStore,
};
pub use sweeper::{ExpirySweeper, SweeperHandle};

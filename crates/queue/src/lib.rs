//! Background job broker with retry, backoff, and bounded retention.
//!
//! ## Design
//!
//! - One logical queue, multiple named job kinds
//! - At-least-once delivery: handlers may run more than once per logical
//!   job and must tolerate duplicate side effects
//! - Retry with exponential backoff until attempts are exhausted
//! - Bounded retention of terminal jobs (completed/failed)
//! - Typed dispatch table: one registered handler per kind
//!
//! ## Components
//!
//! - `Job`: the unit of asynchronous work (kind + JSON payload + policy)
//! - `JobStore`: persistence for jobs (in-memory, trait for durable impls)
//! - `JobExecutor`: claims jobs and runs handlers with retry accounting

pub mod executor;
pub mod job;
pub mod store;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler, WorkerStats};
pub use job::{
    BackoffStrategy, Job, JobId, JobKind, JobResult, JobStatus, RetentionPolicy, RetryPolicy,
};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};

//! Job executor: typed dispatch table plus the polling worker loop.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::job::{Job, JobKind, JobResult, JobStatus};
use crate::store::{JobStore, JobStoreError};

/// Job handler function type. Handlers run under at-least-once delivery
/// and must tolerate duplicate invocations for the same logical job.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll when the queue is empty.
    pub poll_interval: Duration,
    /// Advisory per-attempt budget; overruns are logged, not cancelled.
    pub attempt_timeout: Duration,
    /// Worker name for logging.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(30),
            name: "job-worker".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the in-flight job to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub uptime_secs: u64,
}

/// Pulls jobs from a store and runs the registered handler for each kind.
///
/// Exactly one handler per kind; registering a kind twice replaces the
/// previous handler. A claimed job with no handler fails permanently.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<JobKind, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a job kind.
    pub fn register<F>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute one already-claimed job, writing the outcome back.
    ///
    /// Returns the terminal-or-retry error string on anything but success.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.handlers.get(&job.kind) else {
            let error = format!("no handler registered for kind: {}", job.kind);
            warn!(job_id = %job.id, kind = %job.kind, "unroutable job");
            job.mark_permanent_failure(error.clone());
            self.store.update(job).map_err(|e| e.to_string())?;
            return Err(error);
        };

        let started = Instant::now();
        // A panicking handler must not take the worker thread (and the
        // claimed job) down with it; treat the panic as a retryable failure.
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(job))).unwrap_or_else(|e| {
            let reason = panic_message(&*e);
            error!(job_id = %job.id, kind = %job.kind, reason = %reason, "handler panicked");
            JobResult::Retry(format!("handler panicked: {reason}"))
        });
        let elapsed = started.elapsed();

        match result {
            JobResult::Success => {
                job.mark_completed();
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, kind = %job.kind, ?elapsed, "job completed");
                Ok(())
            }
            JobResult::Retry(error) => {
                job.mark_retryable_failure(error.clone());
                self.store.update(job).map_err(|e| e.to_string())?;
                if let JobStatus::Failed { attempts, .. } = job.status {
                    warn!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempts,
                        error = %error,
                        "job failed after exhausting retries"
                    );
                } else {
                    debug!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempt = job.attempt,
                        error = %error,
                        "job scheduled for retry"
                    );
                }
                Err(error)
            }
            JobResult::Discard(error) => {
                job.mark_permanent_failure(error.clone());
                self.store.update(job).map_err(|e| e.to_string())?;
                warn!(job_id = %job.id, kind = %job.kind, error = %error, "job discarded");
                Err(error)
            }
        }
    }

    /// Claim and execute ready jobs until none remain. Jobs whose retry
    /// backoff has not elapsed are left waiting. Returns the number of
    /// attempts executed. Test/ops utility; production workers use
    /// [`JobExecutor::spawn`].
    pub fn drain_ready(&self) -> Result<usize, JobStoreError> {
        let mut executed = 0;
        while let Some(mut job) = self.store.claim_next()? {
            let _ = self.execute_one(&mut job);
            executed += 1;
        }
        Ok(executed)
    }

    /// Spawn the polling worker in a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn job worker thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "job worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(worker = %config.name, job_id = %job.id, kind = %job.kind, "claimed job");
                let attempt_started = Instant::now();
                let result = executor.execute_one(&mut job);
                let elapsed = attempt_started.elapsed();

                if elapsed > config.attempt_timeout {
                    warn!(
                        worker = %config.name,
                        job_id = %job.id,
                        ?elapsed,
                        budget = ?config.attempt_timeout,
                        "job attempt exceeded its time budget"
                    );
                }

                if let Ok(mut s) = stats.lock() {
                    s.jobs_processed += 1;
                    match (&result, &job.status) {
                        (Ok(()), _) => s.jobs_succeeded += 1,
                        (Err(_), JobStatus::Failed { .. }) => s.jobs_failed += 1,
                        (Err(_), _) => s.jobs_retried += 1,
                    }
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(worker = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "job worker stopped");
}

//! Job storage: trait plus the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::job::{Job, JobId, JobStatus, RetentionPolicy};

/// Job store abstraction.
///
/// The broker persists a job before `enqueue` returns; callers never wait
/// for processing. `claim_next` hands each job to exactly one claimant per
/// attempt (fair competition between workers, not broadcast).
pub trait JobStore: Send + Sync {
    /// Persist a new job. Returns once the job is durable.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by id.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Write back an updated job.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Atomically claim the oldest ready waiting job, marking it active.
    /// Returns `None` when nothing is claimable.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Counts by status, for operational monitoring.
    fn status(&self) -> Result<JobStats, JobStoreError>;

    /// Permanently failed jobs, oldest first.
    fn list_failed(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Remove every job regardless of state (test/ops utility).
    fn drain(&self) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Queue-level counts exposed for monitoring; not part of the notification
/// correctness contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// In-memory job store.
///
/// Also the reference implementation for the retention contract: terminal
/// jobs beyond the retention counts are trimmed oldest-first on write.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    retention: RetentionPolicy,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::default())
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    fn lock_read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    /// Trim terminal jobs beyond the retention counts, oldest first.
    fn apply_retention(jobs: &mut HashMap<JobId, Job>, retention: RetentionPolicy) {
        trim(jobs, retention.keep_completed, |j| {
            j.status == JobStatus::Completed
        });
        trim(jobs, retention.keep_failed, |j| {
            matches!(j.status, JobStatus::Failed { .. })
        });
    }
}

fn trim<F>(jobs: &mut HashMap<JobId, Job>, keep: usize, matches: F)
where
    F: Fn(&Job) -> bool,
{
    let mut terminal: Vec<(JobId, chrono::DateTime<chrono::Utc>)> = jobs
        .values()
        .filter(|j| matches(j))
        .map(|j| (j.id, j.updated_at))
        .collect();
    if terminal.len() <= keep {
        return;
    }
    terminal.sort_by_key(|(_, updated_at)| *updated_at);
    let excess = terminal.len() - keep;
    for (id, _) in terminal.into_iter().take(excess) {
        jobs.remove(&id);
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.lock_write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.lock_read()?.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.lock_write()?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        if job.status.is_terminal() {
            Self::apply_retention(&mut jobs, self.retention);
        }
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.lock_write()?;

        // Oldest ready job wins (FIFO). Claiming happens under the write
        // lock, so no two workers can claim the same attempt.
        let next = jobs
            .values()
            .filter(|j| j.is_ready())
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        if let Some(id) = next {
            if let Some(job) = jobs.get_mut(&id) {
                job.mark_active();
                return Ok(Some(job.clone()));
            }
        }
        Ok(None)
    }

    fn status(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.lock_read()?;
        let mut stats = JobStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    fn list_failed(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.lock_read()?;
        let mut failed: Vec<Job> = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Failed { .. }))
            .cloned()
            .collect();
        failed.sort_by_key(|j| j.updated_at);
        failed.truncate(limit);
        Ok(failed)
    }

    fn drain(&self) -> Result<(), JobStoreError> {
        self.lock_write()?.clear();
        Ok(())
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn status(&self) -> Result<JobStats, JobStoreError> {
        (**self).status()
    }

    fn list_failed(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_failed(limit)
    }

    fn drain(&self) -> Result<(), JobStoreError> {
        (**self).drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    fn job(kind: JobKind) -> Job {
        Job::new(kind, serde_json::json!({}))
    }

    #[test]
    fn enqueue_and_claim_is_fifo() {
        let store = InMemoryJobStore::new();
        let first = store.enqueue(job(JobKind::SendNotification)).unwrap();
        let second = store.enqueue(job(JobKind::SendVerification)).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Active);
        assert_eq!(claimed.attempt, 1);

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, second);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn backoff_deadline_keeps_job_unclaimable() {
        let store = InMemoryJobStore::new();
        let mut j = job(JobKind::SendNotification);
        j.scheduled_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
        store.enqueue(j).unwrap();

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn status_counts_by_state() {
        let store = InMemoryJobStore::new();
        for _ in 0..3 {
            store.enqueue(job(JobKind::SendNotification)).unwrap();
        }
        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_completed();
        store.update(&claimed).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_permanent_failure("boom".to_string());
        store.update(&claimed).unwrap();

        let stats = store.status().unwrap();
        assert_eq!(
            stats,
            JobStats {
                waiting: 1,
                active: 0,
                completed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn retention_trims_oldest_terminal_jobs() {
        let store = InMemoryJobStore::with_retention(RetentionPolicy {
            keep_completed: 2,
            keep_failed: 1,
        });

        for _ in 0..4 {
            store.enqueue(job(JobKind::SendNotification)).unwrap();
            let mut claimed = store.claim_next().unwrap().unwrap();
            claimed.mark_completed();
            store.update(&claimed).unwrap();
        }
        for _ in 0..3 {
            store.enqueue(job(JobKind::SendVerification)).unwrap();
            let mut claimed = store.claim_next().unwrap().unwrap();
            claimed.mark_permanent_failure("boom".to_string());
            store.update(&claimed).unwrap();
        }

        let stats = store.status().unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn drain_clears_everything() {
        let store = InMemoryJobStore::new();
        store.enqueue(job(JobKind::SendNotification)).unwrap();
        store.enqueue(job(JobKind::ProcessSubscribe)).unwrap();
        store.drain().unwrap();
        assert_eq!(store.status().unwrap(), JobStats::default());
    }

    #[test]
    fn failed_jobs_are_listable_for_reporting() {
        let store = InMemoryJobStore::new();
        store.enqueue(job(JobKind::SendExpiryNotice)).unwrap();
        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_permanent_failure("mail bounced".to_string());
        store.update(&claimed).unwrap();

        let failed = store.list_failed(10).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            &failed[0].status,
            JobStatus::Failed { error, .. } if error == "mail bounced"
        ));
    }
}

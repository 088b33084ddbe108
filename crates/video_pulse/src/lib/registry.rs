//! Process-wide job registry and per-job event publisher.
//!
//! Every job owns a bounded broadcast channel. Updates are applied and sent
//! while the job's lock is held, so a subscriber that takes a snapshot and a
//! receiver together sees every later update exactly once and in order.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use job_datastore::VideoMetadata;
use tokio::sync::broadcast;

use crate::job::{Job, JobError, JobId, JobOutput, JobStatus, JobUpdate, ProgressMessage};

struct JobEntry {
    job: Mutex<Job>,
    sender: broadcast::Sender<ProgressMessage>,
}

impl JobEntry {
    fn publish(&self, update: JobUpdate) -> Result<(), JobError> {
        let mut job = lock(&self.job);
        if job.apply(update)? {
            // Ignore errors - no active receivers is fine
            let _ = self.sender.send(job.snapshot());
        }
        Ok(())
    }
}

/// Live view handed to a new push channel subscriber.
pub struct JobSubscription {
    /// State of the job at the moment of subscribing
    pub snapshot: ProgressMessage,
    /// Every update published after `snapshot`
    pub receiver: broadcast::Receiver<ProgressMessage>,
}

/// In-memory store of jobs keyed by id.
///
/// Created once at process start and shared behind an `Arc`; finished jobs
/// are dropped by [`JobRegistry::evict_expired`] once older than the
/// retention window.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    retention: Duration,
    channel_capacity: usize,
}

impl JobRegistry {
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

    pub fn new(retention: Duration) -> Self {
        JobRegistry {
            jobs: RwLock::new(HashMap::new()),
            retention,
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Registers a new `pending` job and returns its single write handle.
    pub fn create(&self, url: impl Into<String>) -> JobHandle {
        let job = Job::new(url);
        let id = job.id.clone();
        let (sender, _) = broadcast::channel(self.channel_capacity);
        let entry = Arc::new(JobEntry {
            job: Mutex::new(job),
            sender,
        });

        self.write().insert(id.clone(), Arc::clone(&entry));
        tracing::debug!(job_id = %id, "Registered job");

        JobHandle { id, entry }
    }

    fn entry(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.read().get(id).cloned()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        let entry = self.entry(id)?;
        let job = lock(&entry.job).clone();
        Some(job)
    }

    pub fn snapshot(&self, id: &JobId) -> Option<ProgressMessage> {
        let entry = self.entry(id)?;
        let snapshot = lock(&entry.job).snapshot();
        Some(snapshot)
    }

    /// Subscribes to a job's updates, replaying its current state first.
    pub fn subscribe(&self, id: &JobId) -> Option<JobSubscription> {
        let entry = self.entry(id)?;
        let job = lock(&entry.job);

        Some(JobSubscription {
            snapshot: job.snapshot(),
            receiver: entry.sender.subscribe(),
        })
    }

    /// Jobs that have not reached a terminal status yet, oldest first.
    pub fn active_jobs(&self) -> Vec<Job> {
        let mut jobs = self
            .read()
            .values()
            .map(|entry| lock(&entry.job).clone())
            .filter(|job| !job.status.is_terminal())
            .collect::<Vec<_>>();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops finished jobs created more than the retention window before `now`.
    ///
    /// Jobs still running are kept regardless of age.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.write();
        let before = jobs.len();

        jobs.retain(|_, entry| {
            let job = lock(&entry.job);
            !(job.status.is_terminal() && now - job.created_at > retention)
        });

        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::info!(evicted, "Cleaned up expired jobs");
        }
        evicted
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETENTION)
    }
}

fn lock(job: &Mutex<Job>) -> MutexGuard<'_, Job> {
    job.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Job record lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Exclusive write access to one job.
///
/// Not `Clone`: the pipeline that owns the handle is the only writer. The
/// terminal transitions consume it, leaving the record read-only. Dropping
/// a handle before either of them fails the job, so no job is left
/// running without a writer.
pub struct JobHandle {
    id: JobId,
    entry: Arc<JobEntry>,
}

impl JobHandle {
    pub const ABANDONED: &'static str = "Job abandoned before finishing";

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn snapshot(&self) -> ProgressMessage {
        lock(&self.entry.job).snapshot()
    }

    pub fn job(&self) -> Job {
        lock(&self.entry.job).clone()
    }

    /// Moves the job to `status` with progress reset to zero.
    pub fn set_status(&self, status: JobStatus, detail: impl Into<String>) -> Result<(), JobError> {
        self.entry.publish(JobUpdate::Status {
            status,
            progress: 0,
            detail: detail.into(),
        })
    }

    pub fn report_progress(&self, progress: u8, detail: impl Into<String>) -> Result<(), JobError> {
        self.entry.publish(JobUpdate::Progress {
            progress,
            detail: detail.into(),
        })
    }

    pub fn set_metadata(&self, metadata: VideoMetadata) -> Result<(), JobError> {
        self.entry.publish(JobUpdate::Metadata(metadata))
    }

    pub fn complete(self, output: JobOutput) -> Result<(), JobError> {
        self.entry.publish(JobUpdate::Completed(output))
    }

    pub fn fail(self, error: impl Into<String>) -> Result<(), JobError> {
        self.entry.publish(JobUpdate::Failed(error.into()))
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        let status = lock(&self.entry.job).status;
        if status.is_terminal() {
            return;
        }

        tracing::warn!(job_id = %self.id, ?status, "Job handle dropped before finishing");
        if let Err(e) = self.entry.publish(JobUpdate::Failed(Self::ABANDONED.into())) {
            tracing::error!(job_id = %self.id, error = %e, "Failed to mark abandoned job as failed");
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_create_registers_pending_job() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");

        let job = registry.get(handle.id()).expect("job registered");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.url, "https://youtu.be/abc");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_job_has_no_subscription() {
        let registry = JobRegistry::default();
        assert!(registry.subscribe(&JobId::from("nope")).is_none());
        assert!(registry.get(&JobId::from("nope")).is_none());
    }

    #[test]
    fn test_late_subscriber_receives_current_snapshot() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        handle
            .set_status(JobStatus::Transcribing, "Transcribing...")
            .unwrap();
        handle.report_progress(42, "Transcribing... (5/12 chunks)").unwrap();

        let sub = registry.subscribe(handle.id()).unwrap();
        assert_eq!(sub.snapshot.status, JobStatus::Transcribing);
        assert_eq!(sub.snapshot.progress, 42);
        assert_eq!(sub.snapshot.stage_detail, "Transcribing... (5/12 chunks)");
    }

    #[test]
    fn test_every_subscriber_gets_updates_after_snapshot() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        handle.set_status(JobStatus::Downloading, "Downloading audio...").unwrap();

        let mut first = registry.subscribe(handle.id()).unwrap();
        let mut second = registry.subscribe(handle.id()).unwrap();

        handle.report_progress(10, "Downloading audio... 10%").unwrap();

        for sub in [&mut first, &mut second] {
            let msg = sub.receiver.try_recv().unwrap();
            assert_eq!(msg.progress, 10);
            assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[test]
    fn test_duplicate_updates_are_not_published() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        handle.set_status(JobStatus::Downloading, "Downloading audio...").unwrap();
        let mut sub = registry.subscribe(handle.id()).unwrap();

        handle.report_progress(7, "Downloading audio... 7%").unwrap();
        handle.report_progress(7, "Downloading audio... 7%").unwrap();

        assert_eq!(sub.receiver.try_recv().unwrap().progress, 7);
        assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_nothing_published_after_terminal_status() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        let id = handle.id().clone();
        handle.set_status(JobStatus::Summarizing, "Generating summary...").unwrap();
        let mut sub = registry.subscribe(&id).unwrap();

        handle.fail("summarizer exhausted").unwrap();
        let msg = sub.receiver.try_recv().unwrap();
        assert_eq!(msg.status, JobStatus::Failed);

        // the handle is gone; the record itself also refuses mutation
        let entry = registry.entry(&id).unwrap();
        let result = entry.publish(JobUpdate::Progress {
            progress: 99,
            detail: "late".into(),
        });
        assert_eq!(result, Err(JobError::Terminal(id.clone(), JobStatus::Failed)));
        assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(registry.snapshot(&id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_publishing_without_subscribers_is_fine() {
        let registry = JobRegistry::default().with_channel_capacity(1);
        let handle = registry.create("https://youtu.be/abc");
        handle.set_status(JobStatus::Downloading, "Downloading audio...").unwrap();
        for pct in 1..=100 {
            handle.report_progress(pct, format!("{pct}%")).unwrap();
        }
        assert_eq!(handle.snapshot().progress, 100);
    }

    #[test]
    fn test_slow_subscriber_lags_instead_of_blocking() {
        let registry = JobRegistry::default().with_channel_capacity(2);
        let handle = registry.create("https://youtu.be/abc");
        handle.set_status(JobStatus::Downloading, "Downloading audio...").unwrap();
        let mut sub = registry.subscribe(handle.id()).unwrap();

        for pct in 1..=10 {
            handle.report_progress(pct, format!("{pct}%")).unwrap();
        }

        assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Lagged(_))));
        assert_eq!(registry.snapshot(handle.id()).unwrap().progress, 10);
    }

    #[test]
    fn test_evicts_only_expired_finished_jobs() {
        let registry = JobRegistry::new(Duration::from_secs(60));

        let finished = registry.create("https://youtu.be/done");
        let finished_id = finished.id().clone();
        finished.fail("boom").unwrap();

        let running = registry.create("https://youtu.be/running");
        running.set_status(JobStatus::Downloading, "Downloading audio...").unwrap();

        assert_eq!(registry.evict_expired(Utc::now()), 0);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(registry.evict_expired(later), 1);
        assert!(registry.get(&finished_id).is_none());
        assert!(registry.get(running.id()).is_some());
    }

    #[test]
    fn test_dropped_handle_fails_the_job() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        let id = handle.id().clone();
        handle.set_status(JobStatus::FetchingMetadata, "Fetching video info...").unwrap();
        let mut sub = registry.subscribe(&id).unwrap();

        drop(handle);

        let msg = sub.receiver.try_recv().unwrap();
        assert_eq!(msg.status, JobStatus::Failed);
        assert_eq!(msg.error.as_deref(), Some(JobHandle::ABANDONED));
        assert!(registry.active_jobs().is_empty());
    }

    #[test]
    fn test_finished_handle_drops_quietly() {
        let registry = JobRegistry::default();
        let handle = registry.create("https://youtu.be/abc");
        let id = handle.id().clone();
        let mut sub = registry.subscribe(&id).unwrap();

        handle.fail("Failed to fetch metadata: Video unavailable").unwrap();

        let msg = sub.receiver.try_recv().unwrap();
        assert_eq!(msg.error.as_deref(), Some("Failed to fetch metadata: Video unavailable"));
        assert!(matches!(sub.receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_active_jobs_excludes_finished() {
        let registry = JobRegistry::default();
        let done = registry.create("https://youtu.be/done");
        done.fail("boom").unwrap();
        let running = registry.create("https://youtu.be/running");

        let active = registry.active_jobs();
        assert_eq!(active.len(), 1);
        assert_eq!(&active[0].id, running.id());
    }
}

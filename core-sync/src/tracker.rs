//! # Job Tracker
//!
//! Creates, updates and reports conversion jobs on top of a [`JobStore`].
//!
//! Mutations are read-modify-write sequences and are serialized by the
//! tracker so that concurrent runs never lose each other's updates. When an
//! [`EventBus`] is attached, every state change is also published as a
//! [`JobEvent`].

use crate::job::{Job, JobId, JobStatus, JobUpdate};
use crate::pipeline::ConversionRequest;
use crate::store::JobStore;
use crate::{Result, SyncError};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, JobEvent};
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Jobs returned by [`JobTracker::list_for_user`] when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Age after which [`JobTracker::cleanup_older_than`] drops jobs by default.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

pub struct JobTracker {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    write_lock: Mutex<()>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            event_bus: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a pending job for `user_id`.
    #[instrument(skip(self, params), fields(kind = %params.query.mode))]
    pub async fn create(&self, user_id: &str, params: ConversionRequest) -> Result<JobId> {
        let job = Job::new(user_id, params, self.clock.now());
        let job_id = job.id;

        {
            let _guard = self.write_lock.lock().await;
            self.store.insert(&job).await?;
        }

        info!(job_id = %job_id, "Created job");
        self.emit(JobEvent::Created {
            job_id: job_id.as_str(),
            user_id: job.user_id.clone(),
            kind: job.kind.as_str().to_string(),
        });
        Ok(job_id)
    }

    /// Apply `update` to a job and return the new snapshot.
    ///
    /// # Errors
    ///
    /// - `JobNotFound` if no such job exists
    /// - `InvalidStateTransition` if the job is terminal or the status
    ///   change is not allowed
    pub async fn update(&self, job_id: &JobId, update: JobUpdate) -> Result<Job> {
        let recoverable = update.recoverable;
        let job = {
            let _guard = self.write_lock.lock().await;
            let mut job = self.load(job_id).await?;
            job.apply(update, self.clock.now())?;
            self.store.update(&job).await?;
            job
        };

        debug!(
            job_id = %job_id,
            status = %job.status,
            progress = job.progress,
            "Job updated"
        );
        self.emit_state(&job, recoverable);
        Ok(job)
    }

    /// Current snapshot of a job.
    pub async fn get(&self, job_id: &JobId) -> Result<Job> {
        self.load(job_id).await
    }

    /// Most recent jobs of a user, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Job>> {
        self.store.find_by_user(user_id, limit).await
    }

    /// Remove jobs created more than `days` days ago.
    #[instrument(skip(self))]
    pub async fn cleanup_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = self.clock.now() - chrono::Duration::days(i64::from(days));
        let removed = {
            let _guard = self.write_lock.lock().await;
            self.store.delete_created_before(cutoff).await?
        };
        if removed > 0 {
            info!(removed, "Removed old jobs");
        }
        Ok(removed)
    }

    /// Snapshot stream of one job, one item per `interval`.
    ///
    /// The first snapshot is emitted immediately. The stream ends right after
    /// yielding a terminal snapshot, or after yielding an error.
    pub fn watch(
        self: &Arc<Self>,
        job_id: JobId,
        interval: Duration,
    ) -> impl Stream<Item = Result<Job>> + Send + 'static {
        let period = interval.max(Duration::from_millis(1));

        // The ticker is created on first poll so the stream can be built
        // outside a runtime.
        stream::unfold(
            Some((Arc::clone(self), job_id, None::<Interval>)),
            move |state| async move {
                let (tracker, job_id, ticker) = state?;
                let mut ticker = ticker.unwrap_or_else(|| {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker
                });

                ticker.tick().await;
                match tracker.get(&job_id).await {
                    Ok(job) if job.status.is_terminal() => Some((Ok(job), None)),
                    Ok(job) => Some((Ok(job), Some((tracker, job_id, Some(ticker))))),
                    Err(e) => Some((Err(e), None)),
                }
            },
        )
    }

    async fn load(&self, job_id: &JobId) -> Result<Job> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.as_str(),
            })
    }

    fn emit_state(&self, job: &Job, recoverable: bool) {
        let job_id = job.id.as_str();
        let event = match job.status {
            JobStatus::Pending => return,
            JobStatus::Running => JobEvent::Progress {
                job_id,
                percent: job.progress,
                message: job.message.clone(),
            },
            JobStatus::Completed => match &job.result {
                Some(result) => JobEvent::Completed {
                    job_id,
                    playlist_url: result.playlist.url.clone(),
                    matched_count: result.matched_count,
                    total_source_records: result.total_source_records,
                    match_rate: result.match_rate,
                },
                None => {
                    warn!(job_id = %job.id, "Completed job has no result");
                    return;
                }
            },
            JobStatus::Failed => JobEvent::Failed {
                job_id,
                message: job.error.clone().unwrap_or_else(|| job.message.clone()),
                recoverable,
            },
        };
        self.emit(event);
    }

    fn emit(&self, event: JobEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Job(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryJobStore, JsonFileJobStore};
    use bridge_traits::catalog::{ListeningMode, SourceQuery};
    use bridge_traits::time::FixedClock;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    fn request() -> ConversionRequest {
        ConversionRequest::new(SourceQuery::new("rj", ListeningMode::Recent), 25)
    }

    fn tracker_with_clock() -> (Arc<JobTracker>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = JobTracker::new(Arc::new(InMemoryJobStore::new())).with_clock(clock.clone());
        (Arc::new(tracker), clock)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jobs_all_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_status.json");
        let fs: Arc<dyn bridge_traits::storage::FileSystemAccess> = Arc::new(
            bridge_desktop::TokioFileSystem::with_data_directory(dir.path().to_path_buf()),
        );
        let store = JsonFileJobStore::open(fs.clone(), &path).await.unwrap();
        let tracker = Arc::new(JobTracker::new(Arc::new(store)));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let job_id = tracker.create("rj", request()).await.unwrap();
                    tracker
                        .update(&job_id, JobUpdate::running(40, format!("step {}", i)))
                        .await
                        .unwrap();
                    if i % 2 == 0 {
                        let reason = SyncError::InvalidRequest(format!("job {}", i));
                        tracker.update(&job_id, JobUpdate::failed(&reason)).await.unwrap();
                    }
                    (i, job_id)
                })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap());
        }

        let reopened = JsonFileJobStore::open(fs, &path).await.unwrap();
        assert_eq!(reopened.find_by_user("rj", 100).await.unwrap().len(), 16);
        for (i, job_id) in created {
            let job = reopened.find_by_id(&job_id).await.unwrap().unwrap();
            if i % 2 == 0 {
                assert_eq!(job.status, JobStatus::Failed);
                assert_eq!(job.error.as_deref(), Some(format!("Invalid request: job {}", i).as_str()));
            } else {
                assert_eq!(job.status, JobStatus::Running);
                assert_eq!(job.message, format!("step {}", i));
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (tracker, _) = tracker_with_clock();
        let job_id = tracker.create("rj", request()).await.unwrap();

        let job = tracker.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.message, "Initializing...");
        assert_eq!(job.kind, ListeningMode::Recent);
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let (tracker, _) = tracker_with_clock();
        let err = tracker.get(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let (tracker, clock) = tracker_with_clock();
        let job_id = tracker.create("rj", request()).await.unwrap();

        clock.advance(chrono::Duration::seconds(30));
        let job = tracker
            .update(&job_id, JobUpdate::running(20, "Fetched 25 tracks"))
            .await
            .unwrap();

        assert_eq!(job.progress, 20);
        assert_eq!(job.updated_at - job.created_at, chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_update_rejected_after_terminal_state() {
        let (tracker, _) = tracker_with_clock();
        let job_id = tracker.create("rj", request()).await.unwrap();
        tracker
            .update(&job_id, JobUpdate::failed(&SyncError::NotFound("rj".into())))
            .await
            .unwrap();

        let err = tracker
            .update(&job_id, JobUpdate::running(50, "again"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
        assert_eq!(tracker.get(&job_id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cleanup_older_than() {
        let (tracker, clock) = tracker_with_clock();
        let old = tracker.create("rj", request()).await.unwrap();

        clock.advance(chrono::Duration::days(31));
        let fresh = tracker.create("rj", request()).await.unwrap();

        assert_eq!(tracker.cleanup_older_than(30).await.unwrap(), 1);
        assert!(tracker.get(&old).await.is_err());
        assert!(tracker.get(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_for_user() {
        let (tracker, clock) = tracker_with_clock();
        let first = tracker.create("rj", request()).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        let second = tracker.create("rj", request()).await.unwrap();

        let jobs = tracker.list_for_user("rj", DEFAULT_LIST_LIMIT).await.unwrap();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let tracker = JobTracker::new(Arc::new(InMemoryJobStore::new())).with_event_bus(bus);

        let job_id = tracker.create("rj", request()).await.unwrap();
        tracker
            .update(&job_id, JobUpdate::running(40, "Searching"))
            .await
            .unwrap();
        tracker
            .update(
                &job_id,
                JobUpdate::failed(&SyncError::Transient("timeout".into())),
            )
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Job(JobEvent::Created { .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Job(JobEvent::Progress { percent: 40, .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Job(JobEvent::Failed {
                recoverable: true,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_after_terminal_snapshot() {
        let (tracker, _) = tracker_with_clock();
        let job_id = tracker.create("rj", request()).await.unwrap();

        let updater = Arc::clone(&tracker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            updater
                .update(&job_id, JobUpdate::running(50, "Searching"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            updater
                .update(&job_id, JobUpdate::failed(&SyncError::NoMatches { total: 2 }))
                .await
                .unwrap();
        });

        let snapshots: Vec<Job> = tracker
            .watch(job_id, DEFAULT_WATCH_INTERVAL)
            .map(|item| item.unwrap())
            .collect()
            .await;

        let statuses: Vec<JobStatus> = snapshots.iter().map(|job| job.status).collect();
        assert_eq!(statuses.first(), Some(&JobStatus::Pending));
        assert_eq!(statuses.last(), Some(&JobStatus::Failed));
        assert!(statuses.contains(&JobStatus::Running));
        assert_eq!(
            statuses.iter().filter(|s| s.is_terminal()).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_watch_unknown_job_yields_error() {
        let (tracker, _) = tracker_with_clock();
        let items: Vec<Result<Job>> = tracker
            .watch(JobId::new(), Duration::from_millis(10))
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}

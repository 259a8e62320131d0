//! # Job Store
//!
//! Persistence for conversion jobs.
//!
//! Two implementations are provided:
//! - [`InMemoryJobStore`]: process-local, used by tests and one-shot runs
//! - [`JsonFileJobStore`]: a flat `{job_id: job}` JSON object rewritten
//!   atomically after every mutation and reloaded at start-up
//!
//! Both serialize access behind an async mutex.

use crate::job::{Job, JobId};
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type JobMap = BTreeMap<String, Job>;

/// Storage backend for the job tracker.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    ///
    /// # Errors
    ///
    /// Returns an error if a job with the same ID already exists or the
    /// store cannot be written
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Replace an existing job
    ///
    /// # Errors
    ///
    /// Returns `JobNotFound` if the job does not exist
    async fn update(&self, job: &Job) -> Result<()>;

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Jobs of `user_id`, newest first, at most `limit`
    async fn find_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Job>>;

    /// Delete jobs created strictly before `cutoff`; returns how many went
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

fn insert_into(jobs: &mut JobMap, job: &Job) -> Result<()> {
    let key = job.id.as_str();
    if jobs.contains_key(&key) {
        return Err(SyncError::Storage(format!("Job {} already exists", key)));
    }
    jobs.insert(key, job.clone());
    Ok(())
}

fn update_in(jobs: &mut JobMap, job: &Job) -> Result<()> {
    match jobs.get_mut(&job.id.as_str()) {
        Some(slot) => {
            *slot = job.clone();
            Ok(())
        }
        None => Err(SyncError::JobNotFound {
            job_id: job.id.as_str(),
        }),
    }
}

fn newest_for_user(jobs: &JobMap, user_id: &str, limit: usize) -> Vec<Job> {
    let mut found: Vec<Job> = jobs
        .values()
        .filter(|job| job.user_id == user_id)
        .cloned()
        .collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    found.truncate(limit);
    found
}

fn retain_since(jobs: &mut JobMap, cutoff: DateTime<Utc>) -> usize {
    let before = jobs.len();
    jobs.retain(|_, job| job.created_at >= cutoff);
    before - jobs.len()
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<JobMap>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        insert_into(&mut *self.jobs.lock().await, job)
    }

    async fn update(&self, job: &Job) -> Result<()> {
        update_in(&mut *self.jobs.lock().await, job)
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.get(&id.as_str()).cloned())
    }

    async fn find_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Job>> {
        Ok(newest_for_user(&*self.jobs.lock().await, user_id, limit))
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(retain_since(&mut *self.jobs.lock().await, cutoff))
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Job store backed by a single JSON file.
///
/// Every mutation is written to disk before it becomes visible to readers;
/// a failed write leaves the store unchanged.
pub struct JsonFileJobStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    jobs: Mutex<JobMap>,
}

impl JsonFileJobStore {
    /// Open the store, loading any jobs already on disk.
    ///
    /// A missing file starts an empty store. A file that does not parse is
    /// logged and replaced by an empty collection.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the file exists but cannot be read, or the empty
    /// replacement cannot be written.
    pub async fn open(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = Self {
            jobs: Mutex::new(JobMap::new()),
            fs,
            path,
        };

        let loaded = store.load().await?;
        match loaded {
            Some(jobs) => {
                info!(path = %store.path.display(), jobs = jobs.len(), "Loaded job store");
                *store.jobs.lock().await = jobs;
            }
            None => {
                let jobs = store.jobs.lock().await;
                store.persist(&jobs).await?;
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Some` with the stored jobs, or `None` when the file was corrupt.
    async fn load(&self) -> Result<Option<JobMap>> {
        let exists = self
            .fs
            .exists(&self.path)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        if !exists {
            debug!(path = %self.path.display(), "No job file yet");
            return Ok(Some(JobMap::new()));
        }

        let data = self
            .fs
            .read_file(&self.path)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        match serde_json::from_slice::<JobMap>(&data) {
            Ok(jobs) => Ok(Some(jobs)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Job file is corrupt, starting with an empty job list"
                );
                Ok(None)
            }
        }
    }

    async fn persist(&self, jobs: &JobMap) -> Result<()> {
        let json = serde_json::to_vec_pretty(jobs)
            .map_err(|e| SyncError::Storage(format!("Failed to serialize jobs: {}", e)))?;
        self.fs
            .write_file_atomic(&self.path, Bytes::from(json))
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let mut next = jobs.clone();
        insert_into(&mut next, job)?;
        self.persist(&next).await?;
        *jobs = next;
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let mut next = jobs.clone();
        update_in(&mut next, job)?;
        self.persist(&next).await?;
        *jobs = next;
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.lock().await.get(&id.as_str()).cloned())
    }

    async fn find_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Job>> {
        Ok(newest_for_user(&*self.jobs.lock().await, user_id, limit))
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;
        let mut next = jobs.clone();
        let removed = retain_since(&mut next, cutoff);
        if removed > 0 {
            self.persist(&next).await?;
            *jobs = next;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ConversionRequest;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::catalog::{ListeningMode, SourceQuery};
    use bridge_traits::BridgeError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn job_at(user: &str, day: u32) -> Job {
        let request = ConversionRequest::new(SourceQuery::new(user, ListeningMode::Top), 10);
        Job::new(user, request, Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap())
    }

    fn desktop_fs(dir: &Path) -> Arc<dyn FileSystemAccess> {
        Arc::new(TokioFileSystem::with_data_directory(dir.to_path_buf()))
    }

    /// Disk access that can be switched into a read-only failure mode.
    struct FailingWrites {
        inner: TokioFileSystem,
        fail: AtomicBool,
    }

    #[async_trait]
    impl FileSystemAccess for FailingWrites {
        async fn exists(&self, path: &Path) -> bridge_traits::error::Result<bool> {
            self.inner.exists(path).await
        }

        async fn read_file(&self, path: &Path) -> bridge_traits::error::Result<Bytes> {
            self.inner.read_file(path).await
        }

        async fn write_file(&self, path: &Path, data: Bytes) -> bridge_traits::error::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::OperationFailed("disk full".into()));
            }
            self.inner.write_file(path, data).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> bridge_traits::error::Result<()> {
            self.inner.rename(from, to).await
        }

        async fn delete_file(&self, path: &Path) -> bridge_traits::error::Result<()> {
            self.inner.delete_file(path).await
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let store = InMemoryJobStore::new();
        let job = job_at("rj", 1);

        store.insert(&job).await.unwrap();

        assert_eq!(store.find_by_id(&job.id).await.unwrap(), Some(job.clone()));
        assert!(store.insert(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let store = InMemoryJobStore::new();
        let err = store.update(&job_at("rj", 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_by_user_newest_first() {
        let store = InMemoryJobStore::new();
        for day in [3, 1, 2] {
            store.insert(&job_at("rj", day)).await.unwrap();
        }
        store.insert(&job_at("someone-else", 4)).await.unwrap();

        let jobs = store.find_by_user("rj", 2).await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].created_at.format("%d").to_string(), "03");
        assert_eq!(jobs[1].created_at.format("%d").to_string(), "02");
    }

    #[tokio::test]
    async fn test_delete_created_before() {
        let store = InMemoryJobStore::new();
        for day in 1..=4 {
            store.insert(&job_at("rj", day)).await.unwrap();
        }

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap();
        let removed = store.delete_created_before(cutoff).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.find_by_user("rj", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_json_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_status.json");
        let job = job_at("rj", 1);

        {
            let store = JsonFileJobStore::open(desktop_fs(dir.path()), &path)
                .await
                .unwrap();
            store.insert(&job).await.unwrap();
        }

        let reopened = JsonFileJobStore::open(desktop_fs(dir.path()), &path)
            .await
            .unwrap();
        assert_eq!(reopened.find_by_id(&job.id).await.unwrap(), Some(job.clone()));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[job.id.as_str()]["user_id"], "rj");
    }

    #[tokio::test]
    async fn test_json_store_keeps_memory_in_step_with_disk_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_status.json");
        let fs = Arc::new(FailingWrites {
            inner: TokioFileSystem::with_data_directory(dir.path().to_path_buf()),
            fail: AtomicBool::new(false),
        });
        let store = JsonFileJobStore::open(fs.clone(), &path).await.unwrap();
        let job = job_at("rj", 1);
        store.insert(&job).await.unwrap();

        fs.fail.store(true, Ordering::SeqCst);
        let mut changed = job.clone();
        changed.message = "Fetching tracks".into();
        assert!(store.update(&changed).await.is_err());
        let late = job_at("rj", 2);
        assert!(store.insert(&late).await.is_err());
        let cutoff = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert!(store.delete_created_before(cutoff).await.is_err());

        assert_eq!(store.find_by_id(&job.id).await.unwrap(), Some(job.clone()));
        assert_eq!(store.find_by_id(&late.id).await.unwrap(), None);

        let reopened = JsonFileJobStore::open(desktop_fs(dir.path()), &path)
            .await
            .unwrap();
        assert_eq!(reopened.find_by_user("rj", 10).await.unwrap(), vec![job]);
    }

    #[tokio::test]
    async fn test_json_store_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_status.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileJobStore::open(desktop_fs(dir.path()), &path)
            .await
            .unwrap();

        assert!(store.find_by_user("rj", 10).await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }
}

//! # Conversion Job State Machine
//!
//! Tracks one end-to-end conversion run so that callers can poll it.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! A pending job may fail directly when the run never starts (for example
//! when the destination credential cannot be refreshed). Terminal jobs never
//! change again.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{Job, JobUpdate};
//!
//! let mut job = Job::new("rj", request, now);
//! job.apply(JobUpdate::running(20, "Fetched 50 tracks"), now)?;
//! job.apply(JobUpdate::completed(result), now)?;
//! assert!(job.status.is_terminal());
//! ```

use crate::pipeline::{ConversionRequest, ConversionResult};
use crate::{Result, SyncError};
use bridge_traits::catalog::ListeningMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Message of a freshly created job.
pub const INITIAL_MESSAGE: &str = "Initializing...";

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s.trim()).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has been created but not yet started
    Pending,
    /// Job is currently running
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn can_become(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Pending, JobStatus::Pending) => true,
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,

            (JobStatus::Running, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Updates
// ============================================================================

/// A partial job update. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<ConversionResult>,
    /// Only used for the failure event; not persisted.
    pub recoverable: bool,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_result(mut self, result: ConversionResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Progress checkpoint of a running job.
    pub fn running(percent: u8, message: impl Into<String>) -> Self {
        Self::new()
            .with_status(JobStatus::Running)
            .with_progress(percent)
            .with_message(message)
    }

    pub fn completed(result: ConversionResult) -> Self {
        let message = format!(
            "Playlist '{}' ready with {} tracks",
            result.playlist.name, result.added_count
        );
        Self::new()
            .with_status(JobStatus::Completed)
            .with_progress(100)
            .with_message(message)
            .with_result(result)
    }

    pub fn failed(error: &SyncError) -> Self {
        let mut update = Self::new()
            .with_status(JobStatus::Failed)
            .with_message("Failed")
            .with_error(error.to_string());
        update.recoverable = error.is_retryable();
        update
    }
}

// ============================================================================
// Job Entity
// ============================================================================

/// A conversion job as stored by the job tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Source account the job converts
    pub user_id: String,
    pub kind: ListeningMode,
    pub params: ConversionRequest,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub message: String,
    pub result: Option<ConversionResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in pending state
    pub fn new(user_id: impl Into<String>, params: ConversionRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            kind: params.query.mode,
            params,
            status: JobStatus::Pending,
            progress: 0,
            message: INITIAL_MESSAGE.to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update and refresh `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the job is terminal or the
    /// requested status is not reachable from the current one. The job is
    /// left untouched in that case.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<()> {
        let to = update.status.unwrap_or(self.status);
        self.validate_transition(to)?;

        self.status = to;
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Validate a state transition
    fn validate_transition(&self, to: JobStatus) -> Result<()> {
        if self.status.can_become(to) {
            return Ok(());
        }

        let reason = if self.status.is_terminal() {
            format!("Job is already {}", self.status)
        } else {
            format!("Cannot transition from {} to {}", self.status, to)
        };

        Err(SyncError::InvalidStateTransition {
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
            reason,
        })
    }
}

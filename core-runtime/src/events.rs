//! # Events
//!
//! Broadcast channel for job and credential notifications.
//!
//! The job tracker publishes [`JobEvent`]s and the credential flow publishes
//! [`AuthEvent`]s. Front-ends subscribe to render live progress without
//! polling. Publishing with no subscribers is not an error for publishers;
//! they ignore the `SendError`.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, JobEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut events = bus.subscribe();
//!
//! bus.emit(CoreEvent::Job(JobEvent::Progress {
//!     job_id: "job-1".to_string(),
//!     percent: 20,
//!     message: "Fetched 50 tracks".to_string(),
//! }))
//! .ok();
//!
//! let received = events.recv().await.unwrap();
//! assert_eq!(received.job_id(), Some("job-1"));
//! # }
//! ```
//!
//! A subscriber that falls more than the channel capacity behind receives
//! `RecvError::Lagged(n)` once and then continues with newer events.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Credential events
    Auth(AuthEvent),
    /// Conversion job events
    Job(JobEvent),
}

impl CoreEvent {
    /// Job the event belongs to, for job events.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Job(event) => Some(event.job_id()),
            CoreEvent::Auth(_) => None,
        }
    }
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the destination-account credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Authorization code exchanged for tokens.
    SignedIn {
        /// Destination account id, when known.
        user_id: Option<String>,
    },
    /// Access token refreshed.
    TokenRefreshed {
        /// Expiry of the new token (Unix epoch seconds).
        expires_at: i64,
    },
    /// Authentication error occurred.
    AuthError {
        message: String,
        /// Whether retrying could succeed (false means sign in again).
        recoverable: bool,
    },
}

// ============================================================================
// Job Events
// ============================================================================

/// Lifecycle of a conversion job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum JobEvent {
    Created {
        job_id: String,
        user_id: String,
        /// Listening mode the job converts (top/recent/loved)
        kind: String,
    },
    Progress {
        job_id: String,
        /// 0-100
        percent: u8,
        message: String,
    },
    Completed {
        job_id: String,
        playlist_url: String,
        matched_count: usize,
        total_source_records: usize,
        match_rate: f64,
    },
    Failed {
        job_id: String,
        message: String,
        /// Whether the same run could succeed if retried.
        recoverable: bool,
    },
}

impl JobEvent {
    /// Completed and Failed are the last event of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Created { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

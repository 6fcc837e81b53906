//! Typed observability events
//!
//! The engine reports progress through a channel of [`JobEvent`] values
//! rather than a subscription registry: the caller holds the receiver and
//! the engine never blocks on delivery. Dropping the receiver has no
//! effect on in-flight transfers - every send ignores the closed-channel
//! error. Events for a single path are causally ordered (progress before
//! terminal); no ordering is guaranteed across paths.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use portage_common::Issue;

use crate::stats::StatisticsSnapshot;

// =============================================================================
// Events
// =============================================================================

/// Progress event emitted by jobs and the enumerator
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A job started running
    JobStarted { correlation_id: Uuid },

    /// Bytes moved for one path (periodic, best-effort)
    PathProgress {
        path: PathBuf,
        bytes_transferred: u64,
    },

    /// One path reached a successful terminal outcome
    PathCompleted { path: PathBuf, bytes: u64 },

    /// An issue was recorded (path-level when `issue.path` is set,
    /// job-level otherwise)
    PathIssue { issue: Issue },

    /// A path was re-queued for another attempt
    JobRetry {
        path: PathBuf,
        attempt: u32,
        wait: Duration,
    },

    /// Periodic statistics snapshot
    Statistics { snapshot: StatisticsSnapshot },

    /// A job reached its terminal state
    JobEnded {
        correlation_id: Uuid,
        status: &'static str,
    },

    /// Periodic enumeration progress (running totals so far)
    EnumerationProgress {
        files: u64,
        bytes: u64,
        directories: u64,
        path_errors: u64,
    },

    /// A path could not be read during enumeration; fired synchronously as
    /// the path is encountered
    EnumerationPathError { path: PathBuf, message: String },
}

// =============================================================================
// Event Sink
// =============================================================================

/// Non-blocking event delivery handle shared by workers
///
/// Cloneable; all clones feed the same receiver.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<JobEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver the caller consumes events from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event; never blocks, never fails
    pub fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

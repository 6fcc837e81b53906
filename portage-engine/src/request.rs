//! Transfer requests, job states, and results
//!
//! A [`TransferRequest`] is the immutable configuration a job is created
//! from: direction, target defaults, optional path resolvers, retry policy,
//! and a correlation identifier that ties events, issues, and the final
//! [`TransferResult`] together.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use portage_common::{Issue, PathRecord, RetryPolicy, TransferDirection};

use crate::stats::StatisticsSnapshot;

// =============================================================================
// Path Resolvers
// =============================================================================

/// Caller-supplied mapping from a record to a source or target path
///
/// Resolvers run once per record, during resolution, before the record is
/// enqueued.
pub type PathResolver = Arc<dyn Fn(&PathRecord) -> PathBuf + Send + Sync>;

// =============================================================================
// Transfer Request
// =============================================================================

/// Immutable configuration a job is created from
#[derive(Clone)]
pub struct TransferRequest {
    /// Default direction for records that do not carry one
    pub direction: TransferDirection,
    /// Records supplied up front; ignored by job-style transfer, which
    /// takes an open stream via `add_path`
    pub records: Vec<PathRecord>,
    /// Default target directory for records that do not carry one
    pub target_path: Option<PathBuf>,
    /// Default target filename; `None` keeps each source filename
    pub target_filename: Option<String>,
    /// Optional override mapping each record to its source path
    pub source_resolver: Option<PathResolver>,
    /// Optional override mapping each record to its target directory
    pub target_resolver: Option<PathResolver>,
    /// Retry wait-timing strategy
    pub retry_policy: RetryPolicy,
    /// Correlation identifier echoed in events and the result
    pub correlation_id: Uuid,
}

impl TransferRequest {
    /// Create a request with a fresh correlation id
    pub fn new(direction: TransferDirection) -> Self {
        Self {
            direction,
            records: Vec::new(),
            target_path: None,
            target_filename: None,
            source_resolver: None,
            target_resolver: None,
            retry_policy: RetryPolicy::default(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Set the default target directory
    #[must_use]
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target_path = Some(target.into());
        self
    }

    /// Set the retry timing policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the target-directory resolver
    #[must_use]
    pub fn with_target_resolver(mut self, resolver: PathResolver) -> Self {
        self.target_resolver = Some(resolver);
        self
    }

    /// Set the source-path resolver
    #[must_use]
    pub fn with_source_resolver(mut self, resolver: PathResolver) -> Self {
        self.source_resolver = Some(resolver);
        self
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("direction", &self.direction)
            .field("records", &self.records.len())
            .field("target_path", &self.target_path)
            .field("target_filename", &self.target_filename)
            .field("source_resolver", &self.source_resolver.is_some())
            .field("target_resolver", &self.target_resolver.is_some())
            .field("retry_policy", &self.retry_policy)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Externally observed job state
///
/// `Failed` means the job ran to completion with one or more non-fatal
/// per-path errors; `Fatal` means an unrecoverable condition stopped
/// processing before all paths were attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Created, no worker has started
    NotStarted,
    /// Workers are processing the queue
    Running,
    /// Completed with no per-path errors
    Succeeded,
    /// Completed, but one or more paths failed terminally
    Failed,
    /// An unrecoverable condition aborted the job
    Fatal,
    /// The cancellation signal preempted completion
    Canceled,
}

impl JobStatus {
    /// String representation used in events and results
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Fatal => "fatal",
            Self::Canceled => "canceled",
        }
    }

    /// True for states no transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Fatal | Self::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transfer Result
// =============================================================================

/// Aggregated outcome of a completed job
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Terminal job state
    pub status: JobStatus,
    /// Final statistics snapshot
    pub statistics: StatisticsSnapshot,
    /// Ordered issues recorded during the job
    pub issues: Vec<Issue>,
    /// Correlation identifier from the request
    pub correlation_id: Uuid,
    /// Wall time from job creation to completion
    pub elapsed: Duration,
}

impl TransferResult {
    /// True when the job succeeded with no per-path errors
    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Succeeded.as_str(), "succeeded");
        assert_eq!(JobStatus::Fatal.as_str(), "fatal");
        assert_eq!(format!("{}", JobStatus::Canceled), "canceled");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::NotStarted.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Fatal.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let request = TransferRequest::new(TransferDirection::Upload)
            .with_target("/remote/inbox")
            .with_retry_policy(RetryPolicy::Fixed {
                wait: Duration::from_secs(2),
            });
        assert_eq!(request.target_path, Some(PathBuf::from("/remote/inbox")));
        assert!(request.source_resolver.is_none());
    }
}

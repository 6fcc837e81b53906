//! Transport seam - the pluggable per-protocol byte movers
//!
//! The engine is transport-agnostic: everything protocol-specific lives
//! behind [`TransportClient`]. A transport reports recoverable per-path
//! problems as an [`Issue`] inside its [`TransferOutcome`] (the engine
//! retries or logs them) and reserves `Err(TransportFatal)` for job-level
//! conditions that must stop the whole job: authentication failures and
//! unrecoverable connection loss.
//!
//! Implementations must tolerate concurrent `transfer` calls - the worker
//! pool shares one client instance across workers.

mod local;
mod registry;

pub use local::LocalDirTransport;
pub use registry::{TransportFactory, TransportRegistry};

use std::fmt;

use async_trait::async_trait;

use portage_common::{CancelToken, Issue, ResolvedRecord};

use crate::error::FatalKind;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of one transfer attempt for one path
#[derive(Debug)]
pub struct TransferOutcome {
    /// Bytes actually moved during this attempt
    pub bytes_transferred: u64,
    /// Recoverable per-path problem; `None` means success
    pub issue: Option<Issue>,
}

impl TransferOutcome {
    /// Successful attempt
    pub fn success(bytes_transferred: u64) -> Self {
        Self {
            bytes_transferred,
            issue: None,
        }
    }

    /// Attempt that hit a recoverable per-path problem
    pub fn failed(issue: Issue) -> Self {
        Self {
            bytes_transferred: 0,
            issue: Some(issue),
        }
    }
}

/// Answer to a capability probe
#[derive(Debug, Clone)]
pub struct SupportResult {
    /// Whether this transport can serve the request
    pub supported: bool,
    /// Explanation when unsupported
    pub reason: Option<String>,
}

impl SupportResult {
    /// Positive probe answer
    pub fn supported() -> Self {
        Self {
            supported: true,
            reason: None,
        }
    }

    /// Negative probe answer with an explanation
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: Some(reason.into()),
        }
    }
}

/// Answer to a connectivity check
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    /// Whether the transport can currently reach its endpoint
    pub connected: bool,
    /// Diagnostic detail
    pub message: Option<String>,
}

// =============================================================================
// Fatal Conditions
// =============================================================================

/// Job-level condition reported by a transport
///
/// Unlike per-path issues these abort the job: remaining queued paths are
/// not attempted and the job ends in the `Fatal` state.
#[derive(Debug, Clone)]
pub struct TransportFatal {
    /// Condition class
    pub kind: FatalKind,
    /// Human-readable detail
    pub message: String,
}

impl TransportFatal {
    /// Build a fatal condition
    pub fn new(kind: FatalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportFatal {}

// =============================================================================
// Transport Client
// =============================================================================

/// Per-protocol byte mover
///
/// One instance is shared read-mostly across all workers of a job;
/// `transfer` must be safe to call concurrently.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Stable identifier used by the registry ("share", "http", ...)
    fn id(&self) -> &'static str;

    /// Move the bytes for one resolved record
    ///
    /// Recoverable problems come back as `Ok` with an issue; `Err` is
    /// reserved for job-level fatal conditions. The token should be
    /// observed between chunks where the protocol allows it.
    async fn transfer(
        &self,
        record: &ResolvedRecord,
        token: &CancelToken,
    ) -> Result<TransferOutcome, TransportFatal>;

    /// Capability probe used for ranked transport selection
    async fn support_check(&self, token: &CancelToken) -> SupportResult;

    /// Connectivity check against the transport's endpoint
    async fn connection_check(&self, token: &CancelToken) -> ConnectionResult;

    /// Maximum path length this transport supports, when limited
    fn max_path_length(&self) -> Option<usize> {
        None
    }

    /// Whether `change_data_rate` is meaningful for this transport
    fn supports_rate_change(&self) -> bool {
        false
    }

    /// Adjust throughput hints at runtime, in kbit/s
    ///
    /// Only called when `supports_rate_change` returns true.
    async fn change_data_rate(
        &self,
        _min_kbps: Option<u64>,
        _target_kbps: Option<u64>,
        _token: &CancelToken,
    ) -> Result<(), TransportFatal> {
        Ok(())
    }
}

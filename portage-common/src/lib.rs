//! Portage Common Library
//!
//! Shared leaf types for the Portage bulk file-transfer engine: path
//! records, issues, retry timing policies, and the cancellation token
//! threaded through every long-running operation.

mod cancel;
mod issue;
mod record;
mod retry;

pub use cancel::CancelToken;
pub use issue::{Issue, IssueAttributes, IssueKind};
pub use record::{PathRecord, ResolveError, ResolvedRecord, TransferDirection};
pub use retry::RetryPolicy;

/// Chunk size for transport file I/O (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default byte ceiling for one serialized batch (100 GB)
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 100 * 1024 * 1024 * 1024;

/// Default file-count ceiling for one serialized batch
pub const DEFAULT_MAX_BATCH_FILES: u64 = 50_000;

/// Default number of samples in the transfer-rate sliding window
pub const DEFAULT_RATE_WINDOW: usize = 8;

/// Default number of parallel workers per job (sequential)
pub const DEFAULT_JOB_PARALLELISM: usize = 1;

/// Default job-level retry attempt ceiling per path
pub const DEFAULT_JOB_RETRY_ATTEMPTS: u32 = 3;

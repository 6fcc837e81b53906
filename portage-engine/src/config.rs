//! Configuration value objects
//!
//! All tuning knobs are explicit values threaded through job and enumerator
//! construction; there is no process-wide mutable configuration. The engine
//! applies no hidden defaulting beyond the documented `Default` impls -
//! every field is a pass-through from whatever outer config/CLI layer owns
//! user input.

use std::path::PathBuf;
use std::time::Duration;

use portage_common::{
    DEFAULT_CHUNK_SIZE, DEFAULT_JOB_PARALLELISM, DEFAULT_JOB_RETRY_ATTEMPTS,
    DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_FILES, DEFAULT_RATE_WINDOW,
};

// =============================================================================
// Job Options
// =============================================================================

/// Tuning for one transfer job
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Number of parallel workers pulling from the queue (>= 1)
    pub max_job_parallelism: usize,
    /// Per-path attempt ceiling for retryable issues
    pub max_job_retry_attempts: u32,
    /// Retry paths that failed with `file_not_found`
    pub retry_file_not_found: bool,
    /// Retry paths that failed with `permission`
    pub retry_permission: bool,
    /// Retry paths that failed with `bad_path`
    pub retry_bad_path: bool,
    /// Bound on queued-but-undispatched paths; producers wait cooperatively
    /// once it is reached
    pub queue_capacity: usize,
    /// Interval between periodic statistics events
    pub stats_interval: Duration,
    /// Number of samples in the rate-smoothing window
    pub rate_window: usize,
    /// Minimum data-rate hint passed to the transport, in kbit/s
    pub min_rate_kbps: Option<u64>,
    /// Target data-rate hint passed to the transport, in kbit/s
    pub target_rate_kbps: Option<u64>,
    /// Chunk size for transports that stream file contents
    pub chunk_size: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_job_parallelism: DEFAULT_JOB_PARALLELISM,
            max_job_retry_attempts: DEFAULT_JOB_RETRY_ATTEMPTS,
            retry_file_not_found: false,
            retry_permission: false,
            retry_bad_path: false,
            queue_capacity: 1024,
            stats_interval: Duration::from_secs(1),
            rate_window: DEFAULT_RATE_WINDOW,
            min_rate_kbps: None,
            target_rate_kbps: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl JobOptions {
    /// Validate option values that have a required range
    pub fn validate(&self) -> Result<(), String> {
        if self.max_job_parallelism == 0 {
            return Err("max_job_parallelism must be at least 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        if self.rate_window == 0 {
            return Err("rate_window must be at least 1".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be at least 1".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Enumeration Options
// =============================================================================

/// Tuning for one enumeration or batch-serialization walk
#[derive(Debug, Clone)]
pub struct EnumerationOptions {
    /// Search roots to walk
    pub roots: Vec<PathBuf>,
    /// Filename patterns (`*` wildcards); empty accepts every file
    pub name_filters: Vec<String>,
    /// Recurse into subdirectories; `false` walks the top level only
    pub recursive: bool,
    /// Record too-long paths as error records and continue instead of
    /// aborting the walk
    pub skip_too_long: bool,
    /// Maximum supported path length; `None` leaves the check to the
    /// active transport's limit
    pub max_path_length: Option<usize>,
    /// Bound on concurrently walked roots
    pub dir_parallelism: usize,
    /// Bound on concurrent file-stat calls within one root
    pub file_parallelism: usize,
    /// Interval between enumeration progress events
    pub progress_interval: Duration,
    /// Byte ceiling per serialized batch
    pub max_batch_bytes: u64,
    /// File-count ceiling per serialized batch
    pub max_batch_files: u64,
    /// Rewrite the in-progress batch file as the walk advances so readers
    /// see a live summary
    pub live_sync: bool,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            name_filters: Vec::new(),
            recursive: true,
            skip_too_long: false,
            max_path_length: None,
            dir_parallelism: 1,
            file_parallelism: 4,
            progress_interval: Duration::from_secs(1),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
            live_sync: false,
        }
    }
}

impl EnumerationOptions {
    /// Walk a single root with default tuning
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    /// Validate option values that have a required range
    pub fn validate(&self) -> Result<(), String> {
        if self.roots.is_empty() {
            return Err("at least one search root is required".to_string());
        }
        if self.dir_parallelism == 0 {
            return Err("dir_parallelism must be at least 1".to_string());
        }
        if self.file_parallelism == 0 {
            return Err("file_parallelism must be at least 1".to_string());
        }
        if self.max_batch_files == 0 {
            return Err("max_batch_files must be at least 1".to_string());
        }
        if self.max_batch_bytes == 0 {
            return Err("max_batch_bytes must be at least 1".to_string());
        }
        Ok(())
    }
}

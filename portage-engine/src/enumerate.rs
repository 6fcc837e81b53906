//! Path enumeration - lazily turning directory trees into path records
//!
//! Walks one or more search roots without materializing the whole set when
//! it is large: `enumerate` collects records in memory, `serialize` streams
//! them into bounded on-disk batch files instead. Each root is walked with
//! `walkdir` on the blocking pool (the walk is synchronous I/O), with roots
//! processed concurrently up to `dir_parallelism` and file stats within a
//! root fanned out across `file_parallelism` threads.
//!
//! Unreadable paths fire a synchronous per-path error event and are
//! recorded as issues; a path longer than the active limit either becomes
//! an error record (skip-too-long) or aborts the whole walk with a fatal
//! path-too-long error (the default).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use walkdir::WalkDir;

use portage_common::{CancelToken, Issue, IssueKind, PathRecord};

use crate::batch::{BatchDescriptor, BatchWriter};
use crate::config::EnumerationOptions;
use crate::error::{FatalKind, JobError};
use crate::events::{EventSink, JobEvent};

// =============================================================================
// Outcomes
// =============================================================================

/// Result of an in-memory enumeration
#[derive(Debug)]
pub struct EnumerationOutcome {
    /// Records for every readable file that passed the filters
    pub records: Vec<PathRecord>,
    /// Files seen
    pub total_files: u64,
    /// Byte total across all records
    pub total_bytes: u64,
    /// Directories visited
    pub directories: u64,
    /// Issues for unreadable or skipped-too-long paths
    pub path_errors: Vec<Issue>,
    /// Walk duration
    pub elapsed: Duration,
}

/// Result of a batch-serializing enumeration
#[derive(Debug)]
pub struct SerializationOutcome {
    /// Descriptors for every written batch, in order
    pub batches: Vec<BatchDescriptor>,
    /// Files seen
    pub total_files: u64,
    /// Byte total across all batches
    pub total_bytes: u64,
    /// Directories visited
    pub directories: u64,
    /// Issues for unreadable or skipped-too-long paths
    pub path_errors: Vec<Issue>,
    /// Walk duration
    pub elapsed: Duration,
}

// =============================================================================
// Enumerator
// =============================================================================

/// Walks search roots and produces path records
pub struct PathEnumerator {
    options: EnumerationOptions,
}

impl PathEnumerator {
    /// Create an enumerator, validating the options
    pub fn new(options: EnumerationOptions) -> Result<Self, JobError> {
        options.validate().map_err(JobError::Configuration)?;
        Ok(Self { options })
    }

    /// Walk the roots and collect records in memory
    pub async fn enumerate(
        &self,
        sink: &EventSink,
        token: &CancelToken,
    ) -> Result<EnumerationOutcome, JobError> {
        let started = Instant::now();
        let records = Arc::new(Mutex::new(Vec::new()));
        let consumer = {
            let records = Arc::clone(&records);
            move |record: PathRecord| {
                records.lock().expect("record sink lock poisoned").push(record);
                Ok(())
            }
        };

        let walk = self.run_walk(Arc::new(consumer), sink, token).await?;
        let records = {
            let mut guard = records.lock().expect("record sink lock poisoned");
            std::mem::take(&mut *guard)
        };

        Ok(EnumerationOutcome {
            records,
            total_files: walk.files,
            total_bytes: walk.bytes,
            directories: walk.directories,
            path_errors: walk.errors,
            elapsed: started.elapsed(),
        })
    }

    /// Walk the roots and persist records into batch files under `batch_dir`
    pub async fn serialize(
        &self,
        batch_dir: &Path,
        sink: &EventSink,
        token: &CancelToken,
    ) -> Result<SerializationOutcome, JobError> {
        let started = Instant::now();
        std::fs::create_dir_all(batch_dir).map_err(|e| {
            JobError::Configuration(format!(
                "cannot create batch directory {}: {e}",
                batch_dir.display()
            ))
        })?;

        let writer = Arc::new(Mutex::new(Some(BatchWriter::new(
            batch_dir,
            self.options.max_batch_bytes,
            self.options.max_batch_files,
            self.options.live_sync,
        ))));
        let consumer = {
            let writer = Arc::clone(&writer);
            move |record: PathRecord| {
                let mut guard = writer.lock().expect("batch writer lock poisoned");
                match guard.as_mut() {
                    Some(w) => w.push(record),
                    None => Ok(()),
                }
            }
        };

        let walk = self.run_walk(Arc::new(consumer), sink, token).await?;

        let writer = writer
            .lock()
            .expect("batch writer lock poisoned")
            .take()
            .expect("batch writer consumed twice");
        let batches = writer
            .finalize()
            .map_err(|e| JobError::fatal(FatalKind::Storage, format!("batch write failed: {e}")))?;

        Ok(SerializationOutcome {
            batches,
            total_files: walk.files,
            total_bytes: walk.bytes,
            directories: walk.directories,
            path_errors: walk.errors,
            elapsed: started.elapsed(),
        })
    }

    /// Drive the walk across all roots with bounded parallelism
    async fn run_walk(
        &self,
        consumer: SharedConsumer,
        sink: &EventSink,
        token: &CancelToken,
    ) -> Result<WalkSummary, JobError> {
        let shared = Arc::new(WalkShared {
            totals: WalkTotals::default(),
            errors: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
        });

        // Periodic progress snapshots from the shared running totals
        let ticker = {
            let shared = Arc::clone(&shared);
            let sink = sink.clone();
            let interval = self.options.progress_interval;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    sink.emit(shared.totals.progress_event());
                }
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.options.dir_parallelism));
        let mut handles = Vec::with_capacity(self.options.roots.len());
        for root in &self.options.roots {
            let root = root.clone();
            let options = self.options.clone();
            let shared = Arc::clone(&shared);
            let sink = sink.clone();
            let token = token.clone();
            let consumer = Arc::clone(&consumer);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("walk semaphore closed");
                tokio::task::spawn_blocking(move || {
                    walk_root(&root, &options, &shared, &sink, &token, consumer.as_ref())
                })
                .await
                .expect("walk task panicked")
            }));
        }

        let mut walk_error = None;
        for handle in handles {
            if let Err(err) = handle.await.expect("walk task panicked")
                && walk_error.is_none()
            {
                walk_error = Some(err);
            }
        }
        ticker.abort();

        if let Some(err) = walk_error {
            return Err(err);
        }
        if token.is_cancelled() {
            return Err(JobError::Canceled);
        }
        if let Some(fatal) = shared.fatal.lock().expect("walk fatal lock poisoned").take() {
            return Err(fatal);
        }

        // Final progress snapshot so consumers see the end totals
        sink.emit(shared.totals.progress_event());

        let errors = std::mem::take(
            &mut *shared.errors.lock().expect("walk errors lock poisoned"),
        );
        Ok(WalkSummary {
            files: shared.totals.files.load(Ordering::Relaxed),
            bytes: shared.totals.bytes.load(Ordering::Relaxed),
            directories: shared.totals.directories.load(Ordering::Relaxed),
            errors,
        })
    }
}

// =============================================================================
// Walk Internals
// =============================================================================

type SharedConsumer = Arc<dyn Fn(PathRecord) -> std::io::Result<()> + Send + Sync>;

/// Running totals shared across walker and stat threads
#[derive(Debug, Default)]
struct WalkTotals {
    files: AtomicU64,
    bytes: AtomicU64,
    directories: AtomicU64,
    errors: AtomicU64,
}

impl WalkTotals {
    fn progress_event(&self) -> JobEvent {
        JobEvent::EnumerationProgress {
            files: self.files.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            directories: self.directories.load(Ordering::Relaxed),
            path_errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

struct WalkShared {
    totals: WalkTotals,
    errors: Mutex<Vec<Issue>>,
    // First fatal condition encountered by any walker; stops all of them
    fatal: Mutex<Option<JobError>>,
}

impl WalkShared {
    fn record_path_error(&self, issue: Issue, sink: &EventSink) {
        sink.emit(JobEvent::EnumerationPathError {
            path: issue.path.clone().unwrap_or_default(),
            message: issue.message.clone(),
        });
        self.totals.errors.fetch_add(1, Ordering::Relaxed);
        self.errors
            .lock()
            .expect("walk errors lock poisoned")
            .push(issue);
    }

    fn set_fatal(&self, err: JobError) {
        let mut fatal = self.fatal.lock().expect("walk fatal lock poisoned");
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    fn is_stopping(&self) -> bool {
        self.fatal
            .lock()
            .expect("walk fatal lock poisoned")
            .is_some()
    }
}

/// Summary handed back from the walk driver
struct WalkSummary {
    files: u64,
    bytes: u64,
    directories: u64,
    errors: Vec<Issue>,
}

/// Walk one root synchronously, fanning file stats out to worker threads
fn walk_root(
    root: &Path,
    options: &EnumerationOptions,
    shared: &WalkShared,
    sink: &EventSink,
    token: &CancelToken,
    consumer: &(dyn Fn(PathRecord) -> std::io::Result<()> + Send + Sync),
) -> Result<(), JobError> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let stat_workers = options.file_parallelism.max(1);
    let (path_tx, path_rx) = mpsc::sync_channel::<PathBuf>(stat_workers * 8);
    let path_rx = Arc::new(Mutex::new(path_rx));

    std::thread::scope(|scope| {
        for _ in 0..stat_workers {
            let path_rx = Arc::clone(&path_rx);
            scope.spawn(move || {
                loop {
                    let path = {
                        let rx = path_rx.lock().expect("stat queue lock poisoned");
                        rx.recv()
                    };
                    let Ok(path) = path else {
                        break;
                    };
                    match std::fs::metadata(&path) {
                        Ok(metadata) => {
                            let mut record = PathRecord::new(&path);
                            record.size = Some(metadata.len());
                            shared.totals.files.fetch_add(1, Ordering::Relaxed);
                            shared
                                .totals
                                .bytes
                                .fetch_add(metadata.len(), Ordering::Relaxed);
                            if let Err(e) = consumer(record) {
                                shared.set_fatal(JobError::fatal(
                                    FatalKind::Storage,
                                    format!("record sink failed: {e}"),
                                ));
                            }
                        }
                        Err(e) => {
                            shared.record_path_error(
                                Issue::error(
                                    IssueKind::from_io_error(&e),
                                    Some(path),
                                    format!("cannot stat path: {e}"),
                                ),
                                sink,
                            );
                        }
                    }
                }
            });
        }

        for entry in WalkDir::new(root).max_depth(max_depth) {
            if token.is_cancelled() || shared.is_stopping() {
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf);
                    shared.record_path_error(
                        Issue::error(IssueKind::Io, path, format!("cannot read path: {e}")),
                        sink,
                    );
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                shared.totals.directories.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();

            // Names that are not valid UTF-8 are filtered on their lossy form
            if let Some(name) = path.file_name()
                && !matches_filters(&name.to_string_lossy(), &options.name_filters)
            {
                continue;
            }

            if let Some(limit) = options.max_path_length
                && path.as_os_str().len() > limit
            {
                if options.skip_too_long {
                    shared.record_path_error(
                        Issue::error(
                            IssueKind::PathTooLong,
                            Some(path),
                            format!("path exceeds {limit} characters"),
                        ),
                        sink,
                    );
                    continue;
                }
                shared.set_fatal(JobError::fatal(
                    FatalKind::PathTooLong,
                    format!("path exceeds {limit} characters: {}", path.display()),
                ));
                break;
            }

            if path_tx.send(path).is_err() {
                break;
            }
        }

        drop(path_tx);
    });

    if token.is_cancelled() {
        return Err(JobError::Canceled);
    }
    Ok(())
}

/// Match a filename against `*`/`?` wildcard patterns
///
/// An empty pattern list accepts everything.
fn matches_filters(name: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|pattern| wildcard_match(pattern, name))
}

/// Minimal wildcard matcher: `*` matches any run, `?` any single character
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // Iterative backtracking over the single most recent `*`
    let (mut p, mut t) = (0usize, 0usize);
    let (mut star, mut star_t) = (None::<usize>, 0usize);

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

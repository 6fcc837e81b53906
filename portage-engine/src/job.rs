//! Transfer job orchestration
//!
//! A [`TransferJob`] turns an open stream of path records into a final
//! [`TransferResult`]: records are resolved once, enqueued with bounded
//! backpressure, pulled by a pool of worker tasks that invoke the shared
//! transport client, and every per-path outcome lands in the statistics
//! aggregator and issue log. Per-path problems are recovered locally
//! (retried per policy or recorded) and never unwind to the caller; only
//! job-level fatal conditions and contract violations surface as errors.
//!
//! The queue, issue log, and statistics aggregator are the only state
//! shared across workers, each internally synchronized. Retries of one
//! path are serialized: a failed attempt is re-enqueued by a timer task
//! after the retry policy's wait, so two attempts for the same path never
//! overlap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use portage_common::{
    CancelToken, Issue, IssueAttributes, IssueKind, PathRecord, ResolvedRecord, RetryPolicy,
};

use crate::config::JobOptions;
use crate::error::{FatalKind, JobError};
use crate::events::{EventSink, JobEvent};
use crate::issues::IssueLog;
use crate::request::{JobStatus, TransferRequest, TransferResult};
use crate::stats::StatisticsAggregator;
use crate::transport::TransportClient;

// =============================================================================
// Work Items
// =============================================================================

/// One queued transfer attempt
struct WorkItem {
    record: ResolvedRecord,
    /// 1-based attempt number this dequeue will perform
    attempt: u32,
}

// =============================================================================
// Shared Job State
// =============================================================================

/// State shared between the job handle, its workers, and retry timers
struct JobShared {
    /// Pending work, pulled by workers
    queue: Mutex<VecDeque<WorkItem>>,
    /// Backpressure bound on queued-but-undispatched items
    queue_space: Semaphore,
    /// Wakes workers when work arrives or the queue closes
    work_notify: Notify,
    /// Wakes `complete` when the last path reaches a terminal outcome
    done_notify: Notify,
    /// Records enqueued but not yet terminal (retry sleeps keep this > 0)
    pending: AtomicU64,
    /// Set by `complete`: no further `add_path` calls are accepted
    closed: AtomicBool,
    status: Mutex<JobStatus>,
    /// First job-level fatal condition, if any
    fatal: Mutex<Option<(FatalKind, String)>>,
    stats: StatisticsAggregator,
    issues: IssueLog,
    events: EventSink,
    /// Internal cancel signal; trips on caller cancellation, fatal
    /// conditions, and shutdown
    cancel: CancelToken,
    /// The caller's token, checked directly so a pre-tripped token is
    /// observed before the watcher task has run
    caller: CancelToken,
    started: AtomicBool,
}

impl JobShared {
    fn set_status(&self, status: JobStatus) {
        *self.status.lock().expect("job status lock poisoned") = status;
    }

    fn status(&self) -> JobStatus {
        *self.status.lock().expect("job status lock poisoned")
    }

    fn fatal_error(&self) -> Option<JobError> {
        self.fatal
            .lock()
            .expect("job fatal lock poisoned")
            .clone()
            .map(|(kind, message)| JobError::Fatal { kind, message })
    }

    /// Record a job-level fatal condition and stop all workers
    fn set_fatal(&self, kind: FatalKind, message: String) {
        {
            let mut fatal = self.fatal.lock().expect("job fatal lock poisoned");
            if fatal.is_some() {
                return;
            }
            *fatal = Some((kind, message.clone()));
        }
        let issue = Issue::error(kind.issue_kind(), None, message);
        self.issues.append(issue.clone());
        self.events.emit(JobEvent::PathIssue { issue });
        self.set_status(JobStatus::Fatal);
        self.cancel.cancel();
        self.done_notify.notify_waiters();
        self.work_notify.notify_waiters();
    }

    /// Pop the next item, freeing its backpressure permit
    fn pop(&self) -> Option<WorkItem> {
        let item = self
            .queue
            .lock()
            .expect("job queue lock poisoned")
            .pop_front();
        if item.is_some() {
            self.queue_space.add_permits(1);
        }
        item
    }

    /// Enqueue an item, waiting under backpressure
    async fn enqueue(&self, item: WorkItem) -> Result<(), JobError> {
        tokio::select! {
            permit = self.queue_space.acquire() => {
                permit.expect("job queue semaphore closed").forget();
            }
            _ = self.cancel.cancelled() => return Err(JobError::Canceled),
            _ = self.caller.cancelled() => return Err(JobError::Canceled),
        }
        self.queue
            .lock()
            .expect("job queue lock poisoned")
            .push_back(item);
        self.work_notify.notify_one();
        Ok(())
    }

    /// Mark one path terminal and wake `complete` when none remain
    fn finish_path(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.done_notify.notify_waiters();
            self.work_notify.notify_waiters();
        }
    }

    /// True once workers should stop pulling new items
    fn stopping(&self) -> bool {
        self.cancel.is_cancelled() || self.caller.is_cancelled()
    }
}

// =============================================================================
// Transfer Job
// =============================================================================

/// A stateful, cancelable unit of work transferring an open-ended stream
/// of path records
pub struct TransferJob {
    shared: Arc<JobShared>,
    transport: Arc<dyn TransportClient>,
    request: TransferRequest,
    options: JobOptions,
    workers: Vec<JoinHandle<()>>,
    stats_task: Option<JoinHandle<()>>,
    cancel_watch: Option<JoinHandle<()>>,
    created: Instant,
    completed: bool,
    disposed: bool,
}

impl std::fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferJob")
            .field("request", &self.request)
            .field("options", &self.options)
            .field("completed", &self.completed)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl TransferJob {
    /// Create a job and spawn its worker pool
    ///
    /// Fails with a configuration error when the request and transport
    /// disagree on required fields (no target path and no target resolver)
    /// or an option value is out of range. Must be called from within a
    /// tokio runtime.
    pub fn create(
        request: TransferRequest,
        transport: Arc<dyn TransportClient>,
        options: JobOptions,
        events: EventSink,
        token: CancelToken,
    ) -> Result<Self, JobError> {
        options.validate().map_err(JobError::Configuration)?;
        if request.target_path.is_none() && request.target_resolver.is_none() {
            return Err(JobError::Configuration(
                "request has neither a target path nor a target resolver".to_string(),
            ));
        }

        let shared = Arc::new(JobShared {
            queue: Mutex::new(VecDeque::new()),
            queue_space: Semaphore::new(options.queue_capacity),
            work_notify: Notify::new(),
            done_notify: Notify::new(),
            pending: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            status: Mutex::new(JobStatus::NotStarted),
            fatal: Mutex::new(None),
            stats: StatisticsAggregator::new(options.rate_window),
            issues: IssueLog::new(),
            events,
            cancel: CancelToken::new(),
            caller: token.clone(),
            started: AtomicBool::new(false),
        });

        // Propagate the caller's cancellation into the internal signal so
        // awaiting workers and `complete` wake up
        let cancel_watch = {
            let caller = token;
            let internal = shared.cancel.clone();
            tokio::spawn(async move {
                caller.cancelled().await;
                internal.cancel();
            })
        };

        let mut workers = Vec::with_capacity(options.max_job_parallelism);
        for _ in 0..options.max_job_parallelism {
            let shared = Arc::clone(&shared);
            let transport = Arc::clone(&transport);
            let retry_policy = request.retry_policy;
            let options = options.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(shared, transport, options, retry_policy).await;
            }));
        }

        // Apply configured rate hints once the transport is live
        if (options.min_rate_kbps.is_some() || options.target_rate_kbps.is_some())
            && transport.supports_rate_change()
        {
            let transport = Arc::clone(&transport);
            let token = shared.cancel.clone();
            let (min, target) = (options.min_rate_kbps, options.target_rate_kbps);
            tokio::spawn(async move {
                let _ = transport.change_data_rate(min, target, &token).await;
            });
        }

        let stats_task = {
            let shared = Arc::clone(&shared);
            let interval = options.stats_interval;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    shared.events.emit(JobEvent::Statistics {
                        snapshot: shared.stats.snapshot(),
                    });
                }
            })
        };

        Ok(Self {
            shared,
            transport,
            request,
            options,
            workers,
            stats_task: Some(stats_task),
            cancel_watch: Some(cancel_watch),
            created: Instant::now(),
            completed: false,
            disposed: false,
        })
    }

    /// Declare the total amount of work once known (e.g. from enumeration),
    /// enabling byte-based progress and ETA
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.shared.stats.set_totals(files, bytes);
    }

    /// Current job state
    pub fn status(&self) -> JobStatus {
        self.shared.status()
    }

    /// Options the job was created with
    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Enqueue one record for immediate dispatch
    ///
    /// Resolves the record against request defaults exactly once, then
    /// waits (bounded, cooperatively) for queue space. Safe to call
    /// concurrently with worker execution and other add calls.
    pub async fn add_path(&self, record: PathRecord) -> Result<(), JobError> {
        self.check_addable()?;

        let record = self.resolve(record)?;
        self.ensure_started();

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        match self.shared.enqueue(WorkItem { record, attempt: 1 }).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Never enqueued, so it is not pending work
                self.shared.finish_path();
                Err(err)
            }
        }
    }

    /// Enqueue several records
    pub async fn add_paths(
        &self,
        records: impl IntoIterator<Item = PathRecord>,
    ) -> Result<(), JobError> {
        for record in records {
            self.add_path(record).await?;
        }
        Ok(())
    }

    /// Adjust throughput hints at runtime
    pub async fn change_data_rate(
        &self,
        min_kbps: Option<u64>,
        target_kbps: Option<u64>,
    ) -> Result<(), JobError> {
        if self.disposed {
            return Err(JobError::Disposed);
        }
        if !self.transport.supports_rate_change() {
            return Err(JobError::Unsupported("change_data_rate"));
        }
        self.transport
            .change_data_rate(min_kbps, target_kbps, &self.shared.cancel)
            .await
            .map_err(|fatal| JobError::Fatal {
                kind: fatal.kind,
                message: fatal.message,
            })
    }

    /// Signal that no more paths will be added, drain the queue, wait for
    /// in-flight work and pending retries, and return the aggregated result
    ///
    /// A fatal condition aborts the wait and comes back as `Err`; caller
    /// cancellation yields `Ok` with status `Canceled`, completed paths
    /// keeping their outcomes.
    pub async fn complete(&mut self) -> Result<TransferResult, JobError> {
        if self.disposed {
            return Err(JobError::Disposed);
        }
        if self.completed {
            return Err(JobError::InvalidState("complete called twice"));
        }
        self.completed = true;

        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.work_notify.notify_waiters();

        // Cooperative wait for drain, cancellation, or fatal abort
        loop {
            let notified = self.shared.done_notify.notified();
            if self.shared.stopping() || self.shared.pending.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::select! {
                _ = notified => {}
                _ = self.shared.cancel.cancelled() => {}
            }
        }

        self.stop_tasks().await;

        let status = if self.shared.fatal_error().is_some() {
            JobStatus::Fatal
        } else if self.shared.stopping() {
            JobStatus::Canceled
        } else if self.shared.issues.has_errors() {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        self.shared.set_status(status);

        let snapshot = self.shared.stats.snapshot();
        self.shared.events.emit(JobEvent::Statistics {
            snapshot: snapshot.clone(),
        });
        self.shared.events.emit(JobEvent::JobEnded {
            correlation_id: self.request.correlation_id,
            status: status.as_str(),
        });

        if let Some(fatal) = self.shared.fatal_error() {
            return Err(fatal);
        }

        Ok(TransferResult {
            status,
            statistics: snapshot,
            issues: self.shared.issues.snapshot(),
            correlation_id: self.request.correlation_id,
            elapsed: self.created.elapsed(),
        })
    }

    /// Release the worker pool and queue, canceling in-flight work
    ///
    /// A job that has not completed transitions to `Canceled`. Idempotent;
    /// every operation after shutdown fails with `Disposed`.
    pub async fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
        self.stop_tasks().await;

        if !self.shared.status().is_terminal() {
            self.shared.set_status(JobStatus::Canceled);
            self.shared.events.emit(JobEvent::JobEnded {
                correlation_id: self.request.correlation_id,
                status: JobStatus::Canceled.as_str(),
            });
        }
    }

    /// Join workers and stop the background tasks
    async fn stop_tasks(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
        if let Some(task) = self.cancel_watch.take() {
            task.abort();
        }
    }

    /// Guard for producer operations
    fn check_addable(&self) -> Result<(), JobError> {
        if self.disposed {
            return Err(JobError::Disposed);
        }
        if self.completed || self.shared.closed.load(Ordering::SeqCst) {
            return Err(JobError::InvalidState("add_path after complete"));
        }
        if let Some(fatal) = self.shared.fatal_error() {
            return Err(fatal);
        }
        if self.shared.stopping() {
            return Err(JobError::Canceled);
        }
        Ok(())
    }

    /// Resolve a record against the request, applying resolvers first
    fn resolve(&self, mut record: PathRecord) -> Result<ResolvedRecord, JobError> {
        if let Some(resolver) = &self.request.source_resolver {
            record.source = resolver(&record);
        }
        if let Some(resolver) = &self.request.target_resolver
            && record.target.is_none()
        {
            record.target = Some(resolver(&record));
        }
        record
            .resolve(
                Some(self.request.direction),
                self.request.target_path.as_deref(),
                self.request.target_filename.as_deref(),
            )
            .map_err(|e| JobError::Configuration(e.to_string()))
    }

    /// First producer call moves the job to `Running`
    fn ensure_started(&self) {
        if !self.shared.started.swap(true, Ordering::SeqCst) {
            self.shared.set_status(JobStatus::Running);
            self.shared.events.emit(JobEvent::JobStarted {
                correlation_id: self.request.correlation_id,
            });
        }
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

/// Pull items until the queue is closed and drained, or the job stops
async fn worker_loop(
    shared: Arc<JobShared>,
    transport: Arc<dyn TransportClient>,
    options: JobOptions,
    retry_policy: RetryPolicy,
) {
    loop {
        let Some(item) = next_item(&shared).await else {
            return;
        };
        process_item(&shared, transport.as_ref(), &options, retry_policy, item).await;
    }
}

/// Wait for the next work item; `None` means the worker should exit
async fn next_item(shared: &Arc<JobShared>) -> Option<WorkItem> {
    loop {
        if shared.stopping() {
            return None;
        }
        // Arm the notification before re-checking so a push between the
        // check and the await is not missed
        let notified = shared.work_notify.notified();
        if let Some(item) = shared.pop() {
            return Some(item);
        }
        if shared.closed.load(Ordering::SeqCst) && shared.pending.load(Ordering::SeqCst) == 0 {
            return None;
        }
        tokio::select! {
            _ = notified => {}
            _ = shared.cancel.cancelled() => return None,
        }
    }
}

/// Run one transfer attempt and settle its outcome
async fn process_item(
    shared: &Arc<JobShared>,
    transport: &dyn TransportClient,
    options: &JobOptions,
    retry_policy: RetryPolicy,
    item: WorkItem,
) {
    let outcome = match transport.transfer(&item.record, &shared.cancel).await {
        Ok(outcome) => outcome,
        Err(fatal) => {
            shared.set_fatal(fatal.kind, fatal.message);
            return;
        }
    };

    // An outcome that raced the cancel is still real work: the file is on
    // disk (or terminally failed), so it is recorded. Only outcomes the
    // transport itself marked CANCELED are discarded.
    let Some(issue) = outcome.issue else {
        shared.stats.record_success(outcome.bytes_transferred);
        shared.events.emit(JobEvent::PathCompleted {
            path: item.record.source.clone(),
            bytes: outcome.bytes_transferred,
        });
        shared.finish_path();
        return;
    };

    if issue.attributes.contains(IssueAttributes::CANCELED) {
        // Transport observed the cancel mid-transfer
        return;
    }

    if issue.is_warning() {
        // Warnings never fail the job; the path counts as skipped
        let issue = issue.with_attempt(item.attempt, options.max_job_retry_attempts);
        shared.stats.record_skipped();
        shared.events.emit(JobEvent::PathIssue { issue: issue.clone() });
        shared.issues.append(issue);
        shared.finish_path();
        return;
    }

    // No retries once the job is stopping; the failure is recorded as-is
    if is_retryable(issue.kind, options)
        && item.attempt < options.max_job_retry_attempts
        && !shared.stopping()
    {
        let wait = retry_policy.wait_for(item.attempt);
        shared.stats.record_retry();
        shared.stats.begin_attempt();
        shared.events.emit(JobEvent::JobRetry {
            path: item.record.source.clone(),
            attempt: item.attempt,
            wait,
        });

        // Re-enqueue after the wait; the sleeping timer keeps the path
        // pending so complete() does not settle early
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let _ = shared
                        .enqueue(WorkItem {
                            record: item.record,
                            attempt: item.attempt + 1,
                        })
                        .await;
                }
                _ = shared.cancel.cancelled() => {}
            }
        });
        return;
    }

    let issue = issue.with_attempt(item.attempt, options.max_job_retry_attempts);
    if issue.kind == IssueKind::FileNotFound {
        shared.stats.record_not_found();
    } else {
        shared.stats.record_failure();
    }
    shared.events.emit(JobEvent::PathIssue { issue: issue.clone() });
    shared.issues.append(issue);
    shared.finish_path();
}

/// Per-kind retry eligibility from the job options
fn is_retryable(kind: IssueKind, options: &JobOptions) -> bool {
    match kind {
        IssueKind::FileNotFound => options.retry_file_not_found,
        IssueKind::Permission => options.retry_permission,
        IssueKind::BadPath => options.retry_bad_path,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalDirTransport;
    use portage_common::TransferDirection;

    fn request_with_target() -> TransferRequest {
        TransferRequest::new(TransferDirection::Upload).with_target("/tmp/out")
    }

    #[tokio::test]
    async fn test_create_requires_target_or_resolver() {
        let request = TransferRequest::new(TransferDirection::Upload);
        let err = TransferJob::create(
            request,
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_zero_parallelism() {
        let options = JobOptions {
            max_job_parallelism: 0,
            ..JobOptions::default()
        };
        let err = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            options,
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_new_job_is_not_started() {
        let mut job = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap();
        assert_eq!(job.status(), JobStatus::NotStarted);
        job.shutdown().await;
        assert_eq!(job.status(), JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_add_path_on_canceled_token_fails() {
        let token = CancelToken::new();
        token.cancel();
        let mut job = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            token,
        )
        .unwrap();

        // The pre-tripped token is observed without waiting for the watcher
        let err = job.add_path(PathRecord::new("/tmp/a")).await.unwrap_err();
        assert!(matches!(err, JobError::Canceled));
        job.shutdown().await;
    }

    #[tokio::test]
    async fn test_operations_after_shutdown_fail_disposed() {
        let mut job = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap();
        job.shutdown().await;

        let err = job.add_path(PathRecord::new("/tmp/a")).await.unwrap_err();
        assert!(matches!(err, JobError::Disposed));
        let err = job.complete().await.unwrap_err();
        assert!(matches!(err, JobError::Disposed));
        let err = job.change_data_rate(None, Some(1000)).await.unwrap_err();
        assert!(matches!(err, JobError::Disposed));

        // Shutdown twice is fine
        job.shutdown().await;
    }

    #[tokio::test]
    async fn test_rate_change_unsupported_on_local_transport() {
        let mut job = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap();
        let err = job.change_data_rate(None, Some(1000)).await.unwrap_err();
        assert!(matches!(err, JobError::Unsupported(_)));
        job.shutdown().await;
    }

    #[tokio::test]
    async fn test_complete_twice_is_invalid_state() {
        let mut job = TransferJob::create(
            request_with_target(),
            Arc::new(LocalDirTransport::new()),
            JobOptions::default(),
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap();
        let result = job.complete().await.unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
        let err = job.complete().await.unwrap_err();
        assert!(matches!(err, JobError::InvalidState(_)));
    }
}

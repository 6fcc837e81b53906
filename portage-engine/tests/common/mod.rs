//! Shared fixtures for the engine integration tests

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use portage_common::{CancelToken, Issue, IssueKind, ResolvedRecord};
use portage_engine::{
    ConnectionResult, FatalKind, SupportResult, TransferOutcome, TransportClient, TransportFatal,
};

// ============================================================================
// File Fixtures
// ============================================================================

/// Create a source directory with `count` files of `size` bytes each
pub fn create_source_files(count: usize, size: usize) -> (TempDir, Vec<PathBuf>) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut paths = Vec::with_capacity(count);
    for i in 0..count {
        let path = dir.path().join(format!("file-{i:03}.bin"));
        std::fs::write(&path, vec![b'x'; size]).expect("failed to write fixture file");
        paths.push(path);
    }
    (dir, paths)
}

// ============================================================================
// Mock Transport
// ============================================================================

/// One scripted outcome for a source path
#[allow(dead_code)]
pub enum Scripted {
    /// Succeed, reporting this many bytes moved
    Succeed(u64),
    /// Fail recoverably with this issue kind
    Fail(IssueKind, &'static str),
    /// Abort the job
    Fatal(FatalKind, &'static str),
}

/// In-memory transport with per-path scripted outcomes
///
/// Paths without a script (or whose script queue has drained) succeed with
/// `default_bytes`. Each `transfer` call consumes one scripted entry, so a
/// queue like `[Fail, Fail, Succeed]` exercises retry-then-recover.
pub struct MockTransport {
    scripts: Mutex<HashMap<PathBuf, VecDeque<Scripted>>>,
    default_bytes: u64,
    delay: Option<Duration>,
    /// Cancel the job's token at the start of the Nth transfer call
    cancel_at_call: Option<u64>,
    pub calls: AtomicU64,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_bytes: 1024,
            delay: None,
            cancel_at_call: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_default_bytes(mut self, bytes: u64) -> Self {
        self.default_bytes = bytes;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cancel_at_call(mut self, call: u64) -> Self {
        self.cancel_at_call = Some(call);
        self
    }

    pub fn script(self, source: impl Into<PathBuf>, outcomes: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.into(), outcomes.into());
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn transfer(
        &self,
        record: &ResolvedRecord,
        token: &CancelToken,
    ) -> Result<TransferOutcome, TransportFatal> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cancel_at_call == Some(call) {
            token.cancel();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&record.source)
            .and_then(VecDeque::pop_front);

        match scripted {
            None => Ok(TransferOutcome::success(
                record.size.unwrap_or(self.default_bytes),
            )),
            Some(Scripted::Succeed(bytes)) => Ok(TransferOutcome::success(bytes)),
            Some(Scripted::Fail(kind, message)) => Ok(TransferOutcome::failed(Issue::error(
                kind,
                Some(record.source.clone()),
                message,
            ))),
            Some(Scripted::Fatal(kind, message)) => Err(TransportFatal::new(kind, message)),
        }
    }

    async fn support_check(&self, _token: &CancelToken) -> SupportResult {
        SupportResult::supported()
    }

    async fn connection_check(&self, _token: &CancelToken) -> ConnectionResult {
        ConnectionResult {
            connected: true,
            message: None,
        }
    }
}

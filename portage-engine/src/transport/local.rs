//! Local-directory reference transport
//!
//! Moves files between two locally visible paths (the mounted file-share
//! case) with chunked async I/O. Data streams into a `.part` file that is
//! renamed into place only after every byte landed, so readers never see a
//! half-written target. The cancellation token is checked between chunks.
//!
//! I/O failures are classified into issue kinds and returned as recoverable
//! per-path outcomes; this transport has no job-level fatal conditions of
//! its own.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use portage_common::{
    CancelToken, DEFAULT_CHUNK_SIZE, Issue, IssueAttributes, IssueKind, ResolvedRecord,
};

use super::{
    ConnectionResult, SupportResult, TransferOutcome, TransportClient, TransportFatal,
};
use crate::events::{EventSink, JobEvent};

/// Suffix for in-flight target files
const PART_SUFFIX: &str = ".part";

/// Transport that copies files between locally visible paths
pub struct LocalDirTransport {
    chunk_size: usize,
    max_path_length: Option<usize>,
    events: EventSink,
}

impl LocalDirTransport {
    /// Create a transport with the default chunk size and no path limit
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_path_length: None,
            events: EventSink::disabled(),
        }
    }

    /// Override the I/O chunk size
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Declare a maximum supported path length
    #[must_use]
    pub fn with_max_path_length(mut self, limit: usize) -> Self {
        self.max_path_length = Some(limit);
        self
    }

    /// Emit per-chunk progress events through the given sink
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Stream `source` into `target` via a `.part` file
    ///
    /// Returns the byte count written, or a classified issue.
    async fn copy_file(
        &self,
        source: &Path,
        target: &Path,
        token: &CancelToken,
    ) -> Result<u64, Issue> {
        let metadata = tokio::fs::metadata(source).await.map_err(|e| {
            Issue::error(
                IssueKind::from_io_error(&e),
                Some(source.to_path_buf()),
                format!("cannot stat source: {e}"),
            )
        })?;

        if !metadata.is_file() {
            return Err(Issue::error(
                IssueKind::BadPath,
                Some(source.to_path_buf()),
                "source is not a regular file",
            ));
        }
        let expected = metadata.len();

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Issue::error(
                    IssueKind::from_io_error(&e),
                    Some(target.to_path_buf()),
                    format!("cannot create target directory: {e}"),
                )
            })?;
        }

        let part_path = part_path_for(target);

        let reader = File::open(source).await.map_err(|e| {
            Issue::error(
                IssueKind::from_io_error(&e),
                Some(source.to_path_buf()),
                format!("cannot open source: {e}"),
            )
        })?;
        let mut reader = BufReader::new(reader);

        let mut writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part_path)
            .await
            .map_err(|e| {
                Issue::error(
                    IssueKind::from_io_error(&e),
                    Some(target.to_path_buf()),
                    format!("cannot open target: {e}"),
                )
            })?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;

        loop {
            // Cancellation is observed between chunks, not mid-read
            if token.is_cancelled() {
                drop(writer);
                let _ = tokio::fs::remove_file(&part_path).await;
                let mut issue = Issue::warning(
                    IssueKind::Unknown,
                    Some(source.to_path_buf()),
                    "transfer canceled",
                );
                issue.attributes.insert(IssueAttributes::CANCELED);
                return Err(issue);
            }

            let read = reader.read(&mut buffer).await.map_err(|e| {
                Issue::error(
                    IssueKind::from_io_error(&e),
                    Some(source.to_path_buf()),
                    format!("read failed: {e}"),
                )
            })?;
            if read == 0 {
                break;
            }

            writer.write_all(&buffer[..read]).await.map_err(|e| {
                Issue::error(
                    IssueKind::from_io_error(&e),
                    Some(target.to_path_buf()),
                    format!("write failed: {e}"),
                )
            })?;

            written += read as u64;
            self.events.emit(JobEvent::PathProgress {
                path: source.to_path_buf(),
                bytes_transferred: written,
            });
        }

        writer.flush().await.map_err(|e| {
            Issue::error(
                IssueKind::from_io_error(&e),
                Some(target.to_path_buf()),
                format!("flush failed: {e}"),
            )
        })?;
        drop(writer);

        if written != expected {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(Issue::error(
                IssueKind::Io,
                Some(source.to_path_buf()),
                format!("size mismatch: expected {expected} bytes, wrote {written}"),
            ));
        }

        tokio::fs::rename(&part_path, target).await.map_err(|e| {
            Issue::error(
                IssueKind::from_io_error(&e),
                Some(target.to_path_buf()),
                format!("rename failed: {e}"),
            )
        })?;

        Ok(written)
    }
}

impl Default for LocalDirTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Sibling `.part` path for a target
fn part_path_for(target: &Path) -> std::path::PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PART_SUFFIX);
    std::path::PathBuf::from(name)
}

#[async_trait::async_trait]
impl TransportClient for LocalDirTransport {
    fn id(&self) -> &'static str {
        "share"
    }

    async fn transfer(
        &self,
        record: &ResolvedRecord,
        token: &CancelToken,
    ) -> Result<TransferOutcome, TransportFatal> {
        if let Some(limit) = self.max_path_length
            && record.target_path_length() > limit
        {
            return Ok(TransferOutcome::failed(Issue::error(
                IssueKind::PathTooLong,
                Some(record.target.clone()),
                format!("target path exceeds {limit} characters"),
            )));
        }

        match self.copy_file(&record.source, &record.target, token).await {
            Ok(bytes) => Ok(TransferOutcome::success(bytes)),
            Err(issue) => Ok(TransferOutcome::failed(issue)),
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

    fn max_path_length(&self) -> Option<usize> {
        self.max_path_length
    }
}

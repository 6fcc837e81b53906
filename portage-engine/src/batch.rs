//! On-disk batch files for persisted enumeration
//!
//! Bounds memory for multi-million-file datasets: instead of materializing
//! every record, the walk streams records into JSON batch files that roll
//! when either the byte or file-count ceiling is reached. Consumers then
//! transfer one batch at a time as an independent job.
//!
//! Each batch is one JSON document: an ordered record list plus a trailing
//! summary. Updates go through a temp file renamed into place, so a reader
//! never observes a torn document; with live-sync enabled the in-progress
//! batch is rewritten as the walk advances, and every batch is finalized
//! exactly once.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use portage_common::PathRecord;

/// Temp-file suffix used for atomic batch updates
const TEMP_SUFFIX: &str = ".tmp";

// =============================================================================
// Batch Documents
// =============================================================================

/// Trailing summary block of a batch file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of records in the batch
    pub file_count: u64,
    /// Sum of record size hints, in bytes
    pub byte_count: u64,
}

/// A complete batch document as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    /// Ordered serialized records
    pub records: Vec<PathRecord>,
    /// Trailing summary, finalized once the walk completes
    pub summary: BatchSummary,
}

/// Descriptor for one written batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDescriptor {
    /// On-disk location of the batch file
    pub path: PathBuf,
    /// Records in the batch
    pub file_count: u64,
    /// Byte total of the batch
    pub byte_count: u64,
}

/// Read and validate a batch file
///
/// Fails when the trailing summary disagrees with the record list.
pub fn read_batch(path: &Path) -> io::Result<BatchFile> {
    let text = fs::read_to_string(path)?;
    let batch: BatchFile = serde_json::from_str(&text)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let file_count = batch.records.len() as u64;
    let byte_count: u64 = batch.records.iter().filter_map(|r| r.size).sum();
    if batch.summary.file_count != file_count || batch.summary.byte_count != byte_count {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "batch summary mismatch in {}: summary says {} files / {} bytes, records say {} / {}",
                path.display(),
                batch.summary.file_count,
                batch.summary.byte_count,
                file_count,
                byte_count
            ),
        ));
    }
    Ok(batch)
}

// =============================================================================
// Batch Writer
// =============================================================================

/// Streams records into rolling batch files
pub struct BatchWriter {
    dir: PathBuf,
    max_bytes: u64,
    max_files: u64,
    live_sync: bool,
    current: Vec<PathRecord>,
    current_bytes: u64,
    next_index: u32,
    descriptors: Vec<BatchDescriptor>,
}

impl BatchWriter {
    /// Create a writer that places batch files in `dir`
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, max_files: u64, live_sync: bool) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: max_bytes.max(1),
            max_files: max_files.max(1),
            live_sync,
            current: Vec::new(),
            current_bytes: 0,
            next_index: 1,
            descriptors: Vec::new(),
        }
    }

    /// Append one record, rolling to a new batch when a ceiling is hit
    ///
    /// A record larger than the byte ceiling still lands, alone in its own
    /// batch; ceilings bound every multi-record batch.
    pub fn push(&mut self, record: PathRecord) -> io::Result<()> {
        let size = record.size.unwrap_or(0);

        let over_files = self.current.len() as u64 + 1 > self.max_files;
        let over_bytes = self.current_bytes + size > self.max_bytes;
        if !self.current.is_empty() && (over_files || over_bytes) {
            self.roll()?;
        }

        self.current.push(record);
        self.current_bytes += size;

        if self.live_sync {
            self.write_current()?;
        }
        Ok(())
    }

    /// Finish the walk: flush the open batch and return all descriptors
    pub fn finalize(mut self) -> io::Result<Vec<BatchDescriptor>> {
        if !self.current.is_empty() {
            self.roll()?;
        }
        Ok(self.descriptors)
    }

    /// Path of the batch currently being filled
    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("batch-{:05}.json", self.next_index))
    }

    /// Write the in-progress batch with its running summary
    fn write_current(&self) -> io::Result<()> {
        let batch = BatchFile {
            records: self.current.clone(),
            summary: BatchSummary {
                file_count: self.current.len() as u64,
                byte_count: self.current_bytes,
            },
        };
        let path = self.current_path();
        let temp = PathBuf::from(format!("{}{}", path.display(), TEMP_SUFFIX));
        let text = serde_json::to_string_pretty(&batch)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&temp, text)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    /// Finalize the open batch and start a new one
    fn roll(&mut self) -> io::Result<()> {
        self.write_current()?;
        self.descriptors.push(BatchDescriptor {
            path: self.current_path(),
            file_count: self.current.len() as u64,
            byte_count: self.current_bytes,
        });
        self.current.clear();
        self.current_bytes = 0;
        self.next_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, size: u64) -> PathRecord {
        let mut record = PathRecord::upload(format!("/data/{name}"));
        record.size = Some(size);
        record
    }

    fn write_records(
        dir: &Path,
        count: usize,
        size: u64,
        max_bytes: u64,
        max_files: u64,
    ) -> Vec<BatchDescriptor> {
        let mut writer = BatchWriter::new(dir, max_bytes, max_files, false);
        for i in 0..count {
            writer.push(record(&format!("f{i}"), size)).unwrap();
        }
        writer.finalize().unwrap()
    }

    #[test]
    fn test_rolls_on_file_ceiling() {
        let dir = TempDir::new().unwrap();
        let batches = write_records(dir.path(), 10, 1, u64::MAX, 3);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.file_count <= 3));
    }

    #[test]
    fn test_rolls_on_byte_ceiling() {
        let dir = TempDir::new().unwrap();
        let batches = write_records(dir.path(), 10, 100, 250, u64::MAX);
        assert!(batches.iter().all(|b| b.byte_count <= 250));
        assert_eq!(batches.len(), 5);
    }

    #[test]
    fn test_larger_ceiling_never_more_batches() {
        let dir_small = TempDir::new().unwrap();
        let dir_large = TempDir::new().unwrap();
        let small = write_records(dir_small.path(), 40, 10, 100, 7);
        let large = write_records(dir_large.path(), 40, 10, 200, 7);
        assert!(large.len() <= small.len());
    }

    #[test]
    fn test_oversized_record_gets_own_batch() {
        let dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::new(dir.path(), 100, 10, false);
        writer.push(record("small", 50)).unwrap();
        writer.push(record("huge", 5000)).unwrap();
        writer.push(record("small2", 50)).unwrap();
        let batches = writer.finalize().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].byte_count, 5000);
        assert_eq!(batches[1].file_count, 1);
    }

    #[test]
    fn test_round_trip_and_summary_validation() {
        let dir = TempDir::new().unwrap();
        let batches = write_records(dir.path(), 5, 10, u64::MAX, u64::MAX);
        assert_eq!(batches.len(), 1);

        let batch = read_batch(&batches[0].path).unwrap();
        assert_eq!(batch.records.len(), 5);
        assert_eq!(batch.summary.file_count, 5);
        assert_eq!(batch.summary.byte_count, 50);
    }

    #[test]
    fn test_read_rejects_tampered_summary() {
        let dir = TempDir::new().unwrap();
        let batches = write_records(dir.path(), 2, 10, u64::MAX, u64::MAX);

        let mut batch = read_batch(&batches[0].path).unwrap();
        batch.summary.byte_count = 999;
        fs::write(
            &batches[0].path,
            serde_json::to_string(&batch).unwrap(),
        )
        .unwrap();

        assert!(read_batch(&batches[0].path).is_err());
    }

    #[test]
    fn test_live_sync_writes_in_progress_batch() {
        let dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::new(dir.path(), u64::MAX, u64::MAX, true);
        writer.push(record("a", 10)).unwrap();
        writer.push(record("b", 20)).unwrap();

        // Readable mid-walk, summary reflects progress so far
        let path = dir.path().join("batch-00001.json");
        let batch = read_batch(&path).unwrap();
        assert_eq!(batch.summary.file_count, 2);
        assert_eq!(batch.summary.byte_count, 30);

        writer.finalize().unwrap();
        let batch = read_batch(&path).unwrap();
        assert_eq!(batch.summary.file_count, 2);
    }

    #[test]
    fn test_no_temp_files_after_finalize() {
        let dir = TempDir::new().unwrap();
        write_records(dir.path(), 10, 1, u64::MAX, 3);
        let leftover: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(TEMP_SUFFIX))
            .collect();
        assert!(leftover.is_empty());
    }
}

//! Path records - the unit of transfer work
//!
//! A [`PathRecord`] describes one file to move, in either direction.
//! Records arrive with optional fields (direction, target, filename) and
//! are resolved against the owning request's defaults exactly once, before
//! they are enqueued. After resolution a record is immutable for the rest
//! of its lifecycle: consumed by exactly one worker per attempt and
//! retained read-only in the issue log and final result.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// =============================================================================
// Transfer Direction
// =============================================================================

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Local file sent to the remote target
    Upload,
    /// Remote file fetched to the local target
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
        }
    }
}

// =============================================================================
// Path Record
// =============================================================================

/// One unit of transfer work as supplied by the caller or the enumerator
///
/// Unset fields are defaulted from the owning request when the record is
/// resolved. `order`, `metadata`, and `tag` are caller-assigned metadata
/// that the engine carries but never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    /// Source path (local for uploads, remote for downloads)
    pub source: PathBuf,

    /// Target directory; defaulted from the request when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,

    /// Target filename; defaults to the source filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_filename: Option<String>,

    /// Transfer direction; defaulted from the request when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<TransferDirection>,

    /// Size hint in bytes, filled in by enumeration when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Caller-assigned ordering key; metadata only, never an engine-enforced
    /// sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,

    /// Opaque client-specific metadata, passed through to the transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Caller-supplied tag, echoed back in events and issues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl PathRecord {
    /// Create a record with only the source path set
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
            target_filename: None,
            direction: None,
            size: None,
            order: None,
            metadata: None,
            tag: None,
        }
    }

    /// Create an upload record
    pub fn upload(source: impl Into<PathBuf>) -> Self {
        let mut record = Self::new(source);
        record.direction = Some(TransferDirection::Upload);
        record
    }

    /// Create a download record
    pub fn download(source: impl Into<PathBuf>) -> Self {
        let mut record = Self::new(source);
        record.direction = Some(TransferDirection::Download);
        record
    }

    /// Resolve this record against request-level defaults
    ///
    /// Applies the default direction and target directory for fields the
    /// record leaves unset, and combines the target directory with the
    /// target filename (falling back to the source filename) into the
    /// final target path. This happens exactly once, before the record is
    /// enqueued; the result is immutable.
    pub fn resolve(
        self,
        default_direction: Option<TransferDirection>,
        default_target: Option<&Path>,
        default_filename: Option<&str>,
    ) -> Result<ResolvedRecord, ResolveError> {
        let direction = self
            .direction
            .or(default_direction)
            .ok_or_else(|| ResolveError::MissingDirection {
                source: self.source.clone(),
            })?;

        let target_dir = match (&self.target, default_target) {
            (Some(target), _) => target.clone(),
            (None, Some(target)) => target.to_path_buf(),
            (None, None) => {
                return Err(ResolveError::MissingTarget {
                    source: self.source,
                });
            }
        };

        let filename = match self
            .target_filename
            .as_deref()
            .or(default_filename)
        {
            Some(name) => name.to_string(),
            None => self
                .source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| ResolveError::NoFilename {
                    source: self.source.clone(),
                })?,
        };

        Ok(ResolvedRecord {
            source: self.source,
            target: target_dir.join(&filename),
            target_filename: filename,
            direction,
            size: self.size,
            order: self.order,
            metadata: self.metadata,
            tag: self.tag,
        })
    }
}

// =============================================================================
// Resolved Record
// =============================================================================

/// A path record after one-time resolution against request defaults
///
/// Every field the engine requires is present; the record is immutable
/// from here on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// Source path
    pub source: PathBuf,
    /// Full target path (directory joined with the resolved filename)
    pub target: PathBuf,
    /// Resolved target filename
    pub target_filename: String,
    /// Resolved direction
    pub direction: TransferDirection,
    /// Size hint in bytes, when known
    pub size: Option<u64>,
    /// Caller-assigned ordering key
    pub order: Option<u64>,
    /// Opaque client-specific metadata
    pub metadata: Option<serde_json::Value>,
    /// Caller-supplied tag
    pub tag: Option<String>,
}

impl ResolvedRecord {
    /// Length in characters of the resolved target path
    ///
    /// Used by the long-path policy to compare against a transport's
    /// maximum supported path length.
    pub fn target_path_length(&self) -> usize {
        self.target.as_os_str().len()
    }
}

// =============================================================================
// Resolve Errors
// =============================================================================

/// Failure to resolve a record against request defaults
///
/// These are configuration problems: the record and the request disagree
/// on required fields. They surface before the record is ever enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Neither the record nor the request specify a direction
    MissingDirection { source: PathBuf },
    /// Neither the record nor the request specify a target path
    MissingTarget { source: PathBuf },
    /// No target filename given and the source path has no usable filename
    NoFilename { source: PathBuf },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDirection { source } => {
                write!(f, "no direction for record: {}", source.display())
            }
            Self::MissingTarget { source } => {
                write!(f, "no target path for record: {}", source.display())
            }
            Self::NoFilename { source } => {
                write!(f, "no usable filename for record: {}", source.display())
            }
        }
    }
}

impl std::error::Error for ResolveError {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_from_request() {
        let record = PathRecord::new("/data/report.pdf");
        let resolved = record
            .resolve(
                Some(TransferDirection::Upload),
                Some(Path::new("/remote/inbox")),
                None,
            )
            .unwrap();

        assert_eq!(resolved.direction, TransferDirection::Upload);
        assert_eq!(resolved.target, PathBuf::from("/remote/inbox/report.pdf"));
        assert_eq!(resolved.target_filename, "report.pdf");
    }

    #[test]
    fn test_resolve_record_fields_win() {
        let mut record = PathRecord::download("/remote/a.bin");
        record.target = Some(PathBuf::from("/local/save"));
        record.target_filename = Some("renamed.bin".to_string());

        let resolved = record
            .resolve(
                Some(TransferDirection::Upload),
                Some(Path::new("/elsewhere")),
                None,
            )
            .unwrap();

        assert_eq!(resolved.direction, TransferDirection::Download);
        assert_eq!(resolved.target, PathBuf::from("/local/save/renamed.bin"));
    }

    #[test]
    fn test_resolve_missing_direction() {
        let record = PathRecord::new("/data/a.txt");
        let err = record
            .resolve(None, Some(Path::new("/out")), None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingDirection { .. }));
    }

    #[test]
    fn test_resolve_missing_target() {
        let record = PathRecord::upload("/data/a.txt");
        let err = record.resolve(None, None, None).unwrap_err();
        assert!(matches!(err, ResolveError::MissingTarget { .. }));
    }

    #[test]
    fn test_resolve_no_filename() {
        let record = PathRecord::upload("/");
        let err = record
            .resolve(None, Some(Path::new("/out")), None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoFilename { .. }));
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut record = PathRecord::upload("/data/big.iso");
        record.size = Some(4096);
        record.tag = Some("batch-7".to_string());

        let json = serde_json::to_string(&record).unwrap();
        let back: PathRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(format!("{}", TransferDirection::Upload), "upload");
        assert_eq!(format!("{}", TransferDirection::Download), "download");
    }
}

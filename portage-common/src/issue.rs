//! Issues - recorded per-path and job-level problems
//!
//! An [`Issue`] is a value, not an error: path-level problems never unwind
//! the call stack. Every issue carries an attribute bitmask holding exactly
//! one severity bit (error or warning) plus zero or more classification
//! bits, and a machine-readable [`IssueKind`] string for clients that make
//! decisions based on the failure class (retry toggles, not-found counting).

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Issue Attributes
// =============================================================================

/// Attribute bitmask attached to every issue
///
/// Exactly one of [`IssueAttributes::ERROR`] / [`IssueAttributes::WARNING`]
/// is set; the [`Issue`] constructors enforce this. Classification bits
/// mirror [`IssueKind`] so consumers can test membership without string
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueAttributes(u32);

impl IssueAttributes {
    /// Terminal for the path unless a retry succeeds
    pub const ERROR: Self = Self(1 << 0);
    /// Informational; never fails the job
    pub const WARNING: Self = Self(1 << 1);
    /// Source file was not found
    pub const FILE_NOT_FOUND: Self = Self(1 << 2);
    /// Access to the path was denied
    pub const PERMISSION: Self = Self(1 << 3);
    /// The path is malformed or rejected by the transport
    pub const BAD_PATH: Self = Self(1 << 4);
    /// The resolved path exceeds the transport's maximum length
    pub const PATH_TOO_LONG: Self = Self(1 << 5);
    /// The operation deadline elapsed
    pub const TIMEOUT: Self = Self(1 << 6);
    /// The transport reported a connection problem
    pub const CONNECTION: Self = Self(1 << 7);
    /// The operation was preempted by cancellation
    pub const CANCELED: Self = Self(1 << 8);

    /// Empty attribute set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// True when every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two attribute sets
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set every bit of `other` in `self`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when the error severity bit is set
    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }

    /// True when the warning severity bit is set
    pub const fn is_warning(self) -> bool {
        self.contains(Self::WARNING)
    }
}

impl std::ops::BitOr for IssueAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// Issue Kind
// =============================================================================

/// Machine-readable classification of an issue
///
/// Serialized as snake_case strings; the job engine keys its per-class
/// retry toggles off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Source file does not exist
    FileNotFound,
    /// Access denied
    Permission,
    /// Malformed or rejected path
    BadPath,
    /// Path exceeds the transport's maximum length
    PathTooLong,
    /// Operation deadline elapsed
    Timeout,
    /// Transport-level connection problem
    Connection,
    /// Local I/O failure
    Io,
    /// Invalid or unexpected transport behavior
    Protocol,
    /// Unclassified
    Unknown,
}

impl IssueKind {
    /// String representation used in serialized issues and client codes
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::Permission => "permission",
            Self::BadPath => "bad_path",
            Self::PathTooLong => "path_too_long",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Unknown => "unknown",
        }
    }

    /// Parse from the string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file_not_found" => Some(Self::FileNotFound),
            "permission" => Some(Self::Permission),
            "bad_path" => Some(Self::BadPath),
            "path_too_long" => Some(Self::PathTooLong),
            "timeout" => Some(Self::Timeout),
            "connection" => Some(Self::Connection),
            "io" => Some(Self::Io),
            "protocol" => Some(Self::Protocol),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Classification bit carried in the attribute bitmask
    pub fn attribute_bit(&self) -> IssueAttributes {
        match self {
            Self::FileNotFound => IssueAttributes::FILE_NOT_FOUND,
            Self::Permission => IssueAttributes::PERMISSION,
            Self::BadPath => IssueAttributes::BAD_PATH,
            Self::PathTooLong => IssueAttributes::PATH_TOO_LONG,
            Self::Timeout => IssueAttributes::TIMEOUT,
            Self::Connection => IssueAttributes::CONNECTION,
            Self::Io | Self::Protocol | Self::Unknown => IssueAttributes::empty(),
        }
    }

    /// Classify a std::io error into an issue kind
    pub fn from_io_error(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound,
            std::io::ErrorKind::PermissionDenied => Self::Permission,
            std::io::ErrorKind::InvalidInput => Self::BadPath,
            std::io::ErrorKind::TimedOut => Self::Timeout,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::BrokenPipe => Self::Connection,
            _ => Self::Io,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Issue
// =============================================================================

/// A recorded per-path or job-level problem
///
/// Job-level issues carry no path. Issues are appended to the job's issue
/// log and retained read-only in the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Path the issue applies to; `None` for job-level issues
    pub path: Option<PathBuf>,
    /// Attribute bitmask (severity + classification bits)
    pub attributes: IssueAttributes,
    /// Machine-readable classification
    pub kind: IssueKind,
    /// Human-readable description
    pub message: String,
    /// Transport-specific code, when the client supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_code: Option<String>,
    /// 1-based attempt number the issue occurred on
    pub attempt: u32,
    /// Maximum retry attempts that applied to this path
    pub max_attempts: u32,
    /// When the issue was recorded
    pub timestamp: DateTime<Utc>,
}

impl Issue {
    /// Create an error-severity issue
    pub fn error(kind: IssueKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path,
            attributes: IssueAttributes::ERROR | kind.attribute_bit(),
            kind,
            message: message.into(),
            client_code: None,
            attempt: 1,
            max_attempts: 0,
            timestamp: Utc::now(),
        }
    }

    /// Create a warning-severity issue; warnings never fail the job
    pub fn warning(kind: IssueKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path,
            attributes: IssueAttributes::WARNING | kind.attribute_bit(),
            kind,
            message: message.into(),
            client_code: None,
            attempt: 1,
            max_attempts: 0,
            timestamp: Utc::now(),
        }
    }

    /// Set the attempt counters recorded with the issue
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self
    }

    /// Attach a transport-specific code
    #[must_use]
    pub fn with_client_code(mut self, code: impl Into<String>) -> Self {
        self.client_code = Some(code.into());
        self
    }

    /// True for error-severity issues
    pub fn is_error(&self) -> bool {
        self.attributes.is_error()
    }

    /// True for warning-severity issues
    pub fn is_warning(&self) -> bool {
        self.attributes.is_warning()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_error() { "error" } else { "warning" };
        match &self.path {
            Some(path) => write!(
                f,
                "{severity} [{}] {}: {}",
                self.kind,
                path.display(),
                self.message
            ),
            None => write!(f, "{severity} [{}] {}", self.kind, self.message),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_contains_and_union() {
        let attrs = IssueAttributes::ERROR | IssueAttributes::FILE_NOT_FOUND;
        assert!(attrs.contains(IssueAttributes::ERROR));
        assert!(attrs.contains(IssueAttributes::FILE_NOT_FOUND));
        assert!(!attrs.contains(IssueAttributes::WARNING));
        assert!(!attrs.contains(IssueAttributes::TIMEOUT));
    }

    #[test]
    fn test_error_issue_has_exactly_one_severity() {
        let issue = Issue::error(IssueKind::FileNotFound, None, "missing");
        assert!(issue.is_error());
        assert!(!issue.is_warning());
        assert!(issue.attributes.contains(IssueAttributes::FILE_NOT_FOUND));
    }

    #[test]
    fn test_warning_issue_has_exactly_one_severity() {
        let issue = Issue::warning(IssueKind::Io, Some(PathBuf::from("/a")), "slow disk");
        assert!(issue.is_warning());
        assert!(!issue.is_error());
    }

    #[test]
    fn test_kind_round_trip() {
        let kinds = [
            IssueKind::FileNotFound,
            IssueKind::Permission,
            IssueKind::BadPath,
            IssueKind::PathTooLong,
            IssueKind::Timeout,
            IssueKind::Connection,
            IssueKind::Io,
            IssueKind::Protocol,
            IssueKind::Unknown,
        ];
        for kind in kinds {
            assert_eq!(IssueKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(IssueKind::parse("bogus"), None);
    }

    #[test]
    fn test_kind_from_io_error() {
        use std::io::{Error, ErrorKind};
        assert_eq!(
            IssueKind::from_io_error(&Error::new(ErrorKind::NotFound, "x")),
            IssueKind::FileNotFound
        );
        assert_eq!(
            IssueKind::from_io_error(&Error::new(ErrorKind::PermissionDenied, "x")),
            IssueKind::Permission
        );
        assert_eq!(
            IssueKind::from_io_error(&Error::new(ErrorKind::BrokenPipe, "x")),
            IssueKind::Connection
        );
        assert_eq!(
            IssueKind::from_io_error(&Error::other("x")),
            IssueKind::Io
        );
    }

    #[test]
    fn test_issue_serde_round_trip() {
        let issue = Issue::error(
            IssueKind::Timeout,
            Some(PathBuf::from("/data/slow.bin")),
            "deadline elapsed",
        )
        .with_attempt(2, 3)
        .with_client_code("E_TIMEOUT");

        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(issue, back);
    }

    #[test]
    fn test_issue_display() {
        let issue = Issue::error(IssueKind::Permission, Some(PathBuf::from("/secret")), "denied");
        let text = format!("{issue}");
        assert!(text.contains("error"));
        assert!(text.contains("permission"));
        assert!(text.contains("/secret"));
    }
}

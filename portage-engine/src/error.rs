//! Job-level and usage errors
//!
//! Per-path problems are [`portage_common::Issue`] values and never appear
//! here. [`JobError`] covers the two classes that do unwind to the caller:
//! job-level fatal conditions (authentication failure, connection loss,
//! exhausted job-level retries) and programming/usage errors (invalid
//! configuration, use after shutdown, unsupported operations).

use std::fmt;

use portage_common::IssueKind;

/// Fatal condition classes that terminate a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// The transport rejected the credentials
    Authentication,
    /// The transport reported an unrecoverable connection loss
    ConnectionLost,
    /// A job-level operation exhausted its retries
    RetriesExhausted,
    /// Enumeration found a path longer than the transport supports and the
    /// skip-too-long policy was disabled
    PathTooLong,
    /// Persisting enumeration output to disk failed
    Storage,
}

impl FatalKind {
    /// String representation used in results and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::ConnectionLost => "connection_lost",
            Self::RetriesExhausted => "retries_exhausted",
            Self::PathTooLong => "path_too_long",
            Self::Storage => "storage",
        }
    }

    /// The issue kind recorded for a job-level issue of this class
    pub fn issue_kind(&self) -> IssueKind {
        match self {
            Self::Authentication => IssueKind::Permission,
            Self::ConnectionLost => IssueKind::Connection,
            Self::RetriesExhausted => IssueKind::Unknown,
            Self::PathTooLong => IssueKind::PathTooLong,
            Self::Storage => IssueKind::Io,
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced from job and enumerator entry points
#[derive(Debug)]
pub enum JobError {
    /// The request and transport disagree on required fields, or an option
    /// value is out of range
    Configuration(String),
    /// An operation was invoked in a state that does not permit it
    /// (e.g. `complete` called twice, `add_path` after `complete`)
    InvalidState(&'static str),
    /// The job was shut down; no further operations are possible
    Disposed,
    /// The cancellation token was already tripped
    Canceled,
    /// The transport does not support the requested operation
    Unsupported(&'static str),
    /// A job-level fatal condition stopped processing
    Fatal { kind: FatalKind, message: String },
}

impl JobError {
    /// Build a fatal error
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidState(op) => write!(f, "invalid state for operation: {op}"),
            Self::Disposed => write!(f, "job has been shut down"),
            Self::Canceled => write!(f, "operation canceled"),
            Self::Unsupported(op) => write!(f, "unsupported operation: {op}"),
            Self::Fatal { kind, message } => write!(f, "fatal {kind}: {message}"),
        }
    }
}

impl std::error::Error for JobError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let err = JobError::Configuration("missing target".to_string());
        assert!(format!("{err}").contains("missing target"));

        let err = JobError::fatal(FatalKind::Authentication, "bad credentials");
        let text = format!("{err}");
        assert!(text.contains("fatal"));
        assert!(text.contains("authentication"));
        assert!(text.contains("bad credentials"));
    }

    #[test]
    fn test_fatal_kind_issue_mapping() {
        assert_eq!(
            FatalKind::ConnectionLost.issue_kind(),
            IssueKind::Connection
        );
        assert_eq!(FatalKind::PathTooLong.issue_kind(), IssueKind::PathTooLong);
    }
}

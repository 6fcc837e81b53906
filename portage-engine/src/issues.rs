//! Append-only issue ledger
//!
//! Order-preserving and thread-safe: `append` hands back a monotonically
//! increasing index and `snapshot` returns the entries appended before the
//! call, safe to take while workers are still appending.

use std::sync::Mutex;

use portage_common::Issue;

/// Thread-safe, append-only ledger of per-path and job-level issues
#[derive(Debug, Default)]
pub struct IssueLog {
    entries: Mutex<Vec<Issue>>,
}

impl IssueLog {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an issue, returning its assigned index
    pub fn append(&self, issue: Issue) -> usize {
        let mut entries = self.entries.lock().expect("issue log lock poisoned");
        entries.push(issue);
        entries.len() - 1
    }

    /// Ordered copy of the entries appended before this call
    pub fn snapshot(&self) -> Vec<Issue> {
        self.entries
            .lock()
            .expect("issue log lock poisoned")
            .clone()
    }

    /// Number of recorded issues
    pub fn len(&self) -> usize {
        self.entries.lock().expect("issue log lock poisoned").len()
    }

    /// True when no issues have been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one error-severity issue is recorded
    ///
    /// Warnings alone never make this true (and never fail the job).
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .expect("issue log lock poisoned")
            .iter()
            .any(Issue::is_error)
    }
}

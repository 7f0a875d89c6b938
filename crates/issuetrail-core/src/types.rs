use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An application error selected for reporting by the host's failure hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedError {
    pub message: String,
    #[serde(rename = "file")]
    pub source_file: String,
    #[serde(rename = "line")]
    pub source_line: u32,
    #[serde(rename = "trace", default)]
    pub stack_trace: String,
    #[serde(rename = "status", default = "default_status")]
    pub status_code: u16,
}

fn default_status() -> u16 {
    500
}

impl CapturedError {
    pub fn new(
        message: impl Into<String>,
        source_file: impl Into<String>,
        source_line: u32,
        status_code: u16,
    ) -> Self {
        Self {
            message: message.into(),
            source_file: source_file.into(),
            source_line,
            stack_trace: String::new(),
            status_code,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }

    /// `file:line` as shown to humans.
    pub fn location(&self) -> String {
        format!("{}:{}", self.source_file, self.source_line)
    }
}

/// Deduplication key of an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier the tracker assigned to an issue. Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u64);

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Values written by a `put`. The store stamps the expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub issue_id: IssueId,
    pub occurrence_count: u64,
}

impl Occurrence {
    pub fn first(issue_id: IssueId) -> Self {
        Self {
            issue_id,
            occurrence_count: 1,
        }
    }
}

/// Per-fingerprint lifecycle state owned by an occurrence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub fingerprint: Fingerprint,
    pub issue_id: IssueId,
    pub occurrence_count: u64,
    pub expires_at: DateTime<Utc>,
}

impl LifecycleRecord {
    pub fn new(fingerprint: Fingerprint, occurrence: Occurrence, expires_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            issue_id: occurrence.issue_id,
            occurrence_count: occurrence.occurrence_count,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The occurrence that the next observation of this error represents.
    pub fn next_occurrence(&self) -> Occurrence {
        Occurrence {
            issue_id: self.issue_id,
            occurrence_count: self.occurrence_count + 1,
        }
    }
}

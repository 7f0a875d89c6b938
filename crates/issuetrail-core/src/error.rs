use crate::types::{Fingerprint, IssueId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    /// `now + ttl` is not a representable timestamp.
    #[error("TTL of {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker could not be reached (connection refused, DNS, timeout).
    #[error("Tracker unavailable: {0}")]
    Unavailable(String),

    /// The tracker answered with a non-success status.
    #[error("Tracker rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The tracker answered 2xx but the body could not be understood.
    #[error("Invalid tracker response: {0}")]
    InvalidResponse(String),
}

impl TrackerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TrackerError::Rejected { status: 429, .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::Unavailable(_) => true,
            TrackerError::Rejected { status, .. } => *status == 429 || *status >= 500,
            TrackerError::InvalidResponse(_) => false,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::Unavailable(_) => "tracker_unavailable",
            TrackerError::Rejected { .. } => "tracker_rejected",
            TrackerError::InvalidResponse(_) => "tracker_invalid_response",
        }
    }
}

/// Failure of one report. Never fatal beyond the error it concerns.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Lookup could not complete; whether the error was seen before is unknown.
    #[error("Occurrence store unavailable for {fingerprint}: {source}")]
    StoreUnavailable {
        fingerprint: Fingerprint,
        #[source]
        source: StoreError,
    },

    #[error("Tracker call failed for {fingerprint}: {source}")]
    Tracker {
        fingerprint: Fingerprint,
        #[source]
        source: TrackerError,
    },

    /// The tracker side effect happened but the record could not be written.
    #[error("Issue {issue_id} updated but record for {fingerprint} not saved: {source}")]
    RecordNotSaved {
        fingerprint: Fingerprint,
        issue_id: IssueId,
        occurrence_count: u64,
        #[source]
        source: StoreError,
    },
}

impl LifecycleError {
    /// Whether re-running the whole report later is safe and useful.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::StoreUnavailable { .. } => true,
            LifecycleError::Tracker { source, .. } => source.is_retryable(),
            LifecycleError::RecordNotSaved { .. } => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::StoreUnavailable { .. } => "store_unavailable",
            LifecycleError::Tracker { source, .. } => source.kind(),
            LifecycleError::RecordNotSaved { .. } => "record_not_saved",
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            LifecycleError::StoreUnavailable { fingerprint, .. }
            | LifecycleError::Tracker { fingerprint, .. }
            | LifecycleError::RecordNotSaved { fingerprint, .. } => fingerprint,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16) -> TrackerError {
        TrackerError::Rejected {
            status,
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_tracker_retry_classification() {
        assert!(TrackerError::Unavailable("timeout".into()).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(rejected(502).is_retryable());
        assert!(!rejected(401).is_retryable());
        assert!(!rejected(422).is_retryable());
        assert!(!TrackerError::InvalidResponse("no number".into()).is_retryable());
        assert!(rejected(429).is_rate_limited());
    }

    #[test]
    fn test_record_not_saved_is_final() {
        let err = LifecycleError::RecordNotSaved {
            fingerprint: Fingerprint::new("fp"),
            issue_id: IssueId(1),
            occurrence_count: 1,
            source: StoreError::Timeout,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "record_not_saved");
    }

    #[test]
    fn test_lookup_failure_is_retryable() {
        let err = LifecycleError::StoreUnavailable {
            fingerprint: Fingerprint::new("fp"),
            source: StoreError::Unavailable("connection reset".into()),
        };
        assert!(err.is_retryable());
        assert_eq!(err.fingerprint().as_str(), "fp");
    }
}

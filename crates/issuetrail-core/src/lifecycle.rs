//! Create-or-comment orchestration for captured errors.
//!
//! One call to [`LifecycleManager::report`] handles one occurrence: look the
//! fingerprint up, open an issue if it is unseen (or its record expired),
//! otherwise comment on the linked issue, then write the refreshed record.
//!
//! The manager holds no locks. Two concurrent reports of an unseen fingerprint
//! can both miss the lookup and both open an issue; the later `put` wins and
//! the other issue loses its record. Callers that need strict one-issue-per-
//! window must serialize reports per fingerprint.
//!
//! A report interrupted between the tracker call and the `put` leaves the
//! tracker ahead of the store: after a create, the issue has no record and the
//! next occurrence opens another one; after a comment, the count is one behind.

use crate::clock::{Clock, SystemClock};
use crate::config::ReporterConfig;
use crate::error::{LifecycleError, LifecycleResult, StoreError};
use crate::fingerprint::fingerprint_error;
use crate::render::{issue_body, issue_title, occurrence_comment};
use crate::store::OccurrenceStore;
use crate::tracker::{NewIssue, TrackerClient};
use crate::types::{CapturedError, Fingerprint, IssueId, LifecycleRecord, Occurrence};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What a successful report did on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReportOutcome {
    Created {
        fingerprint: Fingerprint,
        issue_id: IssueId,
    },
    Commented {
        fingerprint: Fingerprint,
        issue_id: IssueId,
        occurrence_count: u64,
    },
}

impl ReportOutcome {
    pub fn issue_id(&self) -> IssueId {
        match self {
            ReportOutcome::Created { issue_id, .. } | ReportOutcome::Commented { issue_id, .. } => {
                *issue_id
            }
        }
    }

    pub fn occurrence_count(&self) -> u64 {
        match self {
            ReportOutcome::Created { .. } => 1,
            ReportOutcome::Commented {
                occurrence_count, ..
            } => *occurrence_count,
        }
    }
}

pub struct LifecycleManager<S, T> {
    store: S,
    tracker: T,
    config: Arc<ReporterConfig>,
    clock: Arc<dyn Clock>,
}

impl<S, T> LifecycleManager<S, T>
where
    S: OccurrenceStore,
    T: TrackerClient,
{
    pub fn new(store: S, tracker: T, config: Arc<ReporterConfig>) -> Self {
        Self::with_clock(store, tracker, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, tracker: T, config: Arc<ReporterConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tracker,
            config,
            clock,
        }
    }

    /// Report one occurrence of `error`.
    pub async fn report(&self, error: &CapturedError) -> LifecycleResult<ReportOutcome> {
        let fp = fingerprint_error(error);
        info!(
            fingerprint = %fp.short(),
            status = error.status_code,
            location = %error.location(),
            "handling captured error"
        );

        let existing = match self.lookup(&fp).await {
            Ok(existing) => existing,
            Err(source) => {
                warn!(fingerprint = %fp.short(), error = %source, "occurrence lookup failed, report deferred");
                return Err(LifecycleError::StoreUnavailable {
                    fingerprint: fp,
                    source,
                });
            }
        };

        match existing {
            None => self.open_issue(fp, error).await,
            Some(record) => self.add_occurrence(record).await,
        }
    }

    async fn open_issue(&self, fp: Fingerprint, error: &CapturedError) -> LifecycleResult<ReportOutcome> {
        let issue = NewIssue {
            title: issue_title(error),
            body: issue_body(error, 1),
            labels: self.config.labels.clone(),
        };

        let issue_id = match self.tracker.create_issue(&issue).await {
            Ok(id) => id,
            Err(source) => {
                error!(fingerprint = %fp.short(), kind = source.kind(), error = %source, "failed to create issue");
                return Err(LifecycleError::Tracker {
                    fingerprint: fp,
                    source,
                });
            }
        };
        info!(fingerprint = %fp.short(), issue = %issue_id, "created issue");

        self.save(fp.clone(), Occurrence::first(issue_id)).await?;
        Ok(ReportOutcome::Created {
            fingerprint: fp,
            issue_id,
        })
    }

    async fn add_occurrence(&self, record: LifecycleRecord) -> LifecycleResult<ReportOutcome> {
        let next = record.next_occurrence();
        let body = occurrence_comment(next.occurrence_count, self.clock.now());
        let fp = record.fingerprint;

        if let Err(source) = self.tracker.add_comment(next.issue_id, &body).await {
            error!(
                fingerprint = %fp.short(),
                issue = %next.issue_id,
                count = next.occurrence_count,
                kind = source.kind(),
                error = %source,
                "failed to add occurrence comment"
            );
            return Err(LifecycleError::Tracker {
                fingerprint: fp,
                source,
            });
        }
        info!(
            fingerprint = %fp.short(),
            issue = %next.issue_id,
            count = next.occurrence_count,
            "added occurrence comment"
        );

        self.save(fp.clone(), next).await?;
        Ok(ReportOutcome::Commented {
            fingerprint: fp,
            issue_id: next.issue_id,
            occurrence_count: next.occurrence_count,
        })
    }

    async fn lookup(&self, fp: &Fingerprint) -> Result<Option<LifecycleRecord>, StoreError> {
        bounded(self.config.store_timeout, self.store.get(fp)).await
    }

    async fn save(&self, fp: Fingerprint, occurrence: Occurrence) -> LifecycleResult<()> {
        let written = bounded(
            self.config.store_timeout,
            self.store.put(&fp, occurrence, self.config.ttl),
        )
        .await;

        match written {
            Ok(_) => Ok(()),
            Err(source) => {
                error!(
                    fingerprint = %fp.short(),
                    issue = %occurrence.issue_id,
                    count = occurrence.occurrence_count,
                    error = %source,
                    "tracker updated but occurrence record not saved"
                );
                Err(LifecycleError::RecordNotSaved {
                    fingerprint: fp,
                    issue_id: occurrence.issue_id,
                    occurrence_count: occurrence.occurrence_count,
                    source,
                })
            }
        }
    }
}

async fn bounded<F, R>(limit: Duration, fut: F) -> Result<R, StoreError>
where
    F: Future<Output = Result<R, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

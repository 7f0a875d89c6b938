use crate::error::TrackerError;
use crate::types::IssueId;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Issue to be opened on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// External issue tracker. Both calls go over the network and may fail.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueId, TrackerError>;

    async fn add_comment(&self, issue_id: IssueId, body: &str) -> Result<(), TrackerError>;
}

#[async_trait]
impl<T: TrackerClient + ?Sized> TrackerClient for Arc<T> {
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueId, TrackerError> {
        (**self).create_issue(issue).await
    }

    async fn add_comment(&self, issue_id: IssueId, body: &str) -> Result<(), TrackerError> {
        (**self).add_comment(issue_id, body).await
    }
}

use crate::config::{ConfigError, GithubConfig};
use crate::requests::{comment_body, create_issue_body};
use crate::responses::{error_message, parse_created_issue};
use async_trait::async_trait;
use issuetrail_core::error::TrackerError;
use issuetrail_core::tracker::{NewIssue, TrackerClient};
use issuetrail_core::types::IssueId;
use reqwest::{header, Client, Response, StatusCode};
use tracing::{debug, info, warn};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// GitHub Issues API client.
#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    config: GithubConfig,
    repo_url: String,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Self::with_http_client(config, http)
    }

    /// Use a preconfigured reqwest client (custom timeouts, proxies).
    pub fn with_http_client(config: GithubConfig, http: Client) -> Result<Self, ConfigError> {
        config.validate()?;
        let repo_url = config.repo_url();
        Ok(Self {
            http,
            config,
            repo_url,
        })
    }

    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<Response, TrackerError> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.token)
            .header(header::ACCEPT, ACCEPT)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(header::USER_AGENT, &self.config.user_agent)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = error_message(&text);
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            warn!("GitHub refused {} with HTTP {}: {}", url, status.as_u16(), message);
        }
        Err(TrackerError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_error(e: reqwest::Error) -> TrackerError {
    if e.is_timeout() {
        TrackerError::Unavailable(format!("request timed out: {}", e))
    } else if e.is_connect() {
        TrackerError::Unavailable(format!("connection failed: {}", e))
    } else {
        TrackerError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl TrackerClient for GithubClient {
    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueId, TrackerError> {
        let url = format!("{}/issues", self.repo_url);
        let response = self.post(&url, &create_issue_body(issue)).await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        let issue_id = parse_created_issue(&text)?;
        info!(
            "Created issue {} in {}, HTTP status: {}",
            issue_id, self.config.repository, status
        );
        Ok(issue_id)
    }

    async fn add_comment(&self, issue_id: IssueId, body: &str) -> Result<(), TrackerError> {
        let url = format!("{}/issues/{}/comments", self.repo_url, issue_id.0);
        let response = self.post(&url, &comment_body(body)).await?;
        info!(
            "Added comment to issue {} in {}, HTTP status: {}",
            issue_id,
            self.config.repository,
            response.status().as_u16()
        );
        Ok(())
    }
}

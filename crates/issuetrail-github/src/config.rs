use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("issuetrail/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GitHub token is empty")]
    MissingToken,

    #[error("Repository must be in owner/repo form, got {0:?}")]
    InvalidRepository(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Target repository, `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Repository {
    owner: String,
    name: String,
}

impl Repository {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for Repository {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRepository(s.to_string());
        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid_part = |p: &str| {
            !p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_part(owner) || !valid_part(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for Repository {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Repository> for String {
    fn from(repo: Repository) -> Self {
        repo.to_string()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Connection settings for the GitHub Issues API.
#[derive(Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    pub repository: Repository,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl GithubConfig {
    pub fn new(token: impl Into<String>, repository: Repository) -> Self {
        Self {
            token: token.into(),
            repository,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{api_base}/repos/{owner}/{repo}`
    pub fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_base.trim_end_matches('/'),
            self.repository.owner(),
            self.repository.name()
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }
}

// Keeps the token out of logs.
impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &"<redacted>")
            .field("repository", &self.repository)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

use anyhow::Context;
use clap::{Args, ValueEnum};
use issuetrail_core::config::{ReporterConfig, MAX_TTL};
use issuetrail_github::config::{GithubConfig, Repository, DEFAULT_API_BASE};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In-process map; only for a single instance
    Memory,
    /// Shared Valkey/Redis cache
    Valkey,
}

/// Tracker and occurrence-store settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ReporterArgs {
    /// GitHub token with permission to open issues
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,
    /// Target repository (owner/repo)
    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: String,
    /// Labels applied to newly created issues (comma-separated)
    #[arg(long, env = "GITHUB_LABELS", value_delimiter = ',', default_value = "bug")]
    pub labels: Vec<String>,
    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_BASE)]
    pub github_api_url: String,
    /// Timeout for a single tracker request, in seconds
    #[arg(long, env = "GITHUB_TIMEOUT", default_value_t = 10)]
    pub tracker_timeout: u64,
    /// Tracking window in seconds
    #[arg(long, env = "ERROR_ISSUE_CACHE_TTL", default_value_t = 3600)]
    pub ttl: u64,
    /// Timeout for a single store operation, in seconds
    #[arg(long, env = "ISSUETRAIL_STORE_TIMEOUT", default_value_t = 5)]
    pub store_timeout: u64,
    /// Occurrence store backend
    #[arg(long, env = "ISSUETRAIL_STORE", value_enum, default_value = "memory")]
    pub store: StoreKind,
    /// Valkey/Redis URL, required with --store valkey
    #[arg(long, env = "ISSUETRAIL_VALKEY_URL")]
    pub valkey_url: Option<String>,
    /// Key prefix inside the shared cache
    #[arg(long, env = "ISSUETRAIL_VALKEY_NAMESPACE", default_value = "issuetrail")]
    pub valkey_namespace: String,
    /// Connection pool size for the shared cache
    #[arg(long, env = "ISSUETRAIL_VALKEY_POOL", default_value_t = 8)]
    pub valkey_pool_size: usize,
}

impl ReporterArgs {
    pub fn reporter_config(&self) -> anyhow::Result<ReporterConfig> {
        let ttl = Duration::from_secs(self.ttl.max(1));
        if ttl > MAX_TTL {
            anyhow::bail!(
                "ERROR_ISSUE_CACHE_TTL of {}s exceeds the maximum of {}s",
                self.ttl,
                MAX_TTL.as_secs()
            );
        }
        let labels = self
            .labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(ReporterConfig::default()
            .with_labels(labels)
            .with_ttl(ttl)
            .with_store_timeout(Duration::from_secs(self.store_timeout.max(1))))
    }

    pub fn github_config(&self) -> anyhow::Result<GithubConfig> {
        let repository: Repository = self
            .github_repo
            .parse()
            .context("Invalid GITHUB_REPO")?;
        let config = GithubConfig::new(self.github_token.clone(), repository)
            .with_api_base(self.github_api_url.clone())
            .with_timeout(Duration::from_secs(self.tracker_timeout));
        config.validate().context("Invalid GitHub configuration")?;
        Ok(config)
    }

    pub fn valkey_url(&self) -> anyhow::Result<&str> {
        self.valkey_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("--valkey-url (ISSUETRAIL_VALKEY_URL) is required with --store valkey")
    }
}

/// Intake and worker settings for the long-running service.
#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// HTTP address the intake hook listens on
    #[arg(long, env = "ISSUETRAIL_HTTP", default_value = "127.0.0.1:8080")]
    pub http: String,
    /// HTTP status codes worth reporting (comma-separated)
    #[arg(long, env = "GITHUB_MONITOR_STATUSES", value_delimiter = ',', default_value = "500")]
    pub monitor_statuses: Vec<u16>,
    /// Name of the environment this instance runs in
    #[arg(long, env = "ISSUETRAIL_ENVIRONMENT", default_value = "production")]
    pub environment: String,
    /// Report errors from every environment, not only production
    #[arg(long)]
    pub report_all_environments: bool,
    /// Number of report workers
    #[arg(long, env = "ISSUETRAIL_WORKERS", default_value_t = 4)]
    pub workers: usize,
    /// Maximum number of pending reports
    #[arg(long, env = "ISSUETRAIL_QUEUE_SIZE", default_value_t = 1024)]
    pub queue_size: usize,
    /// Attempts per report before it is dropped
    #[arg(long, env = "ISSUETRAIL_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,
    /// Let reports of the same fingerprint run concurrently (may open duplicate issues)
    #[arg(long)]
    pub allow_concurrent_fingerprints: bool,
    /// Interval between expiry sweeps of the in-memory store, in seconds
    #[arg(long, env = "ISSUETRAIL_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,
}

impl ServiceArgs {
    pub fn monitored_statuses(&self) -> anyhow::Result<BTreeSet<u16>> {
        let statuses: BTreeSet<u16> = self.monitor_statuses.iter().copied().collect();
        if statuses.is_empty() {
            anyhow::bail!("GITHUB_MONITOR_STATUSES must name at least one status code");
        }
        Ok(statuses)
    }

    pub fn reporting_enabled(&self) -> bool {
        self.report_all_environments || self.environment.eq_ignore_ascii_case("production")
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        reporter: ReporterArgs,
        #[command(flatten)]
        service: ServiceArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["issuetrail", "--github-token", "t0k", "--github-repo", "acme/shop"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        let config = cli.reporter.reporter_config().unwrap();
        assert_eq!(config.labels, vec!["bug"]);
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(cli.reporter.store, StoreKind::Memory);
        assert_eq!(
            cli.service.monitored_statuses().unwrap(),
            BTreeSet::from([500])
        );
        assert!(cli.service.reporting_enabled());
    }

    #[test]
    fn test_comma_separated_lists() {
        let cli = parse(&["--labels", "bug, backend,,prod", "--monitor-statuses", "500,502,503"]);
        assert_eq!(cli.reporter.reporter_config().unwrap().labels, vec!["bug", "backend", "prod"]);
        assert_eq!(
            cli.service.monitored_statuses().unwrap(),
            BTreeSet::from([500, 502, 503])
        );
    }

    #[test]
    fn test_github_config_from_args() {
        let cli = parse(&["--github-api-url", "http://localhost:1234", "--tracker-timeout", "3"]);
        let config = cli.reporter.github_config().unwrap();
        assert_eq!(config.repo_url(), "http://localhost:1234/repos/acme/shop");
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_malformed_repo_is_startup_error() {
        let mut cli = parse(&[]);
        cli.reporter.github_repo = "not-a-repo".into();
        assert!(cli.reporter.github_config().is_err());
    }

    #[test]
    fn test_environment_gate() {
        assert!(!parse(&["--environment", "staging"]).service.reporting_enabled());
        assert!(parse(&["--environment", "staging", "--report-all-environments"])
            .service
            .reporting_enabled());
    }

    #[test]
    fn test_oversized_ttl_is_startup_error() {
        let max = MAX_TTL.as_secs().to_string();
        let config = parse(&["--ttl", max.as_str()]).reporter.reporter_config().unwrap();
        assert_eq!(config.ttl, MAX_TTL);

        let over = (MAX_TTL.as_secs() + 1).to_string();
        assert!(parse(&["--ttl", over.as_str()]).reporter.reporter_config().is_err());
        let huge = u64::MAX.to_string();
        assert!(parse(&["--ttl", huge.as_str()]).reporter.reporter_config().is_err());
    }

    #[test]
    fn test_valkey_requires_url() {
        let cli = parse(&["--store", "valkey"]);
        assert!(cli.reporter.valkey_url().is_err());
        let cli = parse(&["--store", "valkey", "--valkey-url", "redis://127.0.0.1/"]);
        assert_eq!(cli.reporter.valkey_url().unwrap(), "redis://127.0.0.1/");
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest tracking window accepted at startup (ten years).
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Settings the lifecycle manager reads. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Applied verbatim to every issue the manager opens.
    pub labels: Vec<String>,
    /// Tracking window; refreshed on every reported occurrence.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    /// Upper bound for a single store lookup or write.
    #[serde(with = "duration_secs")]
    pub store_timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            labels: vec!["bug".to_string()],
            ttl: DEFAULT_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl ReporterConfig {
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReporterConfig::default();
        assert_eq!(config.labels, vec!["bug"]);
        assert_eq!(config.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_deserialize_partial_in_seconds() {
        let config: ReporterConfig =
            serde_json::from_str(r#"{"labels":["bug","prod"],"ttl":120}"#).unwrap();
        assert_eq!(config.labels, vec!["bug", "prod"]);
        assert_eq!(config.ttl, Duration::from_secs(120));
        assert_eq!(config.store_timeout, DEFAULT_STORE_TIMEOUT);
    }
}

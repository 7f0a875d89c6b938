//! Valkey/Redis occurrence store, shared by every instance pointed at it.
//!
//! Records are stored as JSON under `<namespace>:occurrence:<fingerprint>` with
//! a native `EX` expiry. The server-side expiry is rounded up to whole seconds,
//! so `get` also checks the stored `expires_at` against the local clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use issuetrail_core::clock::{Clock, SystemClock};
use issuetrail_core::error::StoreError;
use issuetrail_core::store::{expiry_after, OccurrenceStore};
use issuetrail_core::types::{Fingerprint, LifecycleRecord, Occurrence};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct ValkeyStore {
    pool: Pool,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl ValkeyStore {
    /// Build the pool and verify the server answers `PING`.
    pub async fn connect(url: &str, namespace: &str, pool_size: usize) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .max_size(pool_size.max(1))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!(namespace, pool_size, "connected to valkey occurrence store");
        Ok(Self {
            pool,
            namespace: namespace.to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    fn record_key(&self, fingerprint: &Fingerprint) -> String {
        record_key(&self.namespace, fingerprint)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn record_key(namespace: &str, fingerprint: &Fingerprint) -> String {
    if namespace.is_empty() {
        format!("occurrence:{}", fingerprint)
    } else {
        format!("{}:occurrence:{}", namespace, fingerprint)
    }
}

/// Decode a stored record, hiding it once `expires_at` has passed locally.
fn decode_record(raw: &str, now: DateTime<Utc>) -> Result<Option<LifecycleRecord>, StoreError> {
    let record: LifecycleRecord =
        serde_json::from_str(raw).map_err(|e| StoreError::Serialisation(e.to_string()))?;
    Ok((!record.is_expired(now)).then_some(record))
}

/// Whole seconds for `SET EX`, never zero.
fn expiry_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs.max(1)
    }
}

#[async_trait]
impl OccurrenceStore for ValkeyStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<LifecycleRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(self.record_key(fingerprint))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match raw {
            Some(raw) => decode_record(&raw, self.clock.now()),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        occurrence: Occurrence,
        ttl: Duration,
    ) -> Result<LifecycleRecord, StoreError> {
        let expires_at = expiry_after(self.clock.now(), ttl)?;
        let record = LifecycleRecord::new(fingerprint.clone(), occurrence, expires_at);
        let payload =
            serde_json::to_string(&record).map_err(|e| StoreError::Serialisation(e.to_string()))?;

        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.record_key(fingerprint), payload, expiry_seconds(ttl))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuetrail_core::types::IssueId;

    #[test]
    fn test_record_key_namespacing() {
        let fp = Fingerprint::new("abc123");
        assert_eq!(record_key("issuetrail", &fp), "issuetrail:occurrence:abc123");
        assert_eq!(record_key("", &fp), "occurrence:abc123");
    }

    #[test]
    fn test_expiry_rounds_up() {
        assert_eq!(expiry_seconds(Duration::from_secs(3600)), 3600);
        assert_eq!(expiry_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(expiry_seconds(Duration::from_millis(10)), 1);
        assert_eq!(expiry_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn test_decode_hides_locally_expired_record() {
        let now = Utc::now();
        let record = LifecycleRecord::new(
            Fingerprint::new("abc123"),
            Occurrence::first(IssueId(4)),
            now + chrono::Duration::milliseconds(500),
        );
        let raw = serde_json::to_string(&record).unwrap();

        assert_eq!(decode_record(&raw, now).unwrap(), Some(record.clone()));
        // The server rounds EX up, so the key can outlive expires_at.
        let later = now + chrono::Duration::seconds(1);
        assert_eq!(decode_record(&raw, later).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_record("not json", Utc::now()),
            Err(StoreError::Serialisation(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = ValkeyStore::connect("redis://127.0.0.1:1", "issuetrail", 1).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    // Needs a running server: ISSUETRAIL_TEST_VALKEY_URL=redis://127.0.0.1:6379
    #[tokio::test]
    #[ignore]
    async fn test_live_put_then_get() {
        let url = std::env::var("ISSUETRAIL_TEST_VALKEY_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = ValkeyStore::connect(&url, "issuetrail-test", 2).await.unwrap();
        let fp = Fingerprint::new(format!("live-{}", std::process::id()));

        let written = store
            .put(&fp, Occurrence::first(IssueId(17)), Duration::from_secs(30))
            .await
            .unwrap();
        let read = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(read, written);

        let bumped = store
            .put(&fp, read.next_occurrence(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(bumped.occurrence_count, 2);
        assert_eq!(store.get(&fp).await.unwrap().unwrap().issue_id, IssueId(17));
    }
}

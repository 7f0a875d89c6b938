use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::types::{Fingerprint, LifecycleRecord, Occurrence};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Fingerprint → lifecycle record map with per-entry expiry.
///
/// Implementations must behave identically whether they are in-process or
/// shared between instances:
/// - `get` returns `Ok(None)` for a record whose `expires_at` has passed, even
///   if the backend still holds it.
/// - `put` overwrites unconditionally and sets `expires_at = now + ttl`.
/// - There is no delete; expiry is the only way a record goes away.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<LifecycleRecord>, StoreError>;

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        occurrence: Occurrence,
        ttl: Duration,
    ) -> Result<LifecycleRecord, StoreError>;
}

#[async_trait]
impl<S: OccurrenceStore + ?Sized> OccurrenceStore for Arc<S> {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<LifecycleRecord>, StoreError> {
        (**self).get(fingerprint).await
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        occurrence: Occurrence,
        ttl: Duration,
    ) -> Result<LifecycleRecord, StoreError> {
        (**self).put(fingerprint, occurrence, ttl).await
    }
}

/// `now + ttl`, or `TtlOutOfRange` when that overflows the calendar.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
    ChronoDuration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(StoreError::TtlOutOfRange(ttl))
}

/// Single-instance store backed by a concurrent map.
#[derive(Clone)]
pub struct MemoryStore {
    records: Arc<DashMap<Fingerprint, LifecycleRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Physically held entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.records, self.clock.now())
    }

    /// Sweep expired entries every `interval` until the store is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let records: Weak<DashMap<Fingerprint, LifecycleRecord>> = Arc::downgrade(&self.records);
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(records) = records.upgrade() else {
                    break;
                };
                let removed = sweep(&records, clock.now());
                if removed > 0 {
                    debug!(removed, remaining = records.len(), "swept expired occurrence records");
                }
            }
        })
    }
}

fn sweep(records: &DashMap<Fingerprint, LifecycleRecord>, now: DateTime<Utc>) -> usize {
    let before = records.len();
    records.retain(|_, record| !record.is_expired(now));
    before.saturating_sub(records.len())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OccurrenceStore for MemoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<LifecycleRecord>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(fingerprint)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value().clone()))
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        occurrence: Occurrence,
        ttl: Duration,
    ) -> Result<LifecycleRecord, StoreError> {
        let expires_at = expiry_after(self.clock.now(), ttl)?;
        let record = LifecycleRecord::new(fingerprint.clone(), occurrence, expires_at);
        self.records.insert(fingerprint.clone(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::IssueId;

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _) = store();
        assert!(store.get(&Fingerprint::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (store, clock) = store();
        let fp = Fingerprint::new("fp");
        let written = store.put(&fp, Occurrence::first(IssueId(12)), TTL).await.unwrap();
        assert_eq!(written.expires_at, clock.now() + ChronoDuration::seconds(60));

        let read = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(read.occurrence_count, 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_absent_before_sweep() {
        let (store, clock) = store();
        let fp = Fingerprint::new("fp");
        store.put(&fp, Occurrence::first(IssueId(1)), TTL).await.unwrap();

        clock.advance(ChronoDuration::seconds(60));
        assert!(store.get(&fp).await.unwrap().is_none());
        assert_eq!(store.len(), 1);

        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_slides_expiry() {
        let (store, clock) = store();
        let fp = Fingerprint::new("fp");
        store.put(&fp, Occurrence::first(IssueId(1)), TTL).await.unwrap();

        clock.advance(ChronoDuration::seconds(50));
        store
            .put(
                &fp,
                Occurrence {
                    issue_id: IssueId(1),
                    occurrence_count: 2,
                },
                TTL,
            )
            .await
            .unwrap();

        clock.advance(ChronoDuration::seconds(50));
        let record = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(record.occurrence_count, 2);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let (store, clock) = store();
        store
            .put(&Fingerprint::new("short"), Occurrence::first(IssueId(1)), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .put(&Fingerprint::new("long"), Occurrence::first(IssueId(2)), TTL)
            .await
            .unwrap();

        clock.advance(ChronoDuration::seconds(10));
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.get(&Fingerprint::new("long")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_an_error() {
        let (store, _) = store();
        let fp = Fingerprint::new("fp");
        let ttl = Duration::from_secs(u64::MAX);

        let err = store.put(&fp, Occurrence::first(IssueId(1)), ttl).await.unwrap_err();
        assert!(matches!(err, StoreError::TtlOutOfRange(d) if d == ttl));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expiry_after_at_calendar_edge() {
        let ttl = Duration::from_secs(10);
        assert!(expiry_after(DateTime::<Utc>::MAX_UTC, ttl).is_err());
        let now = Utc::now();
        assert_eq!(expiry_after(now, ttl).unwrap(), now + ChronoDuration::seconds(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_removes_expired() {
        let (store, clock) = store();
        store
            .put(&Fingerprint::new("fp"), Occurrence::first(IssueId(1)), Duration::from_secs(1))
            .await
            .unwrap();
        clock.advance(ChronoDuration::seconds(2));

        let handle = store.spawn_sweeper(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_finished());
    }
}

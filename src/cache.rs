//! Single-slot time-bounded cache
//!
//! Memoizes the result of one expensive fetch for a fixed time-to-live. The
//! slot lock is held while a miss is being fetched, so callers arriving during
//! the fetch wait for it and then read the stored value instead of fetching
//! again.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(elapsed) => elapsed < ttl,
            // Clock stepped backwards; the entry is younger than anything.
            Err(_) => true,
        }
    }
}

pub struct TimedCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> TimedCache<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }

    /// Return the cached value if younger than `ttl`, otherwise run `fetch`
    /// and cache its result. A failed fetch leaves the previous entry in place.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F, ttl: Duration) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.is_fresh(self.clock.now(), ttl) {
                debug!("Cache hit (fetched at {})", entry.fetched_at);
                return Ok(entry.value.clone());
            }
        }

        debug!("Cache miss, fetching");
        let value = fetch().await?;

        *slot = Some(CacheEntry {
            value: value.clone(),
            fetched_at: self.clock.now(),
        });

        Ok(value)
    }

    /// The cached value regardless of age.
    pub async fn peek(&self) -> Option<T> {
        self.slot.lock().await.as_ref().map(|entry| entry.value.clone())
    }

    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().await.as_ref().map(|entry| entry.fetched_at)
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::TrackerError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(300);

    fn setup() -> (TimedCache<u32>, Arc<ManualClock>, Arc<AtomicUsize>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        (TimedCache::new(clock.clone()), clock, Arc::new(AtomicUsize::new(0)))
    }

    async fn counted_fetch(calls: Arc<AtomicUsize>) -> Result<u32, TrackerError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n as u32)
    }

    #[tokio::test]
    async fn test_fetches_once_within_ttl() {
        let (cache, clock, calls) = setup();

        let first = assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);
        clock.advance(chrono::Duration::seconds(299));
        let second = assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_after_ttl() {
        let (cache, clock, calls) = setup();

        assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);
        clock.advance(chrono::Duration::seconds(300));
        let value = assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_value() {
        let (cache, clock, calls) = setup();

        assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);
        let fetched_at = cache.fetched_at().await;
        clock.advance(chrono::Duration::minutes(10));

        let result = cache
            .get_or_fetch(
                || async { Err::<u32, _>(TrackerError::Fetch("upstream returned 503".to_string())) },
                TTL,
            )
            .await;

        assert_err!(result);
        assert_eq!(cache.peek().await, Some(1));
        assert_eq!(cache.fetched_at().await, fetched_at);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_slot_empty() {
        let (cache, _, _) = setup();

        let result = cache
            .get_or_fetch(|| async { Err::<u32, _>(TrackerError::Other("boom".to_string())) }, TTL)
            .await;

        assert_err!(result);
        assert_eq!(cache.peek().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let (cache, _, calls) = setup();

        let slow_fetch = || {
            let calls = calls.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counted_fetch(calls).await
            }
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch(slow_fetch, TTL),
            cache.get_or_fetch(slow_fetch, TTL),
            cache.get_or_fetch(slow_fetch, TTL),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (cache, _, calls) = setup();

        assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);
        cache.invalidate().await;
        let value = assert_ok!(cache.get_or_fetch(|| counted_fetch(calls.clone()), TTL).await);

        assert_eq!(value, 2);
    }
}

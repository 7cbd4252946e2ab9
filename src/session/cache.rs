//! Session affinity cache.
//!
//! Maps a primary-backend session token to the shadow-backend token issued
//! for the same client. Entries expire after a TTL; expiry is checked on
//! every read and a background sweeper removes whatever nobody read again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::observability::metrics;

/// Longest period the sweeper waits between passes.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A shadow session token together with its deadline.
#[derive(Debug, Clone)]
struct SessionEntry {
    shadow_token: String,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl SessionEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// A thread-safe, TTL-bounded map of primary -> shadow session tokens.
///
/// Cloning is cheap and every clone observes the same entries.
#[derive(Debug, Clone)]
pub struct SessionCache {
    inner: Arc<DashMap<String, SessionEntry>>,
    default_ttl: Duration,
}

impl SessionCache {
    /// Create an empty cache whose `insert` uses `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// Look up the shadow token for a primary token.
    ///
    /// An expired entry reads as absent and is removed on the spot.
    pub fn get(&self, primary_token: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.inner.get(primary_token) {
            if !entry.is_expired(now) {
                return Some(entry.shadow_token.clone());
            }
        }
        // The read guard must be released before removing from the same shard.
        self.inner
            .remove_if(primary_token, |_, entry| entry.is_expired(now));
        None
    }

    /// Store or overwrite a mapping, refreshing its expiry.
    pub fn set(&self, primary_token: impl Into<String>, shadow_token: impl Into<String>, ttl: Duration) {
        self.inner.insert(
            primary_token.into(),
            SessionEntry {
                shadow_token: shadow_token.into(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        metrics::record_session_cache_size(self.inner.len());
    }

    /// Store or overwrite a mapping with the default TTL.
    pub fn insert(&self, primary_token: impl Into<String>, shadow_token: impl Into<String>) {
        self.set(primary_token, shadow_token, self.default_ttl);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        let after = self.inner.len();
        metrics::record_session_cache_size(after);
        before.saturating_sub(after)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Run `purge_expired` every `interval` until shutdown is signalled.
    ///
    /// Intervals longer than a year are shortened to a year.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        let interval = interval.min(MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        tracing::debug!(purged, remaining = cache.len(), "Session cache swept");
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Session sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_value_until_expiry() {
        let cache = SessionCache::new(Duration::from_secs(60));
        assert!(cache.get("xyz").is_none());

        cache.insert("xyz", "qqq");
        assert_eq!(cache.get("xyz").as_deref(), Some("qqq"));

        cache.set("old", "gone", Duration::ZERO);
        assert!(cache.get("old").is_none());
        assert_eq!(cache.len(), 1, "expired entry is removed on read");
    }

    #[test]
    fn later_write_overwrites() {
        let cache = SessionCache::new(Duration::from_secs(60));
        cache.insert("xyz", "first");
        cache.insert("xyz", "second");
        assert_eq!(cache.get("xyz").as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overwrite_refreshes_expiry() {
        let cache = SessionCache::new(Duration::from_secs(60));
        cache.set("xyz", "stale", Duration::ZERO);
        cache.insert("xyz", "fresh");
        assert_eq!(cache.get("xyz").as_deref(), Some("fresh"));
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = SessionCache::new(Duration::from_secs(60));
        cache.set("a", "1", Duration::ZERO);
        cache.set("b", "2", Duration::ZERO);
        cache.insert("c", "3");

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn concurrent_writers_leave_one_whole_value() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        cache.insert("shared", format!("value-{}", i));
                        let _ = cache.get("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let value = cache.get("shared").unwrap();
        let writer: usize = value.strip_prefix("value-").unwrap().parse().unwrap();
        assert!(writer < 8);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let cache = SessionCache::new(Duration::MAX);
        cache.insert("xyz", "qqq");
        cache.set("abc", "def", Duration::from_secs(u64::MAX));

        assert_eq!(cache.get("xyz").as_deref(), Some("qqq"));
        assert_eq!(cache.get("abc").as_deref(), Some("def"));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test]
    async fn sweeper_accepts_huge_interval() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let (tx, rx) = broadcast::channel(1);
        let handle = cache.spawn_sweeper(Duration::from_secs(u64::MAX), rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished(), "sweeper is still waiting for its first tick");

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper exits")
            .expect("sweeper did not panic");
    }

    #[tokio::test]
    async fn sweeper_purges_and_stops_on_shutdown() {
        let cache = SessionCache::new(Duration::from_secs(60));
        cache.set("expired", "x", Duration::ZERO);
        cache.insert("live", "y");

        let (tx, rx) = broadcast::channel(1);
        let handle = cache.spawn_sweeper(Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len(), 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper exits")
            .unwrap();
    }
}

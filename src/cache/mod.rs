use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Storage seam for conversation state.
///
/// `pull` is assumed by callers to have get-then-delete semantics; the
/// underlying store need not guarantee atomicity (see the crate docs on the
/// read-modify-write race between near-simultaneous deliveries).
#[async_trait]
pub trait ConversationCache: Send + Sync {
    async fn has(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
    async fn pull(&self, key: &str) -> Result<Option<Value>>;
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// LRU-bounded in-memory cache with per-entry TTL deadlines.
///
/// Suitable for tests and single-process bots; multi-instance deployments
/// plug an external store into [`ConversationCache`] instead.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl ConversationCache for InMemoryCache {
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expired(now) => {
                entries.pop(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.lock().await;
        entries.put(key.to_string(), entry);
        Ok(())
    }

    async fn pull(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.pop(key) {
            Some(entry) if entry.expired(now) => Ok(None),
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }
}

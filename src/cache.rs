// src/cache.rs
//! Small in-memory TTL cache for the feed proxy endpoints. Feeds move slowly
//! and upstream quotas are tight, so responses are reused for a few minutes.
//! Handlers surface the result via an `X-Feed-Cache: HIT|MISS` header.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

/// Default reuse window for cached feed responses.
const DEFAULT_TTL_MS: u64 = 10 * 60 * 1000;
/// Env override, in milliseconds.
pub const ENV_FEED_CACHE_TTL_MS: &str = "FEED_CACHE_TTL_MS";

struct CacheSlot {
    stored_at: Instant,
    payload: Value,
}

pub struct FeedCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// TTL from `FEED_CACHE_TTL_MS` when set and sane, default otherwise.
    pub fn from_env() -> Self {
        let ms = std::env::var(ENV_FEED_CACHE_TTL_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TTL_MS);
        Self::new(Duration::from_millis(ms))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh payload for `key`, or `None` on absence/expiry. Expired slots
    /// are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut slots = self.slots.lock().expect("feed cache mutex poisoned");
        match slots.get(key) {
            Some(slot) if slot.stored_at.elapsed() < self.ttl => Some(slot.payload.clone()),
            Some(_) => {
                slots.remove(key);
                debug!(key, "feed cache entry expired");
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, payload: Value) {
        let mut slots = self.slots.lock().expect("feed cache mutex poisoned");
        slots.insert(
            key.to_string(),
            CacheSlot {
                stored_at: Instant::now(),
                payload,
            },
        );
    }
}

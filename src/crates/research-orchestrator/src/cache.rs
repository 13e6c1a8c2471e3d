//! Content-addressed cache with TTL and single-flight fill.
//!
//! Keyed by an opaque string (fetch nodes build it from
//! `(node_name, sorted(entities), sorted(filters), max_results_per_source)`).
//! Concurrent misses on the same key are coalesced into one fill: the first
//! caller to miss executes `fill`; everyone else waits on its result rather
//! than stampeding the upstream adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

struct Entry {
    value: Value,
    expires_at: Instant,
}

enum Slot {
    Ready(Entry),
    /// A fill is in flight; latecomers subscribe and wait for its outcome.
    Filling(broadcast::Sender<Option<Value>>),
}

#[derive(Clone)]
pub struct Cache {
    default_ttl: Duration,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Non-single-flight lookup: returns `Some` only for a live, unexpired entry.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut slots = self.slots.lock().await;
        match slots.get(key) {
            Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                Some(entry.value.clone())
            }
            Some(Slot::Ready(_)) => {
                slots.remove(key);
                None
            }
            _ => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let mut slots = self.slots.lock().await;
        let entry = Entry {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        };
        if let Some(Slot::Filling(tx)) = slots.insert(key.into(), Slot::Ready(entry)) {
            let _ = tx.send(Some(value));
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.slots.lock().await.remove(key);
    }

    /// Get-or-fill with single-flight coalescing. If `key` is missing or
    /// expired, `fill` runs exactly once across all concurrent callers for
    /// that key; its result is cached and broadcast to anyone else waiting.
    pub async fn get_or_fill<F, Fut, E>(&self, key: &str, fill: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value, E>>,
    {
        let mut rx = {
            let mut slots = self.slots.lock().await;
            match slots.get(key) {
                Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                    return Ok(entry.value.clone())
                }
                Some(Slot::Filling(tx)) => Some(tx.subscribe()),
                _ => {
                    let (tx, _rx) = broadcast::channel(1);
                    slots.insert(key.to_string(), Slot::Filling(tx));
                    None
                }
            }
        };

        if let Some(rx) = rx.as_mut() {
            if let Ok(Some(value)) = rx.recv().await {
                return Ok(value);
            }
            // The leader's fill failed or the channel dropped; fall through
            // and race to become the new leader rather than erroring here.
        }

        let result = fill().await;
        let mut slots = self.slots.lock().await;
        match &result {
            Ok(value) => {
                slots.insert(
                    key.to_string(),
                    Slot::Ready(Entry {
                        value: value.clone(),
                        expires_at: Instant::now() + self.default_ttl,
                    }),
                );
            }
            Err(_) => {
                if let Some(Slot::Filling(tx)) = slots.remove(key) {
                    let _ = tx.send(None);
                }
            }
        }
        result
    }
}

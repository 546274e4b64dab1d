use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::kv::KVStore;

/// Read-through cache for idempotent upstream GETs (spec §4.5). Opt-in per
/// call site; a KV failure degrades to a transparent miss, never an error.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KVStore>,
    default_ttl: Duration,
}

/// Key format `<upstream>:<tenant>:<resource>[:<id>]…`.
pub fn cache_key(upstream: &str, tenant: &str, resource: &str, extra: &[&str]) -> String {
    let mut parts = vec![upstream, tenant, resource];
    parts.extend_from_slice(extra);
    parts.join(":")
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KVStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                debug!(?err, key, "cache KV read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        if let Err(err) = self.store.set(key, value, ttl.unwrap_or(self.default_ttl)).await {
            debug!(?err, key, "cache KV write failed, skipping");
        }
    }

    /// Invalidates one or more related keys (item, list, aggregate) after a
    /// write/update/delete.
    pub async fn invalidate(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.store.del(key).await {
                debug!(?err, key, "cache KV invalidation failed");
            }
        }
    }
}

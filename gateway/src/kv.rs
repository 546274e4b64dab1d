use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Narrow key-value interface the rate limiter and response cache both sit
/// on top of (spec §2). `incr` returns the post-increment value and applies
/// `ttl` only on the first increment of a window, matching §4.3's model.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;
}

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("failed to create Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to create Redis connection manager")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KVStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.manager.clone();
        let current: i64 = conn.incr(key, 1).await?;
        if current == 1 {
            let _: () = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        }
        Ok(current)
    }
}

/// In-process store for tests and local development; never shared across
/// gateway instances.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.map(|deadline| Instant::now() < deadline).unwrap_or(true)
    }
}

#[async_trait]
impl KVStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.inner.lock().await;
        Ok(guard.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.insert(key.to_string(), Entry { value, expires_at: Some(Instant::now() + ttl) });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut guard = self.inner.lock().await;
        let live = guard.get(key).map(Self::is_live).unwrap_or(false);
        if !live {
            guard.insert(key.to_string(), Entry { value: b"0".to_vec(), expires_at: Some(Instant::now() + ttl) });
        }
        let entry = guard.get_mut(key).expect("just inserted or already live");
        let current: i64 = std::str::from_utf8(&entry.value).unwrap_or("0").parse().unwrap_or(0);
        let next = current + 1;
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_resets_after_ttl_elapses() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("k", Duration::from_millis(20)).await.unwrap(), 1);
        assert_eq!(store.incr("k", Duration::from_millis(20)).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.incr("k", Duration::from_millis(20)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_get_del_round_trip() {
        let store = InMemoryStore::new();
        store.set("a", b"hello".to_vec(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}

mod noop_store;
mod redis_store;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use serde::de::DeserializeOwned;
use tracing::warn;

use noop_store::NoopCacheStore;
use redis_store::RedisCacheStore;

use crate::model::leveling::UserId;

/// How long a user's profile stays cached; writes invalidate it earlier.
///
/// A reader that missed before a write commits can still store the old row
/// after the write's invalidation. Writers delete the key a second time after
/// `PROFILE_REINVALIDATE_DELAY` to close that window.
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(60);
pub const PROFILE_REINVALIDATE_DELAY: Duration = Duration::from_millis(500);
/// Leaderboards are not invalidated on write, so keep them short-lived.
pub const LEADERBOARD_CACHE_TTL: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
enum CacheBackend {
    Disabled(NoopCacheStore),
    Redis(RedisCacheStore),
}

/// Read-through JSON cache in front of the ledger tables.
#[derive(Clone, Debug)]
pub struct CacheService {
    key_prefix: String,
    backend: CacheBackend,
}

impl CacheService {
    pub fn disabled(prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: prefix.into(),
            backend: CacheBackend::Disabled(NoopCacheStore),
        }
    }

    pub fn redis(redis_url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            key_prefix: prefix.into(),
            backend: CacheBackend::Redis(RedisCacheStore::from_url(redis_url)?),
        })
    }

    pub fn is_redis_enabled(&self) -> bool {
        matches!(self.backend, CacheBackend::Redis(_))
    }

    pub fn key(&self, suffix: impl AsRef<str>) -> String {
        format!("{}:{}", self.key_prefix, suffix.as_ref())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        match &self.backend {
            CacheBackend::Disabled(store) => store.ping().await,
            CacheBackend::Redis(store) => store.ping().await,
        }
    }

    pub async fn get_json<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let value = match &self.backend {
            CacheBackend::Disabled(store) => store.get(key).await,
            CacheBackend::Redis(store) => store.get(key).await,
        }?;

        value
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| {
                    anyhow::anyhow!("failed to deserialize cache value for `{key}`: {e}")
                })
            })
            .transpose()
    }

    pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let ttl_seconds = ttl.as_secs().max(1);
        let payload = serde_json::to_vec(value)
            .map_err(|e| anyhow::anyhow!("failed to serialize cache value for `{key}`: {e}"))?;

        match &self.backend {
            CacheBackend::Disabled(store) => store.set(key, payload, ttl_seconds).await,
            CacheBackend::Redis(store) => store.set(key, payload, ttl_seconds).await,
        }
    }

    pub async fn del(&self, key: &str) -> anyhow::Result<()> {
        match &self.backend {
            CacheBackend::Disabled(store) => store.del(key).await,
            CacheBackend::Redis(store) => store.del(key).await,
        }
    }

    /// Drop a key, logging instead of failing when the cache is unreachable.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.del(key).await {
            warn!(?e, cache_key = key, "cache invalidation failed");
        }
    }

    /// Invalidate now and again after `delay`, catching stale values written
    /// back by readers that loaded before the change committed.
    pub async fn invalidate_twice(&self, key: &str, delay: Duration) -> JoinHandle<()> {
        self.invalidate(key).await;

        let cache = self.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cache.invalidate(&key).await;
        })
    }

    /// Serve `key` from the cache, or run `loader` and store its value.
    /// Cache failures are logged and never surface; only loader errors do.
    pub async fn get_or_load_json<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get_json::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(?e, cache_key = key, "cache get failed; falling back to database"),
        }

        let loaded = loader().await?;

        if let Err(e) = self.set_json(key, &loaded, ttl).await {
            warn!(?e, cache_key = key, "cache set failed; returning database value");
        }

        Ok(loaded)
    }
}

pub fn profile_cache_key(cache: &CacheService, user_id: &UserId) -> String {
    cache.key(format!("leveling:profile:{user_id}"))
}

pub fn leaderboard_cache_key(cache: &CacheService, limit: usize) -> String {
    cache.key(format!("leveling:leaderboard:{limit}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CacheService, leaderboard_cache_key, profile_cache_key};
    use crate::model::leveling::UserId;

    #[test]
    fn keys_carry_prefix() {
        let cache = CacheService::disabled("aether:test");
        let user = UserId::from_snowflake(9);

        assert_eq!(profile_cache_key(&cache, &user), "aether:test:leveling:profile:9");
        assert_eq!(leaderboard_cache_key(&cache, 10), "aether:test:leveling:leaderboard:10");
    }

    #[tokio::test]
    async fn second_invalidation_runs_after_the_delay() {
        let cache = CacheService::disabled("aether:test");

        let follow_up = cache
            .invalidate_twice("aether:test:leveling:profile:1", Duration::from_millis(1))
            .await;

        assert!(follow_up.await.is_ok());
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let cache = CacheService::disabled("aether:test");

        let first: Result<u64, ()> = cache
            .get_or_load_json("k", super::PROFILE_CACHE_TTL, || async { Ok(1) })
            .await;
        let second: Result<u64, ()> = cache
            .get_or_load_json("k", super::PROFILE_CACHE_TTL, || async { Ok(2) })
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert!(!cache.is_redis_enabled());
    }
}

/// Read-through JSON caches
///
/// Profile and organization rows are read on every session derivation, so
/// they are cached in Redis as JSON with short TTLs. The cache is strictly
/// best-effort: a miss or any Redis failure falls through to the database,
/// and failures are logged, never surfaced.
///
/// Writers must invalidate: organization updates, onboarding completion,
/// and membership changes call `invalidate` for the affected keys.
///
/// # Keys and TTLs
///
/// - `cache:profile:{user_id}` - 300 s
/// - `cache:org:{org_id}` - 300 s
/// - `cache:membership:{user_id}` - 300 s

use super::client::RedisClient;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Cache key families with their TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// User profile rows
    Profile,

    /// Organization rows
    Organization,

    /// Active-membership lookups
    Membership,
}

impl CacheKind {
    /// Key prefix for this cache family
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheKind::Profile => "cache:profile",
            CacheKind::Organization => "cache:org",
            CacheKind::Membership => "cache:membership",
        }
    }

    /// TTL in seconds for this cache family
    pub fn ttl_secs(&self) -> u64 {
        match self {
            CacheKind::Profile => 300,
            CacheKind::Organization => 300,
            CacheKind::Membership => 300,
        }
    }
}

/// Best-effort JSON cache over Redis
#[derive(Clone)]
pub struct Cache {
    redis: RedisClient,
}

impl Cache {
    /// Creates a cache over an existing Redis client
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(kind: CacheKind, id: &str) -> String {
        format!("{}:{}", kind.prefix(), id)
    }

    /// Fetches and deserializes a cached value
    ///
    /// Returns None on miss, deserialization mismatch, or Redis failure.
    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, id: &str) -> Option<T> {
        let mut conn = self.redis.get_connection();

        let raw: Option<String> = match conn.get(Self::key(kind, id)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(kind = kind.prefix(), error = %e, "Cache GET failed");
                return None;
            }
        };

        raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(kind = kind.prefix(), error = %e, "Cache entry failed to deserialize");
                None
            }
        })
    }

    /// Fetches several cached values of one kind in a single MGET
    ///
    /// The result vector is positionally aligned with `ids`; unavailable
    /// entries are None.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        ids: &[&str],
    ) -> Vec<Option<T>> {
        if ids.is_empty() {
            return Vec::new();
        }

        let keys: Vec<String> = ids.iter().map(|id| Self::key(kind, id)).collect();
        let mut conn = self.redis.get_connection();

        let raw: Vec<Option<String>> = match conn.mget(&keys).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(kind = kind.prefix(), error = %e, "Cache MGET failed");
                return ids.iter().map(|_| None).collect();
            }
        };

        raw.into_iter()
            .map(|entry| entry.and_then(|json| serde_json::from_str(&json).ok()))
            .collect()
    }

    /// Serializes and stores a value with the kind's TTL
    ///
    /// Failures are logged and swallowed.
    pub async fn put<T: Serialize>(&self, kind: CacheKind, id: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(kind = kind.prefix(), error = %e, "Cache value failed to serialize");
                return;
            }
        };

        let mut conn = self.redis.get_connection();
        let set: Result<(), _> = redis::cmd("SETEX")
            .arg(Self::key(kind, id))
            .arg(kind.ttl_secs())
            .arg(json)
            .query_async(&mut conn)
            .await;
        if let Err(e) = set {
            tracing::warn!(kind = kind.prefix(), error = %e, "Cache SET failed");
        }
    }

    /// Drops a cached entry
    ///
    /// Failures are logged and swallowed; the entry expires by TTL anyway.
    pub async fn invalidate(&self, kind: CacheKind, id: &str) {
        let mut conn = self.redis.get_connection();
        if let Err(e) = conn.del::<_, ()>(Self::key(kind, id)).await {
            tracing::warn!(kind = kind.prefix(), error = %e, "Cache DEL failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let id = "2fd2f7cb-0c6d-4b5e-9d6f-0a5b8f6f2b11";
        assert_eq!(
            Cache::key(CacheKind::Profile, id),
            format!("cache:profile:{}", id)
        );
        assert_ne!(
            Cache::key(CacheKind::Profile, id),
            Cache::key(CacheKind::Organization, id)
        );
    }

    #[test]
    fn test_ttls_are_positive() {
        for kind in [
            CacheKind::Profile,
            CacheKind::Organization,
            CacheKind::Membership,
        ] {
            assert!(kind.ttl_secs() > 0);
        }
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_put_get_invalidate() {
        use crate::redis::client::{RedisClient, RedisConfig};

        let client = RedisClient::new(RedisConfig::default_for_test())
            .await
            .expect("Redis should connect");
        let cache = Cache::new(client);

        let id = uuid::Uuid::new_v4().to_string();
        let value = serde_json::json!({ "name": "Muster AG" });

        cache.put(CacheKind::Organization, &id, &value).await;
        let cached: Option<serde_json::Value> = cache.get(CacheKind::Organization, &id).await;
        assert_eq!(cached, Some(value));

        cache.invalidate(CacheKind::Organization, &id).await;
        let gone: Option<serde_json::Value> = cache.get(CacheKind::Organization, &id).await;
        assert!(gone.is_none());
    }
}

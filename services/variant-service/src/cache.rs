// =============================================================================
// VARIANT LIST CACHE
// =============================================================================
// Redis cache for the per-product variant list. Keys:
//   variants:{product_id}:version     bumped by every invalidation
//   variants:{product_id}:v{version}  the cached list, with TTL
//
// A reader resolves the version before it reads the store and writes back
// under that version. An invalidation landing in between moves later
// readers to a new key, so the stale list it wrote is never served.
//
// Every Redis error is logged and treated as a miss.
// =============================================================================

use std::time::Instant;

use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::ids::ProductId;
use crate::metrics;
use crate::models::VariantConfiguration;

#[derive(Clone)]
pub struct VariantCache {
    conn: Option<ConnectionManager>,
    ttl_secs: u64,
}

fn version_key(product_id: ProductId) -> String {
    format!("variants:{product_id}:version")
}

fn list_key(product_id: ProductId, version: u64) -> String {
    format!("variants:{product_id}:v{version}")
}

/// Cache key of one product's list at the version current when it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSlot {
    product_id: ProductId,
    key: String,
}

impl VariantCache {
    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            ttl_secs: 0,
        }
    }

    /// Connect to Redis. ConnectionManager reconnects on its own afterwards.
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Some(conn),
            ttl_secs,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Resolve the current slot for `product_id`. `None` when caching is
    /// disabled or Redis is unreachable.
    pub async fn slot(&self, product_id: ProductId) -> Option<CacheSlot> {
        let mut conn = self.conn.clone()?;
        let started = Instant::now();
        let result: redis::RedisResult<Option<u64>> = redis::cmd("GET")
            .arg(version_key(product_id))
            .query_async(&mut conn)
            .await;
        metrics::record_redis_operation("version", started.elapsed().as_secs_f64());

        match result {
            Ok(version) => Some(CacheSlot {
                product_id,
                key: list_key(product_id, version.unwrap_or(0)),
            }),
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Redis version lookup failed");
                None
            }
        }
    }

    pub async fn get(&self, slot: &CacheSlot) -> Option<Vec<VariantConfiguration>> {
        let mut conn = self.conn.clone()?;
        let product_id = slot.product_id;
        let started = Instant::now();
        let result: redis::RedisResult<Option<String>> = redis::cmd("GET")
            .arg(&slot.key)
            .query_async(&mut conn)
            .await;
        metrics::record_redis_operation("get", started.elapsed().as_secs_f64());

        match result {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(variants) => {
                    debug!(product_id = %product_id, "Variant list cache hit");
                    Some(variants)
                }
                Err(e) => {
                    warn!(product_id = %product_id, error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Redis GET failed");
                None
            }
        }
    }

    pub async fn put(&self, slot: &CacheSlot, variants: &[VariantConfiguration]) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let product_id = slot.product_id;
        let json = match serde_json::to_string(variants) {
            Ok(json) => json,
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Failed to serialize variant list");
                return;
            }
        };

        let started = Instant::now();
        let result: redis::RedisResult<()> = redis::cmd("SETEX")
            .arg(&slot.key)
            .arg(self.ttl_secs)
            .arg(json)
            .query_async(&mut conn)
            .await;
        metrics::record_redis_operation("set", started.elapsed().as_secs_f64());

        if let Err(e) = result {
            warn!(product_id = %product_id, error = %e, "Redis SETEX failed");
        }
    }

    /// Move `product_id` to a new version; older list keys expire by TTL.
    pub async fn invalidate(&self, product_id: ProductId) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };

        let started = Instant::now();
        let result: redis::RedisResult<u64> = redis::cmd("INCR")
            .arg(version_key(product_id))
            .query_async(&mut conn)
            .await;
        metrics::record_redis_operation("invalidate", started.elapsed().as_secs_f64());

        if let Err(e) = result {
            warn!(product_id = %product_id, error = %e, "Redis INCR failed");
        }
    }

    /// `None` when no cache is configured.
    pub async fn ping(&self) -> Option<bool> {
        let mut conn = self.conn.clone()?;
        let started = Instant::now();
        let healthy = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok();
        metrics::record_redis_operation("ping", started.elapsed().as_secs_f64());
        Some(healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_is_a_silent_miss() {
        let cache = VariantCache::disabled();
        let product = ProductId::new();

        assert!(cache.slot(product).await.is_none());
        let slot = CacheSlot {
            product_id: product,
            key: list_key(product, 0),
        };
        cache.put(&slot, &[]).await;
        assert!(cache.get(&slot).await.is_none());
        cache.invalidate(product).await;
        assert_eq!(cache.ping().await, None);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_keys_are_scoped_by_product_and_version() {
        let product = ProductId::new();
        assert_eq!(version_key(product), format!("variants:{product}:version"));
        assert_eq!(list_key(product, 3), format!("variants:{product}:v3"));
        assert_ne!(list_key(product, 3), list_key(ProductId::new(), 3));
    }

    #[tokio::test]
    #[ignore = "needs a Redis server in REDIS_URL"]
    async fn test_write_back_after_invalidation_is_never_served() {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL");
        let cache = VariantCache::connect(&url, 60).await.unwrap();
        let product = ProductId::new();

        // A list read starts, a generation invalidates, then the read writes back.
        let stale_slot = cache.slot(product).await.unwrap();
        cache.invalidate(product).await;
        cache.put(&stale_slot, &[]).await;

        let fresh_slot = cache.slot(product).await.unwrap();
        assert_ne!(fresh_slot, stale_slot);
        assert!(cache.get(&fresh_slot).await.is_none());
    }
}

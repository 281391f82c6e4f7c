//! Counter store: atomic increments, read-through cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coauthor_redis::RedisService;
use tracing::debug;

use crate::error::{SocialError, SocialResult};
use crate::flight::SingleFlight;
use crate::keys::InteractionKind;
use crate::policy::{
    jittered_ttl, parse_cached_count, BASE_TTL, EMPTY_CACHE_MARKER, NEGATIVE_TTL, TTL_JITTER,
};
use crate::repo::DocStatsRepo;

/// Adds the user to the actor set; only a first-time add bumps the
/// counter. Returns {changed, count}.
const INCR_SCRIPT: &str = r#"
local added = redis.call("SADD", KEYS[1], ARGV[1])
if added == 1 then
    local cnt = redis.call("INCR", KEYS[2])
    return {1, cnt}
end
local v = redis.call("GET", KEYS[2])
if not v then v = 0 else v = tonumber(v) end
return {0, v}
"#;

/// Removes the user from the actor set; only an actual removal decrements
/// the counter, and the counter is floored at zero.
const DECR_SCRIPT: &str = r#"
local removed = redis.call("SREM", KEYS[1], ARGV[1])
if removed == 1 then
    local cnt = redis.call("DECR", KEYS[2])
    if cnt < 0 then
        redis.call("SET", KEYS[2], 0)
        cnt = 0
    end
    return {1, cnt}
end
local v = redis.call("GET", KEYS[2])
if not v then v = 0 else v = tonumber(v) end
return {0, v}
"#;

/// Cache policy knobs.
#[derive(Debug, Clone)]
pub struct InteractionConfig {
    /// Base TTL for positive cache entries.
    pub base_ttl: Duration,
    /// Jitter added on top of the base TTL.
    pub ttl_jitter: Duration,
    /// TTL for the empty-value marker.
    pub negative_ttl: Duration,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            base_ttl: BASE_TTL,
            ttl_jitter: TTL_JITTER,
            negative_ttl: NEGATIVE_TTL,
        }
    }
}

/// Per-document interaction counters with idempotent per-user de-dup.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Record an interaction. Returns `(true, count)` when this user acted
    /// for the first time, `(false, current)` on a repeat.
    async fn incr(
        &self,
        kind: InteractionKind,
        doc_id: &str,
        user_id: u64,
    ) -> SocialResult<(bool, u64)>;

    /// Withdraw an interaction. Returns `(true, count)` when the user had
    /// acted, `(false, current)` otherwise; the count never goes negative.
    async fn decr(
        &self,
        kind: InteractionKind,
        doc_id: &str,
        user_id: u64,
    ) -> SocialResult<(bool, u64)>;

    /// Read the count through the protected cache.
    async fn get(&self, kind: InteractionKind, doc_id: &str) -> SocialResult<u64>;
}

/// Redis-backed [`InteractionStore`] over the shared substrate, with the
/// durable stats repository as the read-through source.
pub struct RedisInteractions {
    redis: Arc<RedisService>,
    stats: Arc<dyn DocStatsRepo>,
    flight: SingleFlight<u64>,
    config: InteractionConfig,
}

impl RedisInteractions {
    /// Create a counter store.
    pub fn new(redis: Arc<RedisService>, stats: Arc<dyn DocStatsRepo>) -> Self {
        Self::with_config(redis, stats, InteractionConfig::default())
    }

    /// Create a counter store with custom cache policy.
    pub fn with_config(
        redis: Arc<RedisService>,
        stats: Arc<dyn DocStatsRepo>,
        config: InteractionConfig,
    ) -> Self {
        Self {
            redis,
            stats,
            flight: SingleFlight::new(),
            config,
        }
    }

    async fn run_script(
        &self,
        script: &str,
        kind: InteractionKind,
        doc_id: &str,
        user_id: u64,
    ) -> SocialResult<(bool, u64)> {
        let actors = kind.actors_key(doc_id);
        let count = kind.count_key(doc_id);
        let user = user_id.to_string();
        let (changed, value): (i64, i64) = self
            .redis
            .eval(script, &[actors.as_str(), count.as_str()], &[user.as_str()])
            .await?;
        Ok((changed == 1, value.max(0) as u64))
    }
}

#[async_trait]
impl InteractionStore for RedisInteractions {
    async fn incr(
        &self,
        kind: InteractionKind,
        doc_id: &str,
        user_id: u64,
    ) -> SocialResult<(bool, u64)> {
        self.run_script(INCR_SCRIPT, kind, doc_id, user_id).await
    }

    async fn decr(
        &self,
        kind: InteractionKind,
        doc_id: &str,
        user_id: u64,
    ) -> SocialResult<(bool, u64)> {
        self.run_script(DECR_SCRIPT, kind, doc_id, user_id).await
    }

    async fn get(&self, kind: InteractionKind, doc_id: &str) -> SocialResult<u64> {
        let key = kind.count_key(doc_id);
        let redis = Arc::clone(&self.redis);
        let stats = Arc::clone(&self.stats);
        let config = self.config.clone();
        let doc = doc_id.to_string();

        self.flight
            .run(&key, || {
                let key = key.clone();
                async move {
                    if let Some(raw) = redis
                        .get_value::<String>(&key)
                        .await
                        .map_err(|e| e.to_string())?
                    {
                        return parse_cached_count(&raw).map_err(|e| e.to_string());
                    }

                    // cache miss: consult the source of truth
                    match stats.get_doc_stats(&doc).await.map_err(|e| e.to_string())? {
                        None => {
                            debug!(doc_id = %doc, "caching empty-value marker");
                            redis
                                .set_ex(&key, EMPTY_CACHE_MARKER, config.negative_ttl)
                                .await
                                .map_err(|e| e.to_string())?;
                            Ok(0)
                        }
                        Some(row) => {
                            let count = row.count_for(kind);
                            let ttl = jittered_ttl(config.base_ttl, config.ttl_jitter);
                            redis
                                .set_ex(&key, count, ttl)
                                .await
                                .map_err(|e| e.to_string())?;
                            Ok(count)
                        }
                    }
                }
            })
            .await
            .map_err(SocialError::Source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::DocStats;
    use coauthor_redis::RedisConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStats {
        row: Option<DocStats>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocStatsRepo for FixedStats {
        async fn get_doc_stats(&self, _doc_id: &str) -> SocialResult<Option<DocStats>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.row.clone())
        }
    }

    async fn store(row: Option<DocStats>) -> (RedisInteractions, Arc<FixedStats>) {
        let config = RedisConfig::builder().url("redis://localhost:6379").build();
        let redis = Arc::new(RedisService::new(config).await.unwrap());
        let stats = Arc::new(FixedStats {
            row,
            calls: AtomicUsize::new(0),
        });
        (RedisInteractions::new(redis, stats.clone()), stats)
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_incr_is_idempotent_per_user() {
        let (store, _) = store(None).await;
        let doc = "social-incr-doc";
        store.redis.delete(&InteractionKind::Like.count_key(doc)).await.unwrap();
        store.redis.delete(&InteractionKind::Like.actors_key(doc)).await.unwrap();

        assert_eq!(store.incr(InteractionKind::Like, doc, 7).await.unwrap(), (true, 1));
        assert_eq!(store.incr(InteractionKind::Like, doc, 7).await.unwrap(), (false, 1));
        assert_eq!(store.incr(InteractionKind::Like, doc, 9).await.unwrap(), (true, 2));

        assert_eq!(store.decr(InteractionKind::Like, doc, 7).await.unwrap(), (true, 1));
        assert_eq!(store.decr(InteractionKind::Like, doc, 7).await.unwrap(), (false, 1));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_decr_floors_at_zero() {
        let (store, _) = store(None).await;
        let doc = "social-floor-doc";
        store.redis.delete(&InteractionKind::Share.count_key(doc)).await.unwrap();
        store.redis.delete(&InteractionKind::Share.actors_key(doc)).await.unwrap();

        assert_eq!(store.decr(InteractionKind::Share, doc, 1).await.unwrap(), (false, 0));

        store.incr(InteractionKind::Share, doc, 1).await.unwrap();
        assert_eq!(store.decr(InteractionKind::Share, doc, 1).await.unwrap(), (true, 0));
        assert_eq!(store.decr(InteractionKind::Share, doc, 1).await.unwrap(), (false, 0));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_unknown_document_is_negatively_cached() {
        let (store, stats) = store(None).await;
        let doc = "social-missing-doc";
        store.redis.delete(&InteractionKind::Like.count_key(doc)).await.unwrap();

        assert_eq!(store.get(InteractionKind::Like, doc).await.unwrap(), 0);
        assert_eq!(store.get(InteractionKind::Like, doc).await.unwrap(), 0);
        // the second read hit the marker, not the repository
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_known_document_populates_cache() {
        let row = DocStats {
            doc_id: "social-known-doc".into(),
            like_count: 12,
            ..DocStats::default()
        };
        let (store, stats) = store(Some(row)).await;
        let doc = "social-known-doc";
        store.redis.delete(&InteractionKind::Like.count_key(doc)).await.unwrap();

        assert_eq!(store.get(InteractionKind::Like, doc).await.unwrap(), 12);
        assert_eq!(store.get(InteractionKind::Like, doc).await.unwrap(), 12);
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
    }
}

//! Presence store trait and Redis implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coauthor_redis::RedisService;

use crate::error::{PresenceError, PresenceResult};
use crate::keys::{cursor_key, doc_id_from_room_key, names_key, room_key, ROOM_PREFIX};

/// A live member of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMember {
    pub user_id: u64,
    pub username: String,
}

/// Live-member tracking per document.
///
/// Expiry is logical: a member's score is `now + ttl` at write time and a
/// member is alive while `score > now` at read time.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Add a member or refresh their expiry (idempotent refresh).
    async fn add_member(
        &self,
        doc_id: &str,
        user_id: u64,
        username: &str,
        ttl: Duration,
    ) -> PresenceResult<()>;

    /// Garbage-collect expired members and return the survivors with their
    /// usernames, atomically.
    async fn get_alive_members_with_names(
        &self,
        doc_id: &str,
    ) -> PresenceResult<Vec<PresenceMember>>;

    /// Enumerate documents that have a presence room.
    async fn get_documents(&self) -> PresenceResult<Vec<String>>;

    /// Store a member's cursor/selection blob with a physical TTL.
    async fn set_cursor(
        &self,
        doc_id: &str,
        user_id: u64,
        blob: &[u8],
        ttl: Duration,
    ) -> PresenceResult<()>;

    /// Fetch a member's cursor blob, if present and unexpired.
    async fn get_cursor(&self, doc_id: &str, user_id: u64) -> PresenceResult<Option<Vec<u8>>>;
}

/// Removes members whose logical expiry has passed, drops their names, and
/// returns the survivors as a flat [id, name, id, name, ...] array. One
/// script so concurrent `add_member` calls cannot resurrect entries that
/// are being collected.
const GC_AND_READ_SCRIPT: &str = r#"
local expired = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[1])
if #expired > 0 then
    redis.call("ZREMRANGEBYSCORE", KEYS[1], "-inf", ARGV[1])
    redis.call("HDEL", KEYS[2], unpack(expired))
end
local alive = redis.call("ZRANGEBYSCORE", KEYS[1], "(" .. ARGV[1], "+inf")
local out = {}
for i, id in ipairs(alive) do
    out[2 * i - 1] = id
    out[2 * i] = redis.call("HGET", KEYS[2], id) or ""
end
return out
"#;

/// Redis-backed [`PresenceStore`].
pub struct RedisPresence {
    redis: Arc<RedisService>,
}

impl RedisPresence {
    /// Create a presence store over the shared Redis service.
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl PresenceStore for RedisPresence {
    async fn add_member(
        &self,
        doc_id: &str,
        user_id: u64,
        username: &str,
        ttl: Duration,
    ) -> PresenceResult<()> {
        let expire_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut conn = self.redis.get().await?;
        // member zset and name hash move together
        let _: () = redis::pipe()
            .atomic()
            .zadd(room_key(doc_id), user_id, expire_at)
            .hset(names_key(doc_id), user_id, username)
            .query_async(&mut *conn)
            .await
            .map_err(coauthor_redis::RedisError::from)?;
        Ok(())
    }

    async fn get_alive_members_with_names(
        &self,
        doc_id: &str,
    ) -> PresenceResult<Vec<PresenceMember>> {
        let now = Utc::now().timestamp().to_string();
        let room = room_key(doc_id);
        let names = names_key(doc_id);
        let flat: Vec<String> = self
            .redis
            .eval(
                GC_AND_READ_SCRIPT,
                &[room.as_str(), names.as_str()],
                &[now.as_str()],
            )
            .await?;

        let mut members = Vec::with_capacity(flat.len() / 2);
        for pair in flat.chunks_exact(2) {
            let user_id: u64 = pair[0]
                .parse()
                .map_err(|_| PresenceError::Malformed(format!("user id {:?}", pair[0])))?;
            members.push(PresenceMember {
                user_id,
                username: pair[1].clone(),
            });
        }
        Ok(members)
    }

    async fn get_documents(&self) -> PresenceResult<Vec<String>> {
        let keys = self.redis.scan_keys(&format!("{ROOM_PREFIX}*")).await?;
        Ok(keys
            .iter()
            .filter_map(|k| doc_id_from_room_key(k))
            .map(str::to_string)
            .collect())
    }

    async fn set_cursor(
        &self,
        doc_id: &str,
        user_id: u64,
        blob: &[u8],
        ttl: Duration,
    ) -> PresenceResult<()> {
        self.redis
            .set_ex(&cursor_key(doc_id, user_id), blob, ttl)
            .await?;
        Ok(())
    }

    async fn get_cursor(&self, doc_id: &str, user_id: u64) -> PresenceResult<Option<Vec<u8>>> {
        let blob: Option<Vec<u8>> = self.redis.get_value(&cursor_key(doc_id, user_id)).await?;
        Ok(blob)
    }
}

//! # Redis
//!
//! The coordination store backend.
//!
//! Core purpose is the atomic admit: prune stale slots, compare cardinality
//! against the form's capacity, and insert — all inside one Lua script so no
//! two workers can jointly exceed capacity. Everything else (queue ranking,
//! ticket records) also lives here, but only the admit needs atomicity.
//!
//! ## Requirements
//!
//! - One round trip per operation; polls are short-interval and frequent
//! - Per-key TTLs so abandoned state evaporates on its own
//! - Sorted sets for ranking: equal scores order lexicographically by
//!   member, which is exactly the queue tie-break we want
//!
//! ## Self-healing
//!
//! Admitted slots are scored by last-seen time and pruned inside the admit
//! script itself, so a crashed client's slot is reclaimed by the next
//! admission attempt. The keys additionally carry a Redis TTL: a form nobody
//! polls for a full ticket TTL loses its whole waiting-room state.

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    store::{CoordinationStore, StoreError, admitted_key, queue_key, seen_key, ticket_key},
    ticket::AdmissionTicket,
};

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();

    client
        .get_connection_manager_with_config(config)
        .await
        .unwrap()
}

// KEYS: admitted, queue, seen; ARGV: max, cutoff, now, client, ttl
const ADMIT_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[2])
if tonumber(redis.call('ZCARD', KEYS[1])) < tonumber(ARGV[1]) then
    redis.call('ZADD', KEYS[1], ARGV[3], ARGV[4])
    redis.call('EXPIRE', KEYS[1], ARGV[5])
    redis.call('ZREM', KEYS[2], ARGV[4])
    redis.call('ZREM', KEYS[3], ARGV[4])
    return 1
end
return 0
"#;

// KEYS: admitted; ARGV: now, client, ttl
const TOUCH_SCRIPT: &str = r#"
if redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
    redis.call('EXPIRE', KEYS[1], ARGV[3])
    return 1
end
return 0
"#;

// KEYS: queue, seen; ARGV: issued, now, client, ttl
const ENQUEUE_SCRIPT: &str = r#"
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[3])
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
redis.call('EXPIRE', KEYS[1], ARGV[4])
redis.call('EXPIRE', KEYS[2], ARGV[4])
return 1
"#;

// KEYS: queue, seen; ARGV: cutoff, client
const RANK_SCRIPT: &str = r#"
local stale = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, member in ipairs(stale) do
    redis.call('ZREM', KEYS[1], member)
end
if #stale > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
end
return redis.call('ZRANK', KEYS[1], ARGV[2])
"#;

// KEYS: admitted, queue, seen, ticket; ARGV: client
const RELEASE_SCRIPT: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
redis.call('DEL', KEYS[4])
return removed
"#;

/// [`CoordinationStore`] over a shared Redis.
pub struct RedisStore {
    connection: ConnectionManager,
    admit: Script,
    touch: Script,
    enqueue: Script,
    rank: Script,
    release: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Self {
        Self::new(init_redis(redis_url).await)
    }

    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            admit: Script::new(ADMIT_SCRIPT),
            touch: Script::new(TOUCH_SCRIPT),
            enqueue: Script::new(ENQUEUE_SCRIPT),
            rank: Script::new(RANK_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

fn cutoff(now: u64, ttl_secs: u64) -> u64 {
    now.saturating_sub(ttl_secs)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn try_admit(
        &self,
        form_id: &str,
        client_id: &str,
        max_concurrent: u32,
        now: u64,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let admitted: i64 = self
            .admit
            .key(admitted_key(form_id))
            .key(queue_key(form_id))
            .key(seen_key(form_id))
            .arg(max_concurrent)
            .arg(cutoff(now, ttl_secs))
            .arg(now)
            .arg(client_id)
            .arg(ttl_secs)
            .invoke_async(&mut connection)
            .await?;

        Ok(admitted == 1)
    }

    async fn touch_admitted(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let refreshed: i64 = self
            .touch
            .key(admitted_key(form_id))
            .arg(now)
            .arg(client_id)
            .arg(ttl_secs)
            .invoke_async(&mut connection)
            .await?;

        Ok(refreshed == 1)
    }

    async fn enqueue(
        &self,
        form_id: &str,
        client_id: &str,
        issued_at: u64,
        now: u64,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: i64 = self
            .enqueue
            .key(queue_key(form_id))
            .key(seen_key(form_id))
            .arg(issued_at)
            .arg(now)
            .arg(client_id)
            .arg(ttl_secs)
            .invoke_async(&mut connection)
            .await?;

        Ok(())
    }

    async fn queue_position(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>, StoreError> {
        let mut connection = self.connection.clone();
        let rank: Option<i64> = self
            .rank
            .key(queue_key(form_id))
            .key(seen_key(form_id))
            .arg(cutoff(now, ttl_secs))
            .arg(client_id)
            .invoke_async(&mut connection)
            .await?;

        Ok(rank.map(|rank| rank as u64 + 1))
    }

    async fn release(&self, form_id: &str, client_id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let freed: i64 = self
            .release
            .key(admitted_key(form_id))
            .key(queue_key(form_id))
            .key(seen_key(form_id))
            .key(ticket_key(form_id, client_id))
            .arg(client_id)
            .invoke_async(&mut connection)
            .await?;

        Ok(freed == 1)
    }

    async fn get_ticket(
        &self,
        form_id: &str,
        client_id: &str,
    ) -> Result<Option<AdmissionTicket>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(ticket_key(form_id, client_id)).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_ticket(&self, ticket: &AdmissionTicket, ttl_secs: u64) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let raw = serde_json::to_string(ticket)?;
        let _: () = connection
            .set_ex(ticket_key(&ticket.form_id, &ticket.client_id), raw, ttl_secs)
            .await?;

        Ok(())
    }
}

//! Redis-backed session store
//!
//! Every instance of the service shares the same Redis, so sessions and the
//! deny-list are visible across processes. Refresh rotation uses a Lua
//! script so the compare and the swap run as one server-side step.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::time::Duration;
use uuid::Uuid;

use super::{denylist_key, session_key, SessionStore, StoreError};

/// Replace KEYS[1] with ARGV[2] (TTL ARGV[3] seconds) only when it holds ARGV[1]
const COMPARE_AND_SWAP: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub struct RedisSessionStore {
    conn: ConnectionManager,
    cas: Script,
}

impl RedisSessionStore {
    /// Open a managed connection; reconnects are handled by the manager
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(url = %redact_url(redis_url), "Connected to Redis session store");

        Ok(Self {
            conn,
            cas: Script::new(COMPARE_AND_SWAP),
        })
    }
}

/// SET EX rejects zero; sub-second TTLs round up to one second
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Drop credentials from a connection URL before logging it
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put_session(
        &self,
        subject_id: Uuid,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(session_key(subject_id))
            .arg(refresh_token)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_session(&self, subject_id: Uuid) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(session_key(subject_id))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn replace_session(
        &self,
        subject_id: Uuid,
        expected: &str,
        replacement: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .cas
            .key(session_key(subject_id))
            .arg(expected)
            .arg(replacement)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn delete_session(&self, subject_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(session_key(subject_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn denylist(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError> {
        // Nothing to do for a credential that has already expired
        if ttl.is_zero() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(denylist_key(credential_id))
            .arg(1)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_denylisted(&self, credential_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: i64 = redis::cmd("EXISTS")
            .arg(denylist_key(credential_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

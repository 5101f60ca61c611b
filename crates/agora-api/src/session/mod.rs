//! Shared session and deny-list store
//!
//! Two key families live in the store:
//! - `session:{subject_id}` holds the single current refresh credential of
//!   an identity, with a TTL of the refresh lifetime
//! - `denylist:{credential_id}` marks an access credential revoked before
//!   its natural expiry, with a TTL of its remaining lifetime
//!
//! Every backend is reached through [`SessionStore`]; handlers get a handle
//! through the application state, never a global.

pub mod memory;
pub mod redis;

pub use memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Store failures; callers treat all of them as "cannot authenticate"
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

pub fn session_key(subject_id: Uuid) -> String {
    format!("session:{subject_id}")
}

pub fn denylist_key(credential_id: &str) -> String {
    format!("denylist:{credential_id}")
}

/// Key/value store with per-key expiry holding sessions and the deny-list
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unconditionally store `refresh_token` as the current session (last
    /// writer wins)
    async fn put_session(
        &self,
        subject_id: Uuid,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Current refresh credential for the subject, if any
    async fn get_session(&self, subject_id: Uuid) -> Result<Option<String>, StoreError>;

    /// Atomically replace the session with `replacement` only if it still
    /// holds exactly `expected`. Returns whether the swap happened.
    async fn replace_session(
        &self,
        subject_id: Uuid,
        expected: &str,
        replacement: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn delete_session(&self, subject_id: Uuid) -> Result<(), StoreError>;

    /// Deny-list a credential for `ttl`, its remaining lifetime
    async fn denylist(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn is_denylisted(&self, credential_id: &str) -> Result<bool, StoreError>;

    /// Round-trip check used by the readiness probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Bounds every call of the wrapped store; an elapsed call is `Unavailable`
pub struct TimeoutStore {
    inner: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    store = self.inner.name(),
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Session store call timed out"
                );
                Err(StoreError::Unavailable(format!("{op} timed out")))
            }
        }
    }
}

#[async_trait]
impl SessionStore for TimeoutStore {
    async fn put_session(
        &self,
        subject_id: Uuid,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.bounded(
            "put_session",
            self.inner.put_session(subject_id, refresh_token, ttl),
        )
        .await
    }

    async fn get_session(&self, subject_id: Uuid) -> Result<Option<String>, StoreError> {
        self.bounded("get_session", self.inner.get_session(subject_id))
            .await
    }

    async fn replace_session(
        &self,
        subject_id: Uuid,
        expected: &str,
        replacement: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.bounded(
            "replace_session",
            self.inner
                .replace_session(subject_id, expected, replacement, ttl),
        )
        .await
    }

    async fn delete_session(&self, subject_id: Uuid) -> Result<(), StoreError> {
        self.bounded("delete_session", self.inner.delete_session(subject_id))
            .await
    }

    async fn denylist(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("denylist", self.inner.denylist(credential_id, ttl))
            .await
    }

    async fn is_denylisted(&self, credential_id: &str) -> Result<bool, StoreError> {
        self.bounded("is_denylisted", self.inner.is_denylisted(credential_id))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", self.inner.ping()).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

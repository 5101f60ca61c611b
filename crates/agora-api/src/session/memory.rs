//! In-process session store
//!
//! Expiry is evaluated against the injected [`Clock`], so tests can move
//! time forward with a `ManualClock` instead of sleeping. Reads drop the
//! expired key they hit; writes sweep every expired key at most once per
//! [`SWEEP_INTERVAL_SECS`], so keys nobody reads again still leave the map.

use agora_core::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{denylist_key, session_key, SessionStore, StoreError};

/// Minimum spacing between two full sweeps
pub const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    last_sweep: Option<u64>,
}

impl Inner {
    /// Drop every expired entry if the last sweep is old enough
    fn sweep(&mut self, now: u64) {
        if self
            .last_sweep
            .is_some_and(|at| now < at.saturating_add(SWEEP_INTERVAL_SECS))
        {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        self.last_sweep = Some(now);

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "Swept expired session keys");
        }
    }

    fn insert(&mut self, key: String, entry: Entry, now: u64) {
        self.sweep(now);
        self.entries.insert(key, entry);
    }
}

pub struct MemorySessionStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Number of live (unexpired) keys
    pub async fn live_keys(&self) -> usize {
        let now = self.clock.now();
        let inner = self.inner.lock().await;
        inner.entries.values().filter(|e| e.expires_at > now).count()
    }

    /// Live value under `key`, dropping it when expired
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: u64) -> Option<&'a Entry> {
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        entries.get(key)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put_session(
        &self,
        subject_id: Uuid,
        refresh_token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let entry = Entry {
            value: refresh_token.to_string(),
            expires_at: now.saturating_add(ttl.as_secs()),
        };
        self.inner
            .lock()
            .await
            .insert(session_key(subject_id), entry, now);
        Ok(())
    }

    async fn get_session(&self, subject_id: Uuid) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        Ok(Self::live(&mut inner.entries, &session_key(subject_id), now).map(|e| e.value.clone()))
    }

    async fn replace_session(
        &self,
        subject_id: Uuid,
        expected: &str,
        replacement: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = session_key(subject_id);
        let now = self.clock.now();

        // Compare and swap under a single lock acquisition
        let mut inner = self.inner.lock().await;
        let matches =
            Self::live(&mut inner.entries, &key, now).is_some_and(|e| e.value == expected);
        if !matches {
            return Ok(false);
        }

        inner.insert(
            key,
            Entry {
                value: replacement.to_string(),
                expires_at: now.saturating_add(ttl.as_secs()),
            },
            now,
        );
        Ok(true)
    }

    async fn delete_session(&self, subject_id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().await.entries.remove(&session_key(subject_id));
        Ok(())
    }

    async fn denylist(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let now = self.clock.now();
        let entry = Entry {
            value: "1".to_string(),
            expires_at: now.saturating_add(ttl.as_secs()),
        };
        self.inner
            .lock()
            .await
            .insert(denylist_key(credential_id), entry, now);
        Ok(())
    }

    async fn is_denylisted(&self, credential_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        Ok(Self::live(&mut inner.entries, &denylist_key(credential_id), now).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

//! Credential pair storage
//!
//! Wraps a `KeyValueStore` and enforces the pair invariant: the access and
//! refresh tokens are either both present or both absent. A tokio Mutex
//! serializes writes and pair reads so no reader observes a pair mid-update.
//!
//! Every successful `set()` advances an epoch counter. Requests remember
//! the epoch they were sent with; the coordinator compares it to the
//! current one to tell whether someone else already rotated the pair.
//!
//! A separate session generation advances on `clear()` and
//! `begin_session()`. A refresh captures it before reading the refresh
//! token and persists its result with `set_if_generation()`, so a pair
//! obtained for a session that has since been cleared is never written.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{
    ACCESS_TOKEN_KEY, DEFAULT_CLEAR_KEYS, DEFAULT_CLEAR_PREFIXES, REFRESH_TOKEN_KEY,
};
use crate::error::Result;
use crate::kv::KeyValueStore;

/// Access/refresh credential pair. Both values are redacted in Debug output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    access_token: Secret<String>,
    refresh_token: Secret<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
        }
    }

    /// Token value for the `Authorization` header.
    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    /// Token value for the refresh call.
    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose()
    }
}

/// Keys removed by `CredentialStore::clear()` in addition to the pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearPolicy {
    /// Exact key names
    #[serde(default = "default_clear_keys")]
    pub keys: Vec<String>,
    /// Key name prefixes
    #[serde(default = "default_clear_prefixes")]
    pub prefixes: Vec<String>,
}

fn default_clear_keys() -> Vec<String> {
    DEFAULT_CLEAR_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_clear_prefixes() -> Vec<String> {
    DEFAULT_CLEAR_PREFIXES.iter().map(|p| p.to_string()).collect()
}

impl Default for ClearPolicy {
    fn default() -> Self {
        Self {
            keys: default_clear_keys(),
            prefixes: default_clear_prefixes(),
        }
    }
}

impl ClearPolicy {
    fn owns(&self, key: &str) -> bool {
        key == ACCESS_TOKEN_KEY
            || key == REFRESH_TOKEN_KEY
            || self.keys.iter().any(|k| k == key)
            || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// Credential store shared by the dispatcher (reads) and coordinator (writes).
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    clear_policy: ClearPolicy,
    epoch: AtomicU64,
    generation: AtomicU64,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, clear_policy: ClearPolicy) -> Self {
        Self {
            backend,
            clear_policy,
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Persist a new pair and return the epoch it was stored under.
    ///
    /// If the second write fails the first is rolled back, leaving the
    /// store without a pair rather than with half of one.
    pub async fn set(&self, pair: &CredentialPair) -> Result<u64> {
        let _guard = self.lock.lock().await;
        self.write_pair(pair).await
    }

    /// Store the pair from a fresh login. Starts a new session generation,
    /// so refreshes still running for the previous session are discarded.
    pub async fn begin_session(&self, pair: &CredentialPair) -> Result<u64> {
        let _guard = self.lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.write_pair(pair).await
    }

    /// Store the pair only if the session generation is still `generation`.
    ///
    /// Returns `Ok(None)` without writing when the session was cleared or
    /// replaced in the meantime.
    pub async fn set_if_generation(
        &self,
        pair: &CredentialPair,
        generation: u64,
    ) -> Result<Option<u64>> {
        let _guard = self.lock.lock().await;
        let current = self.generation.load(Ordering::SeqCst);
        if current != generation {
            debug!(expected = generation, current, "session changed, discarding credential pair");
            return Ok(None);
        }
        self.write_pair(pair).await.map(Some)
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Write both halves. Caller holds `lock`.
    async fn write_pair(&self, pair: &CredentialPair) -> Result<u64> {
        self.backend
            .set(ACCESS_TOKEN_KEY, pair.access_token().to_string())
            .await?;
        if let Err(e) = self
            .backend
            .set(REFRESH_TOKEN_KEY, pair.refresh_token().to_string())
            .await
        {
            warn!(error = %e, "failed to persist refresh token, rolling back access token");
            if let Err(rollback) = self.backend.remove(ACCESS_TOKEN_KEY).await {
                warn!(error = %rollback, "rollback of access token failed");
            }
            return Err(e);
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, "stored credential pair");
        Ok(epoch)
    }

    /// Current pair, or `None` if either half is missing.
    pub async fn get(&self) -> Result<Option<CredentialPair>> {
        Ok(self.snapshot().await?.map(|(pair, _)| pair))
    }

    /// Current pair together with the epoch it belongs to.
    pub async fn snapshot(&self) -> Result<Option<(CredentialPair, u64)>> {
        let _guard = self.lock.lock().await;
        let access = self.backend.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.backend.get(REFRESH_TOKEN_KEY).await?;
        let epoch = self.epoch.load(Ordering::SeqCst);
        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some((CredentialPair::new(access, refresh), epoch))),
            (None, None) => Ok(None),
            _ => {
                warn!("store holds only half of the credential pair, treating as absent");
                Ok(None)
            }
        }
    }

    /// Epoch of the most recent `set()`. Zero until the first one.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Remove the pair and every other session-owned key, and end the
    /// session generation.
    ///
    /// Idempotent: clearing an empty store succeeds and leaves it empty.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let keys = self.backend.keys().await?;
        let mut removed = 0usize;
        for key in keys.iter().filter(|k| self.clear_policy.owns(k)) {
            self.backend.remove(key).await?;
            removed += 1;
        }
        info!(removed, "cleared session store");
        Ok(())
    }
}

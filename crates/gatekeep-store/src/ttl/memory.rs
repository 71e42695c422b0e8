//! In-process TTL store for tests and single-node development.
//!
//! Expiry is checked lazily on access against `tokio::time::Instant`,
//! so tests running with a paused clock can advance past a TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use gatekeep_core::error::{GatekeepError, GatekeepResult};
use gatekeep_core::repository::TtlStore;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTtlStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> GatekeepResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_poisoned| GatekeepError::Store("memory store lock poisoned".into()))
    }

    /// Remaining lifetime of `key`, if it is live.
    pub fn ttl(&self, key: &str) -> GatekeepResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now))
    }
}

impl TtlStore for MemoryTtlStore {
    async fn get(&self, key: &str) -> GatekeepResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<()> {
        let expires_at = Instant::now() + ttl;
        self.lock()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> GatekeepResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn get_del(&self, key: &str) -> GatekeepResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> GatekeepResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if entries
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected)
        {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

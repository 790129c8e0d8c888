//! Counter store behind the quota checks.
//!
//! The store is external and may fail on its own; callers treat every
//! error as "store unavailable", never as "quota exceeded".

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("counter {key} holds a non-integer value {value:?}")]
    Corrupt { key: String, value: String },
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    // A disabled store turns quota enforcement off entirely.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Current count under `key`; an absent key reads as 0.
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// Overwrite `key` with `value`, expiring after `ttl`.
    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError>;
}

// Stand-in used when no counter store is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

#[async_trait]
impl QuotaStore for DisabledStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn put(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }
}

// Redis wins over the in-process store; neither means quota is off
pub fn open(redis_url: Option<&str>, memory: bool) -> Result<Arc<dyn QuotaStore>, StoreError> {
    match redis_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => Ok(Arc::new(RedisStore::open(url)?)),
        None if memory => {
            info!("Using in-process counter store (single instance only)");
            Ok(Arc::new(MemoryStore::new()))
        }
        None => {
            info!("No counter store configured, quota enforcement disabled");
            Ok(Arc::new(DisabledStore))
        }
    }
}

use super::{QuotaStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// Counter store living in this process. Expired entries read as absent
/// and are swept on write.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|entry| (entry.count, entry.expires_at > now));
        match live {
            Some((count, true)) => Ok(count),
            Some((_, false)) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(0)
            }
            None => Ok(0),
        }
    }

    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries.insert(
            key.to_string(),
            CounterEntry {
                count: value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

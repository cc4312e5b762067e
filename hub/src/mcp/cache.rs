//! Aggregated tool cache
//!
//! Records and the name→owner index live in one struct so every mutation
//! keeps them in step.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::types::ToolRecord;

#[derive(Debug, Default)]
pub struct ToolCache {
    records: HashMap<String, ToolRecord>,
    owners: HashMap<String, String>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record stored under `key`
    pub fn insert(&mut self, key: String, record: ToolRecord) {
        self.owners.insert(key.clone(), record.server.clone());
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &str) -> Option<&ToolRecord> {
        self.records.get(key)
    }

    /// Owning server of a cached tool
    pub fn owner(&self, key: &str) -> Option<&str> {
        self.owners.get(key).map(String::as_str)
    }

    /// Drop every record owned by `server`; returns how many went
    pub fn remove_server(&mut self, server: &str) -> usize {
        let keys: Vec<String> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == server)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.owners.clear();
    }

    /// Evict records older than `ttl`, then the oldest until at most `cap` remain
    ///
    /// Returns `(expired, evicted)`.
    pub fn prune(&mut self, now: Instant, ttl: Duration, cap: usize) -> (usize, usize) {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.cached_at) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }

        let mut evicted = 0;
        if self.records.len() > cap {
            let mut by_age: Vec<(Instant, String)> = self
                .records
                .iter()
                .map(|(key, record)| (record.cached_at, key.clone()))
                .collect();
            by_age.sort();
            let excess = self.records.len() - cap;
            for (_, key) in by_age.into_iter().take(excess) {
                self.remove(&key);
                evicted += 1;
            }
        }

        (expired.len(), evicted)
    }

    fn remove(&mut self, key: &str) {
        self.records.remove(key);
        self.owners.remove(key);
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.records.len() == self.owners.len()
            && self
                .records
                .iter()
                .all(|(key, record)| self.owners.get(key) == Some(&record.server))
    }
}

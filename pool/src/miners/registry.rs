//! Fixed-shard concurrent map from login string to `Miner`.
//!
//! Each shard is an independent `RwLock<HashMap<..>>`; the shard for a key
//! is chosen by an FNV-1a hash of the key mod the shard count, so unrelated
//! keys never contend on the same lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::miners::miner::Miner;

const SHARD_COUNT: usize = 32;

fn fnv1a(key: &str) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub struct MinerRegistry {
    shards: Vec<RwLock<HashMap<String, Arc<Miner>>>>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, key: &str) -> &RwLock<HashMap<String, Arc<Miner>>> {
        let idx = (fnv1a(key) as usize) % SHARD_COUNT;
        &self.shards[idx]
    }

    pub fn set(&self, key: String, miner: Arc<Miner>) {
        self.shard_for(&key).write().unwrap().insert(key, miner);
    }

    pub fn get(&self, key: &str) -> Option<Arc<Miner>> {
        self.shard_for(key).read().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) {
        self.shard_for(key).write().unwrap().remove(key);
    }

    pub fn count(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }

    /// Materializes a snapshot of every miner so callers can iterate (e.g.
    /// to broadcast or compute stats) without holding any shard lock.
    pub fn iter_buffered(&self) -> Vec<Arc<Miner>> {
        let mut out = Vec::with_capacity(self.count());
        for shard in &self.shards {
            out.extend(shard.read().unwrap().values().cloned());
        }
        out
    }
}

impl Default for MinerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let registry = MinerRegistry::new();
        let miner = Arc::new(Miner::new("addr1".to_string(), "127.0.0.1".to_string()));
        registry.set("addr1".to_string(), miner.clone());
        assert!(registry.get("addr1").is_some());
        assert_eq!(registry.count(), 1);
        registry.remove("addr1");
        assert!(registry.get("addr1").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn unrelated_keys_are_independent() {
        let registry = MinerRegistry::new();
        for i in 0..200 {
            let key = format!("addr{i}");
            registry.set(
                key.clone(),
                Arc::new(Miner::new(key, "127.0.0.1".to_string())),
            );
        }
        assert_eq!(registry.count(), 200);
        registry.remove("addr57");
        assert_eq!(registry.count(), 199);
        assert!(registry.get("addr56").is_some());
        assert!(registry.get("addr58").is_some());
    }

    #[test]
    fn iter_buffered_returns_all_entries() {
        let registry = MinerRegistry::new();
        for i in 0..10 {
            let key = format!("addr{i}");
            registry.set(
                key.clone(),
                Arc::new(Miner::new(key, "127.0.0.1".to_string())),
            );
        }
        assert_eq!(registry.iter_buffered().len(), 10);
    }
}

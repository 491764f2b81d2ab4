//! Per-identity counters and rolling hashrate tracking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::time::now_ms;

const SHARES_WINDOW_SECS: i64 = 86_400;

/// One miner identity, keyed by login string in the registry. Survives
/// across session churn: a reconnecting miner with the same login reuses
/// this instance's counters.
pub struct Miner {
    pub id: String,
    pub ip: Mutex<String>,
    last_beat: AtomicI64,
    pub valid_shares: AtomicU64,
    pub invalid_shares: AtomicU64,
    pub stale_shares: AtomicU64,
    pub accepts: AtomicU64,
    pub rejects: AtomicU64,
    shares: Mutex<BTreeMap<i64, u64>>,
}

impl Miner {
    pub fn new(id: String, ip: String) -> Self {
        let miner = Self {
            id,
            ip: Mutex::new(ip),
            last_beat: AtomicI64::new(0),
            valid_shares: AtomicU64::new(0),
            invalid_shares: AtomicU64::new(0),
            stale_shares: AtomicU64::new(0),
            accepts: AtomicU64::new(0),
            rejects: AtomicU64::new(0),
            shares: Mutex::new(BTreeMap::new()),
        };
        miner.heartbeat();
        miner
    }

    pub fn heartbeat(&self) {
        self.last_beat.store(now_ms(), Ordering::Relaxed);
    }

    pub fn last_beat(&self) -> i64 {
        self.last_beat.load(Ordering::Relaxed)
    }

    /// Records `difficulty` worth of share credit at the current second and
    /// trims entries older than the 24h window.
    pub fn store_share(&self, difficulty: u64) {
        let now = now_ms() / 1000;
        let mut shares = self.shares.lock().unwrap();
        *shares.entry(now).or_insert(0) += difficulty;
        let cutoff = now - SHARES_WINDOW_SECS;
        shares.retain(|&second, _| second >= cutoff);
    }

    /// Sum of share difficulty recorded within the last `window_secs`,
    /// divided by the window: an average hashes-per-second estimate.
    pub fn hashrate(&self, window_secs: i64) -> f64 {
        let now = now_ms() / 1000;
        let cutoff = now - window_secs;
        let shares = self.shares.lock().unwrap();
        let total: u64 = shares
            .range(cutoff..)
            .map(|(_, diff)| *diff)
            .sum();
        if window_secs <= 0 {
            0.0
        } else {
            total as f64 / window_secs as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_miner_has_zeroed_counters() {
        let miner = Miner::new("addr1".to_string(), "127.0.0.1".to_string());
        assert_eq!(miner.valid_shares.load(Ordering::Relaxed), 0);
        assert!(miner.last_beat() > 0);
    }

    #[test]
    fn hashrate_reflects_stored_shares() {
        let miner = Miner::new("addr1".to_string(), "127.0.0.1".to_string());
        miner.store_share(1000);
        miner.store_share(2000);
        assert!(miner.hashrate(600) > 0.0);
    }
}

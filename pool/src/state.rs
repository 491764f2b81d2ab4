//! Process-wide shared state: everything that outlives any one session.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use num_bigint::BigUint;

use crate::blockchain::TemplateRefresher;
use crate::config::Config;
use crate::miners::MinerRegistry;
use crate::time::now_ms;

const LARGE_LUCK_WINDOW_MS: i64 = 3 * 3600 * 1000;

#[derive(Debug, Clone)]
pub struct BlockStat {
    pub height: i64,
    pub hash: String,
    pub variance: f64,
}

/// Shared across every endpoint, session, and background task in the process.
pub struct PoolState {
    pub config: Config,
    pub refresher: Arc<TemplateRefresher>,
    pub miners: MinerRegistry,
    pub round_shares: AtomicI64,
    block_stats: Mutex<BTreeMap<i64, BlockStat>>,
}

impl PoolState {
    pub fn new(config: Config, refresher: Arc<TemplateRefresher>) -> Self {
        Self {
            config,
            refresher,
            miners: MinerRegistry::new(),
            round_shares: AtomicI64::new(0),
            block_stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Swaps `round_shares` to 0, returning the pre-swap value so the caller
    /// can compute the round's variance against it.
    pub fn reset_round_shares(&self) -> i64 {
        self.round_shares.swap(0, Ordering::AcqRel)
    }

    pub fn add_round_shares(&self, difficulty: u64) {
        self.round_shares.fetch_add(difficulty as i64, Ordering::Relaxed);
    }

    /// Records a found block keyed by `found-at-ms`; trims entries older than
    /// the large-luck window.
    pub fn record_block(&self, height: i64, hash: String, round_shares_before: i64, difficulty: &BigUint) {
        let variance = if difficulty == &BigUint::from(0u32) {
            0.0
        } else {
            round_shares_before as f64 / bigint_to_f64(difficulty)
        };
        let now = now_ms();
        let mut stats = self.block_stats.lock().unwrap();
        stats.insert(
            now,
            BlockStat {
                height,
                hash,
                variance,
            },
        );
        let cutoff = now - LARGE_LUCK_WINDOW_MS;
        stats.retain(|&found_at, _| found_at >= cutoff);
    }

    pub fn recent_blocks(&self) -> Vec<BlockStat> {
        self.block_stats.lock().unwrap().values().cloned().collect()
    }
}

fn bigint_to_f64(value: &BigUint) -> f64 {
    value.to_string().parse().unwrap_or(f64::INFINITY)
}

//! Background observability task: walks the miner registry on a fixed
//! interval and logs aggregate pool hashrate. No HTTP surface — the
//! frontend/API layer this fed in the reference implementation is out of
//! scope here.

use std::sync::Arc;
use std::time::Duration;

use crate::state::PoolState;

pub async fn run(state: Arc<PoolState>, estimation_window: Duration) {
    let window_secs = estimation_window.as_secs() as i64;
    let mut ticker = tokio::time::interval(estimation_window);
    loop {
        ticker.tick().await;
        let miners = state.miners.iter_buffered();
        let mut pool_hashrate = 0.0;
        for miner in &miners {
            pool_hashrate += miner.hashrate(window_secs);
        }
        tracing::info!(
            miners = miners.len(),
            pool_hashrate,
            round_shares = state.round_shares.load(std::sync::atomic::Ordering::Relaxed),
            "pool stats"
        );
    }
}

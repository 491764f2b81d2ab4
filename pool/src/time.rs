//! Wall-clock helpers shared by every module that stamps or windows
//! timestamps (miner heartbeats, share buckets, block stats, idle deadlines).

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

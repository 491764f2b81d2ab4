//! Miner-facing protocol errors and internal (non-protocol) failures.

use serde::Serialize;
use thiserror::Error;

/// Every Stratum error the session loop can hand back to a miner. All of them
/// carry code `-1`; only the message and whether the connection should be
/// closed after sending it vary.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StratumError {
    pub code: i32,
    pub message: &'static str,
    #[serde(skip)]
    pub close: bool,
}

impl StratumError {
    const fn new(message: &'static str, close: bool) -> Self {
        Self {
            code: -1,
            message,
            close,
        }
    }

    pub const fn invalid_address() -> Self {
        Self::new("Invalid address used for login", true)
    }

    pub const fn job_not_ready() -> Self {
        Self::new("Job not ready", true)
    }

    pub const fn unauthenticated() -> Self {
        Self::new("Unauthenticated", true)
    }

    pub const fn invalid_job_id() -> Self {
        Self::new("Invalid job id", true)
    }

    pub const fn malformed_nonce() -> Self {
        Self::new("Malformed nonce", true)
    }

    pub const fn duplicate_share() -> Self {
        Self::new("Duplicate share", true)
    }

    pub const fn block_expired() -> Self {
        Self::new("Block expired", false)
    }

    /// `close` is `false` once the miner is already authenticated: a
    /// low-difficulty share from a known miner is a rejected share, not a
    /// reason to drop the connection.
    pub const fn low_difficulty_share(close: bool) -> Self {
        Self::new("Low difficulty share", close)
    }

    pub const fn invalid_method() -> Self {
        Self::new("Invalid method", true)
    }

    /// `close` mirrors `low_difficulty_share`: `false` once the miner is
    /// already authenticated, since a bad hash from a known miner is just a
    /// rejected share, not a reason to drop the connection.
    pub const fn bad_hash(close: bool) -> Self {
        Self::new("Bad hash", close)
    }
}

/// Non-protocol failures: things that cross an internal module boundary and are
/// not one of the fixed miner-facing messages above.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("upstream rpc failed: {0}")]
    Rpc(String),
    #[error("template decode failed: {0}")]
    TemplateDecode(#[from] hex::FromHexError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

//! Miner identities and the shard-partitioned registry that stores them.

pub mod miner;
pub mod registry;

pub use miner::Miner;
pub use registry::MinerRegistry;

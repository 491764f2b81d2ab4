//! Polls the active upstream on two independent, resettable clocks and
//! publishes new `BlockTemplate` snapshots.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::blockchain::template::BlockTemplate;
use crate::blockchain::upstream::UpstreamPool;
use crate::stratum::broadcaster::JobBroadcaster;

pub struct TemplateRefresher {
    upstream_pool: Arc<UpstreamPool>,
    current: Arc<ArcSwap<Option<BlockTemplate>>>,
    pool_address: String,
    reserve_size: usize,
    block_refresh_interval: Duration,
    upstream_check_interval: Duration,
    has_template: AtomicBool,
}

impl TemplateRefresher {
    pub fn new(
        upstream_pool: Arc<UpstreamPool>,
        pool_address: String,
        reserve_size: usize,
        block_refresh_interval: Duration,
        upstream_check_interval: Duration,
    ) -> Self {
        Self {
            upstream_pool,
            current: Arc::new(ArcSwap::from_pointee(None)),
            pool_address,
            reserve_size,
            block_refresh_interval,
            upstream_check_interval,
            has_template: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Arc<ArcSwap<Option<BlockTemplate>>> {
        self.current.clone()
    }

    pub fn current_template(&self) -> Option<BlockTemplate> {
        (**self.current.load()).clone()
    }

    /// Fetches the active upstream's current block template and, if it
    /// represents chain progress, publishes it. Returns whether a new
    /// template was published.
    pub async fn refresh(&self, broadcaster: Option<&JobBroadcaster>) -> bool {
        let upstream = self.upstream_pool.active();
        let reply = match upstream
            .get_block_template(self.reserve_size, &self.pool_address)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "block template refresh failed");
                return false;
            }
        };

        let existing = self.current_template();
        let is_new = match &existing {
            None => true,
            Some(current) => {
                if !reply.prev_hash.is_empty() && reply.prev_hash != current.prev_hash {
                    true
                } else if reply.prev_hash == current.prev_hash {
                    reply.prev_hash.is_empty() && reply.height > current.height
                } else {
                    false
                }
            }
        };
        if !is_new {
            return false;
        }

        let template = match BlockTemplate::decode(
            &reply.blob,
            reply.difficulty,
            reply.height,
            reply.prev_hash,
            reply.reserved_offset,
        ) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to decode block template");
                return false;
            }
        };

        tracing::info!(height = template.height, "new block template");
        self.current.store(Arc::new(Some(template)));
        self.has_template.store(true, Ordering::Release);

        if let Some(broadcaster) = broadcaster {
            broadcaster.broadcast_new_jobs().await;
        }
        true
    }

    pub fn has_template(&self) -> bool {
        self.has_template.load(Ordering::Acquire)
    }

    /// Drives the two independent clocks described in the component design:
    /// a block-refresh deadline (reset to `now + block_refresh_interval` on
    /// every successful refresh) and an upstream-health-check deadline.
    /// Deliberately uses resettable `sleep` futures rather than
    /// `tokio::time::interval`, which would keep firing on its original fixed
    /// schedule instead of rebasing off the last successful refresh.
    pub async fn run(self: Arc<Self>, broadcaster: Arc<JobBroadcaster>) {
        let _ = self.refresh(None).await;

        let mut block_deadline = Instant::now() + self.block_refresh_interval;
        let mut upstream_deadline = Instant::now() + self.upstream_check_interval;

        loop {
            tokio::select! {
                _ = sleep_until(block_deadline) => {
                    self.refresh(Some(broadcaster.as_ref())).await;
                    block_deadline = Instant::now() + self.block_refresh_interval;
                }
                _ = sleep_until(upstream_deadline) => {
                    self.upstream_pool
                        .check_all(self.reserve_size, &self.pool_address)
                        .await;
                    upstream_deadline = Instant::now() + self.upstream_check_interval;
                }
            }
        }
    }

    /// Called by the share validator after a block is successfully submitted;
    /// immediately resets the block-refresh deadline via a fresh `refresh`.
    pub async fn refresh_now(&self, broadcaster: &JobBroadcaster) {
        self.refresh(Some(broadcaster)).await;
    }
}

async fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        sleep(deadline - now).await;
    }
}

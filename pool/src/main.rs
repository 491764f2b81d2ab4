use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use monedge_pool::blockchain::{TemplateRefresher, Upstream, UpstreamPool};
use monedge_pool::config::{parse_duration, Config};
use monedge_pool::state::PoolState;
use monedge_pool::stratum::{Endpoint, JobBroadcaster, SessionContext, SessionRegistry};

const RESERVE_SIZE: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("POOL_CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::load(&config_path).with_context(|| format!("loading config from {config_path}"))?;

    let upstreams: Vec<Upstream> = config
        .upstream
        .iter()
        .map(|u| {
            let timeout = parse_duration(&u.timeout).unwrap_or(Duration::from_secs(5));
            Upstream::new(u, timeout)
        })
        .collect();
    let upstream_pool = Arc::new(UpstreamPool::new(upstreams));

    let block_refresh_interval = parse_duration(&config.block_refresh_interval)?;
    let upstream_check_interval = parse_duration(&config.upstream_check_interval)?;

    let refresher = Arc::new(TemplateRefresher::new(
        upstream_pool.clone(),
        config.address.clone(),
        RESERVE_SIZE,
        block_refresh_interval,
        upstream_check_interval,
    ));

    let sessions = Arc::new(SessionRegistry::new());
    let broadcaster = Arc::new(JobBroadcaster::new(sessions.clone(), refresher.clone()));
    let state = Arc::new(PoolState::new(config.clone(), refresher.clone()));
    let config = Arc::new(config);

    tracing::info!("fetching initial block template");
    refresher.refresh(None).await;

    {
        let refresher = refresher.clone();
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            refresher.run(broadcaster).await;
        });
    }

    {
        let state = state.clone();
        let estimation_window = parse_duration(&config.estimation_window).unwrap_or(Duration::from_secs(600));
        tokio::spawn(async move {
            monedge_pool::stats::run(state, estimation_window).await;
        });
    }

    for port_cfg in &config.stratum.ports {
        let endpoint = Arc::new(Endpoint::new(port_cfg)?);
        let ctx = Arc::new(SessionContext {
            endpoint: endpoint.clone(),
            sessions: sessions.clone(),
            state: state.clone(),
            upstream_pool: upstream_pool.clone(),
            refresher: refresher.clone(),
            broadcaster: broadcaster.clone(),
            config: config.clone(),
        });
        let listener = endpoint.bind().await?;
        tokio::spawn(async move {
            loop {
                let permit = ctx.endpoint.acquire_admission().await;
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            monedge_pool::stratum::session::run(stream, addr.ip().to_string(), ctx).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        });
    }

    shutdown_signal().await;
    tracing::info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = ctrl_c => tracing::info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to register Ctrl+C handler");
        tracing::info!("received Ctrl+C");
    }
}

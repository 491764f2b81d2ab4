//! Daemon JSON-RPC client with a consecutive-fail/consecutive-success health model,
//! and the pool of upstreams with active-index election.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::PoolError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GetBlockTemplateReply {
    #[serde(rename = "blocktemplate_blob")]
    pub blob: String,
    pub difficulty: u64,
    #[serde(rename = "reserved_offset")]
    pub reserved_offset: usize,
    pub height: i64,
    #[serde(rename = "prev_hash", default)]
    pub prev_hash: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct GetInfoReply {
    pub height: i64,
    pub status: String,
}

/// One configured daemon endpoint, with its own HTTP client and health counters.
pub struct Upstream {
    pub name: String,
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
    sick: AtomicBool,
    sick_rate: AtomicI64,
    success_rate: AtomicI64,
    pub accepts: AtomicI64,
    pub rejects: AtomicI64,
    pub last_submission_at: AtomicI64,
    pub fails_count: AtomicI64,
    info: Mutex<Option<GetInfoReply>>,
}

impl Upstream {
    pub fn new(cfg: &UpstreamConfig, timeout: Duration) -> Self {
        let base_url = format!("http://{}:{}/json_rpc", cfg.host, cfg.port);
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            name: cfg.name.clone(),
            base_url,
            client,
            timeout,
            sick: AtomicBool::new(false),
            sick_rate: AtomicI64::new(0),
            success_rate: AtomicI64::new(0),
            accepts: AtomicI64::new(0),
            rejects: AtomicI64::new(0),
            last_submission_at: AtomicI64::new(0),
            fails_count: AtomicI64::new(0),
            info: Mutex::new(None),
        }
    }

    pub fn sick(&self) -> bool {
        self.sick.load(Ordering::Relaxed)
    }

    fn mark_sick(&self) {
        let was_sick = self.sick.load(Ordering::Relaxed);
        if !was_sick {
            self.fails_count.fetch_add(1, Ordering::Relaxed);
        }
        let rate = self.sick_rate.fetch_add(1, Ordering::Relaxed) + 1;
        self.success_rate.store(0, Ordering::Relaxed);
        if rate >= 5 {
            self.sick.store(true, Ordering::Relaxed);
            tracing::warn!(upstream = %self.name, "upstream marked sick");
        }
    }

    fn mark_alive(&self) {
        let rate = self.success_rate.fetch_add(1, Ordering::Relaxed) + 1;
        if rate >= 5 {
            self.sick.store(false, Ordering::Relaxed);
            self.sick_rate.store(0, Ordering::Relaxed);
            self.success_rate.store(0, Ordering::Relaxed);
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PoolError> {
        let payload = RpcRequest {
            jsonrpc: "2.0",
            id: 0,
            method,
            params,
        };
        let body_bytes =
            serde_json::to_vec(&payload).map_err(|e| PoolError::Rpc(e.to_string()))?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.base_url.as_str())
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body_bytes)))
            .map_err(|e| PoolError::Rpc(e.to_string()))?;

        let result = tokio::time::timeout(self.timeout, self.client.request(req)).await;
        let response = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                self.mark_sick();
                return Err(PoolError::Rpc(e.to_string()));
            }
            Err(_) => {
                self.mark_sick();
                return Err(PoolError::Rpc("request timed out".to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.mark_sick();
            return Err(PoolError::Rpc(format!("http status {status}")));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| PoolError::Rpc(e.to_string()))?
            .to_bytes();
        let rpc_response: RpcResponse =
            serde_json::from_slice(&body).map_err(|e| PoolError::Rpc(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            self.mark_sick();
            return Err(PoolError::Rpc(error.to_string()));
        }

        self.mark_alive();
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    pub async fn get_block_template(
        &self,
        reserve_size: usize,
        address: &str,
    ) -> Result<GetBlockTemplateReply, PoolError> {
        let params = json!({ "reserve_size": reserve_size, "wallet_address": address });
        let value = self.call("getblocktemplate", params).await?;
        serde_json::from_value(value).map_err(|e| PoolError::Rpc(e.to_string()))
    }

    pub async fn submit_block(&self, hex_blob: &str) -> Result<(), PoolError> {
        self.call("submitblock", json!([hex_blob])).await?;
        Ok(())
    }

    pub async fn get_info(&self) -> Result<GetInfoReply, PoolError> {
        let value = self.call("get_info", json!({})).await?;
        serde_json::from_value(value).map_err(|e| PoolError::Rpc(e.to_string()))
    }

    pub async fn poll_info(&self) {
        if let Ok(info) = self.get_info().await {
            *self.info.lock().unwrap() = Some(info);
        }
    }

    pub fn cached_info(&self) -> Option<GetInfoReply> {
        self.info.lock().unwrap().clone()
    }
}

/// The set of configured daemons with active-index election.
pub struct UpstreamPool {
    upstreams: Vec<Upstream>,
    active_index: AtomicI32,
}

impl UpstreamPool {
    pub fn new(upstreams: Vec<Upstream>) -> Self {
        assert!(!upstreams.is_empty(), "at least one upstream is required");
        Self {
            upstreams,
            active_index: AtomicI32::new(0),
        }
    }

    pub fn active(&self) -> &Upstream {
        let idx = self.active_index.load(Ordering::Acquire) as usize;
        &self.upstreams[idx]
    }

    /// Probes every configured upstream in order; the first one that succeeds
    /// AND is currently healthy becomes active. Leaves the active index
    /// unchanged if none qualify.
    pub async fn check_all(&self, reserve_size: usize, pool_address: &str) {
        for (idx, upstream) in self.upstreams.iter().enumerate() {
            match upstream.get_block_template(reserve_size, pool_address).await {
                Ok(_) if !upstream.sick() => {
                    self.active_index.store(idx as i32, Ordering::Release);
                    return;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(upstream = %upstream.name, error = %e, "upstream check failed");
                    continue;
                }
            }
        }
    }

    pub async fn poll_info(&self) {
        for upstream in &self.upstreams {
            upstream.poll_info().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 18081,
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn health_model_trips_sick_after_five_fails() {
        let upstream = Upstream::new(&cfg("a"), Duration::from_secs(1));
        for _ in 0..4 {
            upstream.mark_sick();
            assert!(!upstream.sick());
        }
        upstream.mark_sick();
        assert!(upstream.sick());
        assert_eq!(upstream.fails_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn health_model_recovers_after_five_successes() {
        let upstream = Upstream::new(&cfg("a"), Duration::from_secs(1));
        for _ in 0..5 {
            upstream.mark_sick();
        }
        assert!(upstream.sick());
        for _ in 0..4 {
            upstream.mark_alive();
            assert!(upstream.sick());
        }
        upstream.mark_alive();
        assert!(!upstream.sick());
    }

    #[test]
    fn active_defaults_to_first_upstream() {
        let pool = UpstreamPool::new(vec![
            Upstream::new(&cfg("a"), Duration::from_secs(1)),
            Upstream::new(&cfg("b"), Duration::from_secs(1)),
        ]);
        assert_eq!(pool.active().name, "a");
    }
}

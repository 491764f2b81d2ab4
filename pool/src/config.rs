//! Process configuration: deserialized from a JSON file on disk, with a small
//! set of environment-variable overrides layered on top for the knobs that are
//! awkward to edit in a config file during local testing.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::PoolError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub address: String,
    #[serde(default)]
    pub bypass_address_validation: bool,
    #[serde(default)]
    pub bypass_share_validation: bool,
    pub stratum: StratumConfig,
    pub block_refresh_interval: String,
    pub upstream_check_interval: String,
    pub upstream: Vec<UpstreamConfig>,
    #[serde(default = "default_estimation_window")]
    pub estimation_window: String,
    #[serde(default = "default_luck_window")]
    pub luck_window: String,
    #[serde(default = "default_large_luck_window")]
    pub large_luck_window: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StratumConfig {
    pub timeout: String,
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    #[serde(rename = "diff")]
    pub difficulty: u64,
    pub host: String,
    pub port: u16,
    #[serde(rename = "maxConn")]
    pub max_conn: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub timeout: String,
}

fn default_estimation_window() -> String {
    "10m".to_string()
}
fn default_luck_window() -> String {
    "60m".to_string()
}
fn default_large_luck_window() -> String {
    "3h".to_string()
}
fn default_threads() -> usize {
    num_cpus_heuristic()
}

fn num_cpus_heuristic() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PoolError::Config(format!("reading config file: {e}")))?;
        let mut cfg: Config = serde_json::from_str(&raw)
            .map_err(|e| PoolError::Config(format!("parsing config file: {e}")))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Layers a handful of operational env vars over the file-loaded defaults,
    /// the same override-cascade idiom used elsewhere in this stack.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("POOL_BIND_HOST") {
            for port in &mut self.stratum.ports {
                port.host = host.clone();
            }
        }
        if let Ok(v) = std::env::var("POOL_BYPASS_SHARE_VALIDATION") {
            self.bypass_share_validation = parse_bool_env(&v);
        }
        if let Ok(v) = std::env::var("POOL_BYPASS_ADDRESS_VALIDATION") {
            self.bypass_address_validation = parse_bool_env(&v);
        }
    }
}

fn parse_bool_env(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "yes" | "YES")
}

/// Parses the source's `"15m"`/`"5s"`-style human-readable durations.
pub fn parse_duration(spec: &str) -> Result<Duration, PoolError> {
    let spec = spec.trim();
    let (num_part, unit) = spec.split_at(
        spec.find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PoolError::Config(format!("invalid duration: {spec}")))?,
    );
    let value: u64 = num_part
        .parse()
        .map_err(|_| PoolError::Config(format!("invalid duration: {spec}")))?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => return Err(PoolError::Config(format!("unknown duration unit: {other}"))),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_minutes_hours() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("banana").is_err());
        assert!(parse_duration("10x").is_err());
    }
}

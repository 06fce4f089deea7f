//! Bridge Configuration - built by the embedding app or read from the environment

use std::path::PathBuf;

use crate::proxy::{ManagerTiming, ProxyConfig};

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:3415";
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upper bound on engine calls running at once.
    pub workers: usize,
    /// Used by `startListenWithHttp` when no address is given.
    pub listen_address: String,
    /// Address the onion service forwards to.
    pub tor_listen_address: String,
    pub proxy: ProxyConfig,
    pub proxy_timing: ManagerTiming,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            listen_address: DEFAULT_LISTEN_ADDRESS.into(),
            tor_listen_address: DEFAULT_LISTEN_ADDRESS.into(),
            proxy: ProxyConfig::default(),
            proxy_timing: ManagerTiming::default(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_workers(mut self, n: usize) -> Self { self.workers = n.max(1); self }
    pub fn with_listen_address(mut self, addr: impl Into<String>) -> Self { self.listen_address = addr.into(); self }
    pub fn with_tor_listen_address(mut self, addr: impl Into<String>) -> Self { self.tor_listen_address = addr.into(); self }
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self { self.proxy = proxy; self }
    pub fn with_proxy_timing(mut self, timing: ManagerTiming) -> Self { self.proxy_timing = timing; self }

    /// Defaults overridden by `WALLET_BRIDGE_*` variables. Unparseable values
    /// are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(raw) = env("WALLET_BRIDGE_WORKERS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.workers = n,
                _ => tracing::warn!(value = %raw, "Ignoring WALLET_BRIDGE_WORKERS"),
            }
        }
        if let Some(addr) = env("WALLET_BRIDGE_LISTEN_ADDR") {
            config.listen_address = addr;
        }
        if let Some(addr) = env("WALLET_BRIDGE_TOR_LISTEN_ADDR") {
            config.tor_listen_address = addr;
        }
        if let Some(dir) = env("WALLET_BRIDGE_DATA_DIR") {
            config.proxy.data_dir = PathBuf::from(dir).join("tor");
        }
        if let Some(bin) = env("WALLET_BRIDGE_TOR_BIN") {
            config.proxy.tor_binary = PathBuf::from(bin);
        }
        config
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::new();
        assert_eq!(config.workers, 4);
        assert_eq!(config.listen_address, "127.0.0.1:3415");
        assert_eq!(config.proxy.control_addr(), "127.0.0.1:39059");
    }

    #[test]
    fn builders_override() {
        let config = BridgeConfig::new().with_workers(0).with_listen_address("0.0.0.0:1");
        assert_eq!(config.workers, 1);
        assert_eq!(config.listen_address, "0.0.0.0:1");
    }
}

//! Proxy configuration - one immutable record per startup attempt

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::ProxyError;

pub const DEFAULT_CONTROL_PORT: u16 = 39059;
pub const DEFAULT_SOCKS_PORT: u16 = 39069;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_COOKIE_PATH: &str = "data/control_auth_cookie";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub control_host: String,
    pub control_port: u16,
    pub socks_host: String,
    pub socks_port: u16,
    /// Control-port auth cookie, relative to `data_dir` unless absolute.
    pub cookie_path: String,
    pub data_dir: PathBuf,
    pub tor_binary: PathBuf,
    /// Options this crate does not interpret, kept for the proxy launcher.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            control_host: DEFAULT_HOST.into(),
            control_port: DEFAULT_CONTROL_PORT,
            socks_host: DEFAULT_HOST.into(),
            socks_port: DEFAULT_SOCKS_PORT,
            cookie_path: DEFAULT_COOKIE_PATH.into(),
            data_dir: default_data_dir(),
            tor_binary: PathBuf::from("tor"),
            extra: BTreeMap::new(),
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_control(mut self, host: impl Into<String>, port: u16) -> Self { self.control_host = host.into(); self.control_port = port; self }
    pub fn with_socks(mut self, host: impl Into<String>, port: u16) -> Self { self.socks_host = host.into(); self.socks_port = port; self }
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self { self.cookie_path = path.into(); self }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self { self.data_dir = path.into(); self }
    pub fn with_tor_binary(mut self, path: impl Into<PathBuf>) -> Self { self.tor_binary = path.into(); self }
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self { self.extra.insert(key.into(), value.into()); self }

    /// Build from a `name -> value` record. Unknown names land in `extra`.
    pub fn from_map<I, K, V>(entries: I) -> Result<Self, ProxyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in entries {
            let (key, value) = (key.into(), value.into());
            match key.as_str() {
                "control_host" => config.control_host = value,
                "control_port" => config.control_port = parse_port(&key, &value)?,
                "socks_host" => config.socks_host = value,
                "socks_port" => config.socks_port = parse_port(&key, &value)?,
                "cookie_path" => config.cookie_path = value,
                "data_dir" => config.data_dir = PathBuf::from(value),
                "tor_binary" => config.tor_binary = PathBuf::from(value),
                _ => { config.extra.insert(key, value); }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.control_port == 0 || self.socks_port == 0 {
            return Err(ProxyError::Config("ports must be non-zero".into()));
        }
        if self.control_port == self.socks_port && self.control_host == self.socks_host {
            return Err(ProxyError::Config("control and SOCKS ports collide".into()));
        }
        if self.cookie_path.is_empty() {
            return Err(ProxyError::Config("cookie_path is empty".into()));
        }
        Ok(())
    }

    pub fn control_addr(&self) -> String { format!("{}:{}", self.control_host, self.control_port) }

    pub fn socks_addr(&self) -> String { format!("{}:{}", self.socks_host, self.socks_port) }

    pub fn cookie_file(&self) -> PathBuf {
        let path = PathBuf::from(&self.cookie_path);
        if path.is_absolute() { path } else { self.data_dir.join(path) }
    }

    pub fn torrc(&self) -> PathBuf { self.data_dir.join("torrc") }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ProxyError> {
    value.trim().parse().map_err(|e| ProxyError::Config(format!("{key}: {e}")))
}

/// `$WALLET_BRIDGE_DATA_DIR/tor`, else the platform local data dir.
pub fn default_data_dir() -> PathBuf {
    let root = std::env::var("WALLET_BRIDGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("wallet-bridge"));
    root.join("tor")
}

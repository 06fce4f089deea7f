//! Proxy - Tor proxy lifecycle
//!
//! A `ProxyManager` drives one proxy process on its own OS thread and
//! publishes state transitions to subscribers.
//!
//! # State machine
//!
//! ```text
//! NotReady ──start──▶ Initializing ──bootstrapped──▶ Running
//!     │                    │                            │
//!     └────────────────────┴────────── error ───────────┴──▶ Failed
//! ```
//!
//! Shutdown is a side action, not a state: subscribers see their stream end.
//!
//! # Status strings
//!
//! | State | Status event |
//! |-------|--------------|
//! | `NotReady` | `disconnected` |
//! | `Initializing` | `in-progress` |
//! | `Running` | `connected` |
//! | `Failed` | `failed` |

mod config;
mod control;
mod fanout;
mod manager;
mod process;

pub use config::ProxyConfig;
pub use control::{BootstrapPhase, TorControl};
pub use fanout::{Fanout, Subscription};
pub use manager::{ManagerTiming, ProxyManager};
pub use process::{ProxyProcess, TorProcess};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Proxy is already running")]
    AlreadyStarted,

    #[error("Failed to launch proxy: {0}")]
    Launch(String),

    #[error("Proxy control port: {0}")]
    Control(String),

    #[error("Invalid proxy config: {0}")]
    Config(String),

    #[error("Proxy IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of one proxy manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProxyState {
    #[default]
    NotReady,
    Initializing,
    Running,
    Failed,
}

impl ProxyState {
    pub fn status(&self) -> ProxyStatus {
        match self {
            ProxyState::NotReady => ProxyStatus::Disconnected,
            ProxyState::Initializing => ProxyStatus::InProgress,
            ProxyState::Running => ProxyStatus::Connected,
            ProxyState::Failed => ProxyStatus::Failed,
        }
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: ProxyState) -> bool {
        use ProxyState::*;
        matches!(
            (self, next),
            (NotReady, Initializing) | (Initializing, Running) | (NotReady, Failed) | (Initializing, Failed) | (Running, Failed)
        )
    }

    pub fn is_live(&self) -> bool {
        !matches!(self, ProxyState::Failed)
    }
}

/// UI-facing status literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyStatus {
    Failed,
    Disconnected,
    InProgress,
    Connected,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Failed => "failed",
            ProxyStatus::Disconnected => "disconnected",
            ProxyStatus::InProgress => "in-progress",
            ProxyStatus::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Status notification pushed to bridge subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStatusEvent {
    pub status: ProxyStatus,
    pub at: DateTime<Utc>,
}

impl ProxyStatusEvent {
    pub const NAME: &'static str = "TorStatusUpdate";

    pub fn now(status: ProxyStatus) -> Self {
        Self { status, at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_literals() {
        assert_eq!(ProxyState::Failed.status().as_str(), "failed");
        assert_eq!(ProxyState::NotReady.status().as_str(), "disconnected");
        assert_eq!(ProxyState::Initializing.status().as_str(), "in-progress");
        assert_eq!(ProxyState::Running.status().as_str(), "connected");
        assert_eq!(serde_json::to_string(&ProxyStatus::InProgress).unwrap(), "\"in-progress\"");
    }

    #[test]
    fn transitions() {
        assert!(ProxyState::NotReady.can_transition_to(ProxyState::Initializing));
        assert!(ProxyState::Running.can_transition_to(ProxyState::Failed));
        assert!(!ProxyState::Failed.can_transition_to(ProxyState::Running));
        assert!(!ProxyState::Running.can_transition_to(ProxyState::Initializing));
        assert!(!ProxyState::NotReady.can_transition_to(ProxyState::Running));
    }
}

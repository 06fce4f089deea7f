//! Error kinds resolved by the bridge.
//!
//! Every command resolves to exactly one `BridgeResult<String>`. Failures carry
//! a human-readable message that the UI shows as-is.

use thiserror::Error;

use crate::engine::EngineError;
use crate::proxy::ProxyError;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Required handle missing, or the slot is already taken.
    #[error("{0}")]
    Precondition(String),

    /// Raised by the native engine. Message passed through verbatim.
    #[error("{0}")]
    EngineFailure(String),

    #[error("{0}")]
    AlreadyRunning(String),

    #[error("{0}")]
    NotRunning(String),

    /// Unknown operation name or badly typed argument.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Worker pool closed or a worker died before resolving.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn wallet_not_open() -> Self {
        Self::Precondition("Wallet is not open".into())
    }

    pub fn wallet_already_open() -> Self {
        Self::Precondition("Wallet is already open".into())
    }

    pub fn wallet_busy() -> Self {
        Self::Precondition("Wallet is being opened or closed".into())
    }

    /// Short machine-readable kind, used by the CLI and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Precondition(_) => "precondition",
            BridgeError::EngineFailure(_) => "engine",
            BridgeError::AlreadyRunning(_) => "already-running",
            BridgeError::NotRunning(_) => "not-running",
            BridgeError::InvalidCommand(_) => "invalid-command",
            BridgeError::Internal(_) => "internal",
        }
    }

    /// Benign failures are informational: the UI can show them without
    /// treating the bridge as broken.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BridgeError::Precondition(_) | BridgeError::AlreadyRunning(_) | BridgeError::NotRunning(_)
        )
    }
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        BridgeError::EngineFailure(e.message)
    }
}

impl From<ProxyError> for BridgeError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::AlreadyStarted => BridgeError::AlreadyRunning(e.to_string()),
            ProxyError::Config(_) => BridgeError::Precondition(e.to_string()),
            other => BridgeError::EngineFailure(other.to_string()),
        }
    }
}

//! Engine - Synchronous facade over the native wallet engine
//!
//! The engine is a black box reached through opaque handles. Every call may
//! block and every call may fail; results are serialized strings the bridge
//! never interprets.
//!
//! # Handles
//!
//! | Handle | Produced by | Invalidated by |
//! |--------|-------------|----------------|
//! | `WalletHandle` | `open` | `close` |
//! | `ListenerHandle` | `start_listener` | `stop_listener` |

mod demo;

pub use demo::DemoEngine;

use std::fmt;
use thiserror::Error;

/// Opaque token for an open wallet session inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletHandle(pub u64);

/// Opaque token for a running foreign-API HTTP listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

impl fmt::Display for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "wallet#{}", self.0) }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "listener#{}", self.0) }
}

/// Failure raised by the engine. Only the message crosses the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Call surface of the native wallet engine.
///
/// Implementations are called from the bridge's blocking worker pool, never
/// from the caller's thread, so they are free to block.
pub trait WalletEngine: Send + Sync + 'static {
    fn open(&self, config: &str, password: &str) -> EngineResult<WalletHandle>;
    fn close(&self, wallet: WalletHandle) -> EngineResult<String>;

    /// Route the engine's own logging into the host's log.
    fn set_logger(&self) -> EngineResult<String>;

    /// Fails unless `password` unlocks the open wallet.
    fn check_password(&self, wallet: WalletHandle, password: &str) -> EngineResult<String>;

    fn seed_new(&self, length: u64) -> EngineResult<String>;
    fn wallet_init(&self, config: &str, phrase: &str, password: &str) -> EngineResult<String>;
    fn wallet_phrase(&self, wallet_dir: &str, password: &str) -> EngineResult<String>;
    fn wallet_pmmr_range(&self, wallet: WalletHandle) -> EngineResult<String>;
    fn wallet_scan_outputs(&self, wallet: WalletHandle, last_retrieved_index: u64, highest_index: u64) -> EngineResult<String>;

    fn balance(&self, wallet: WalletHandle, refresh_from_node: bool) -> EngineResult<String>;
    fn txs_get(&self, wallet: WalletHandle, minimum_confirmations: u64, refresh_from_node: bool) -> EngineResult<String>;
    fn tx_get(&self, wallet: WalletHandle, refresh_from_node: bool, slate_id: &str) -> EngineResult<String>;
    fn tx_strategies(&self, wallet: WalletHandle, amount: u64, minimum_confirmations: u64) -> EngineResult<String>;
    fn tx_create(&self, wallet: WalletHandle, amount: u64, minimum_confirmations: u64, use_all: bool) -> EngineResult<String>;
    fn tx_send_address(&self, wallet: WalletHandle, amount: u64, minimum_confirmations: u64, use_all: bool, address: &str) -> EngineResult<String>;
    fn tx_send_https(&self, wallet: WalletHandle, amount: u64, minimum_confirmations: u64, use_all: bool, url: &str) -> EngineResult<String>;
    fn tx_cancel(&self, wallet: WalletHandle, id: u32) -> EngineResult<String>;
    fn tx_receive(&self, wallet: WalletHandle, account: &str, slatepack: &str) -> EngineResult<String>;
    fn tx_finalize(&self, wallet: WalletHandle, slatepack: &str) -> EngineResult<String>;
    fn tx_post(&self, wallet: WalletHandle, slate_id: &str) -> EngineResult<String>;
    fn slatepack_decode(&self, slatepack: &str) -> EngineResult<String>;

    /// Public slatepack address of the wallet.
    fn address(&self, wallet: WalletHandle) -> EngineResult<String>;

    fn start_listener(&self, wallet: WalletHandle, listen_address: &str) -> EngineResult<ListenerHandle>;
    fn stop_listener(&self, listener: ListenerHandle) -> EngineResult<String>;

    /// Writes the torrc and onion-service keys for the wallet.
    fn create_tor_config(&self, wallet: WalletHandle, listen_address: &str) -> EngineResult<String>;
}

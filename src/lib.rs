//! wallet-bridge: command bridge between a mobile wallet UI and a native
//! wallet engine, plus lifecycle control of a local Tor proxy.
//!
//! # Architecture
//!
//! ```text
//! UI (name + args)
//!   │
//!   ▼
//! Bridge ── Command::parse ── execute ──▶ WorkerPool ──▶ WalletEngine
//!   │                                                     (open, balance, tx*, ...)
//!   ├── HandleSlot<WalletHandle>     at most one open wallet
//!   ├── HandleSlot<ListenerHandle>   at most one HTTP listener
//!   │
//!   └── ProxyController
//!         └── ProxyManager (one per startTor)
//!               └── driver thread ──▶ ProxyProcess (tor + control port)
//!                     │
//!                     └── Fanout<ProxyState> ──▶ ProxyStatusEvent stream
//! ```
//!
//! # Commands
//!
//! | Group | Names |
//! |-------|-------|
//! | wallet | `openWallet`, `closeWallet`, `checkPassword`, `walletPhrase`, `walletPmmrRange`, `walletScanOutputs` |
//! | funds | `balance`, `txsGet`, `txGet`, `txStrategies`, `txCreate`, `txSendAddress`, `txSendHttps`, `txCancel`, `txReceive`, `txFinalize`, `txPost` |
//! | helpers | `setLogger`, `seedNew`, `walletInit`, `slatepackDecode`, `getAddress` |
//! | listener | `startListenWithHttp`, `stopListenWithHttp` |
//! | proxy | `startTor`, `stopTor` |
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use wallet_bridge::{Bridge, BridgeConfig, DemoEngine};
//!
//! let bridge = Bridge::new(Arc::new(DemoEngine::new()), BridgeConfig::from_env())?;
//! bridge.call("openWallet", &[json!("{}"), json!("password")]).await?;
//! let balance = bridge.call("balance", &[json!(true)]).await?;
//! let mut status = bridge.subscribe_proxy_status();
//! bridge.call("startTor", &[]).await?;
//! while let Some(event) = status.recv().await {
//!     println!("{}", event.status);
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod registry;
pub mod runtime;

pub use config::BridgeConfig;
pub use dispatch::{Bridge, Command, EngineOp, PendingCompletion, Secret, WalletOp, WorkerPool};
pub use engine::{DemoEngine, EngineError, EngineResult, ListenerHandle, WalletEngine, WalletHandle};
pub use error::{BridgeError, BridgeResult};
pub use proxy::{
    ManagerTiming, ProxyConfig, ProxyError, ProxyManager, ProxyProcess, ProxyState, ProxyStatus, ProxyStatusEvent,
    Subscription, TorProcess,
};
pub use registry::{HandleSlot, SlotConflict};
pub use runtime::{install_signal_handlers, Shutdown};

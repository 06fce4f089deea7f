//! Dispatch - the bridge between UI commands and the wallet engine
//!
//! `Bridge` owns the wallet and listener slots, the proxy controller and the
//! worker pool. Every command goes through `execute`. Wallet-scoped commands
//! are refused there while no wallet is open; the rest check their own slot,
//! run the engine call on the pool and resolve to one `BridgeResult<String>`.
//!
//! | Command              | Slot effect                          |
//! |----------------------|--------------------------------------|
//! | `openWallet`         | Vacant → Occupied after engine open  |
//! | `closeWallet`        | Occupied → Vacant after engine close |
//! | `startListenWithHttp`| listener Vacant → Occupied           |
//! | `stopListenWithHttp` | listener Occupied → Vacant           |
//! | `startTor`/`stopTor` | replaces or drops the proxy manager  |
//! | everything else      | reads the wallet handle              |

mod command;
mod listener;
mod pool;
mod proxy;

pub use command::{Command, EngineOp, Secret, WalletOp};
pub use pool::{Completer, PendingCompletion, WorkerPool};
pub use proxy::ProcessFactory;

use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::engine::{ListenerHandle, WalletEngine, WalletHandle};
use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{ProxyState, ProxyStatusEvent, Subscription};
use crate::registry::{HandleSlot, SlotConflict};
use proxy::ProxyController;

pub const WALLET_OPENED: &str = "Opened wallet successfully";

/// Command dispatcher. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    engine: Arc<dyn WalletEngine>,
    wallet: HandleSlot<WalletHandle>,
    listener: HandleSlot<ListenerHandle>,
    proxy: ProxyController,
    pool: WorkerPool,
    config: BridgeConfig,
    runtime: Handle,
}

impl Bridge {
    /// Bridge on the current tokio runtime.
    pub fn new(engine: Arc<dyn WalletEngine>, config: BridgeConfig) -> BridgeResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| BridgeError::Internal(format!("no tokio runtime: {e}")))?;
        Ok(Self::with_handle(engine, config, runtime))
    }

    /// Bridge spawning its commands on `runtime`.
    pub fn with_handle(engine: Arc<dyn WalletEngine>, config: BridgeConfig, runtime: Handle) -> Self {
        info!(workers = config.workers, "Bridge ready");
        Self {
            inner: Arc::new(BridgeInner {
                engine,
                wallet: HandleSlot::new(),
                listener: HandleSlot::new(),
                proxy: ProxyController::new(),
                pool: WorkerPool::new(config.workers),
                config,
                runtime,
            }),
        }
    }

    /// Replace how proxy processes are created. Applies to later `startTor`.
    pub fn with_proxy_process<F>(self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn crate::proxy::ProxyProcess> + Send + Sync + 'static,
    {
        self.inner.proxy.set_factory(Arc::new(factory));
        self
    }

    pub fn config(&self) -> &BridgeConfig { &self.inner.config }

    pub fn is_wallet_open(&self) -> bool { self.inner.wallet.current().is_some() }

    pub fn is_listening(&self) -> bool { self.inner.listener.current().is_some() }

    pub fn proxy_state(&self) -> ProxyState { self.inner.proxy.state() }

    /// Proxy status events across every proxy start, latest first.
    pub fn subscribe_proxy_status(&self) -> Subscription<ProxyStatusEvent> { self.inner.proxy.subscribe() }

    /// Parse and dispatch a named command.
    pub fn call(&self, name: &str, args: &[Value]) -> PendingCompletion {
        match Command::parse(name, args) {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                debug!(command = name, error = %e, "Rejected command");
                PendingCompletion::ready("invalid", Err(e))
            }
        }
    }

    /// Run `command` in the background. Returns without waiting.
    pub fn dispatch(&self, command: Command) -> PendingCompletion {
        let (completer, pending) = PendingCompletion::channel(command.name());
        let bridge = self.clone();
        self.inner.runtime.spawn(async move {
            completer.resolve(bridge.execute(command).await);
        });
        pending
    }

    /// Run `command` to completion.
    pub async fn execute(&self, command: Command) -> BridgeResult<String> {
        let name = command.name();
        debug!(command = name, "Dispatching");
        let result = self.route(command).await;
        match &result {
            Ok(_) => debug!(command = name, "Command resolved"),
            Err(e) if e.is_benign() => debug!(command = name, kind = e.kind(), error = %e, "Command refused"),
            Err(e) => warn!(command = name, kind = e.kind(), error = %e, "Command failed"),
        }
        result
    }

    async fn route(&self, command: Command) -> BridgeResult<String> {
        if command.is_wallet_scoped() {
            self.require_wallet()?;
        }
        match command {
            Command::OpenWallet { config, password } => self.open_wallet(config, password).await,
            Command::CloseWallet => self.close_wallet().await,
            Command::StartListener { address } => self.start_listener(address).await,
            Command::StopListener => self.stop_listener().await,
            Command::StartProxy => self.start_proxy().await,
            Command::StopProxy => Ok(self.stop_proxy()),
            Command::Wallet(op) => self.run_wallet_op(op).await,
            Command::Engine(op) => self.run_engine_op(op).await,
        }
    }

    /// Stop the proxy, the listener and the wallet. Never fails.
    pub async fn shutdown(&self) {
        self.stop_proxy();
        if let Err(e) = self.stop_listener().await {
            warn!(error = %e, "Listener did not stop cleanly");
        }
        if self.is_wallet_open() {
            if let Err(e) = self.close_wallet().await {
                warn!(error = %e, "Wallet did not close cleanly");
            }
        }
        info!("Bridge shut down");
    }

    fn require_wallet(&self) -> BridgeResult<WalletHandle> {
        self.inner.wallet.current().ok_or_else(BridgeError::wallet_not_open)
    }

    async fn open_wallet(&self, config: String, password: Secret) -> BridgeResult<String> {
        let reservation = self.inner.wallet.reserve().map_err(|conflict| match conflict {
            SlotConflict::Busy => BridgeError::wallet_busy(),
            _ => BridgeError::wallet_already_open(),
        })?;
        let engine = self.inner.engine.clone();
        let wallet = self.inner.pool.run(move || engine.open(&config, password.expose())).await??;
        reservation.commit(wallet);
        info!(%wallet, "Wallet opened");
        Ok(WALLET_OPENED.into())
    }

    async fn close_wallet(&self) -> BridgeResult<String> {
        let release = self.inner.wallet.release().map_err(|conflict| match conflict {
            SlotConflict::Vacant => BridgeError::wallet_not_open(),
            _ => BridgeError::wallet_busy(),
        })?;
        let wallet = release.handle();
        let engine = self.inner.engine.clone();
        let status = self.inner.pool.run(move || engine.close(wallet)).await??;
        release.finish();
        info!(%wallet, "Wallet closed");
        Ok(status)
    }

    async fn run_wallet_op(&self, op: WalletOp) -> BridgeResult<String> {
        let wallet = self.require_wallet()?;
        let engine = self.inner.engine.clone();
        Ok(self.inner.pool.run(move || op.invoke(engine.as_ref(), wallet)).await??)
    }

    async fn run_engine_op(&self, op: EngineOp) -> BridgeResult<String> {
        let engine = self.inner.engine.clone();
        Ok(self.inner.pool.run(move || op.invoke(engine.as_ref())).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DemoEngine;
    use serde_json::json;

    fn bridge() -> (Arc<DemoEngine>, Bridge) {
        let engine = Arc::new(DemoEngine::new());
        let bridge = Bridge::new(engine.clone(), BridgeConfig::new().with_workers(2)).unwrap();
        (engine, bridge)
    }

    #[tokio::test]
    async fn open_balance_close() {
        let (engine, bridge) = bridge();
        assert_eq!(bridge.call("openWallet", &[json!("{}"), json!("pw")]).await.unwrap(), WALLET_OPENED);
        assert!(bridge.is_wallet_open());
        assert!(bridge.call("balance", &[json!(false)]).await.is_ok());
        assert!(bridge.call("closeWallet", &[]).await.is_ok());
        assert_eq!(bridge.call("balance", &[json!(false)]).await, Err(BridgeError::wallet_not_open()));
        assert_eq!(engine.call_count("balance"), 1);
    }

    #[tokio::test]
    async fn handle_less_ops_need_no_wallet() {
        let (_engine, bridge) = bridge();
        let phrase = bridge.call("seedNew", &[json!(32)]).await.unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
    }

    #[tokio::test]
    async fn scoped_commands_are_refused_before_any_slot_or_engine_work() {
        let (engine, bridge) = bridge();
        for command in [
            Command::CloseWallet,
            Command::StartListener { address: None },
            Command::StartProxy,
            Command::Wallet(WalletOp::CheckPassword { password: Secret::new("pw") }),
            Command::Wallet(WalletOp::Address),
        ] {
            assert!(command.is_wallet_scoped());
            assert_eq!(bridge.execute(command).await, Err(BridgeError::wallet_not_open()));
        }
        assert!(!bridge.is_listening());
        assert_eq!(bridge.proxy_state(), ProxyState::NotReady);
        assert!(engine.calls().is_empty());

        assert_eq!(bridge.execute(Command::Engine(EngineOp::SetLogger)).await.unwrap(), "Logger initiated successfully!");
        assert_eq!(engine.calls(), vec!["set_logger"]);
    }

    #[tokio::test]
    async fn invalid_command_resolves_without_dispatch() {
        let (engine, bridge) = bridge();
        let err = bridge.call("nope", &[]).await.unwrap_err();
        assert_eq!(err.kind(), "invalid-command");
        assert!(engine.calls().is_empty());
    }
}

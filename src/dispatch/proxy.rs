//! Proxy controller - one manager per `startTor`, one status stream per bridge

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::Bridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{
    Fanout, ProxyManager, ProxyProcess, ProxyState, ProxyStatus, ProxyStatusEvent, Subscription, TorProcess,
};

pub const PROXY_STARTED: &str = "Run successfully";
pub const PROXY_STOPPED: &str = "Done";
pub const PROXY_RUNNING: &str = "Tor proxy is already running";

/// Builds the process each new manager drives.
pub type ProcessFactory = Arc<dyn Fn() -> Box<dyn ProxyProcess> + Send + Sync>;

type ManagerSlot = Arc<Mutex<Option<Arc<ProxyManager>>>>;

pub(super) struct ProxyController {
    manager: ManagerSlot,
    events: Fanout<ProxyStatusEvent>,
    factory: Mutex<ProcessFactory>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ProxyController {
    pub(super) fn new() -> Self {
        let events = Fanout::new();
        events.publish(ProxyStatusEvent::now(ProxyStatus::Disconnected));
        let factory: ProcessFactory = Arc::new(|| Box::new(TorProcess::new()) as Box<dyn ProxyProcess>);
        Self { manager: Arc::new(Mutex::new(None)), events, factory: Mutex::new(factory) }
    }

    pub(super) fn set_factory(&self, factory: ProcessFactory) { *lock(&self.factory) = factory; }

    pub(super) fn state(&self) -> ProxyState {
        lock(&self.manager).as_ref().map(|m| m.state()).unwrap_or_default()
    }

    pub(super) fn subscribe(&self) -> Subscription<ProxyStatusEvent> { self.events.subscribe() }

    /// Check-and-set a fresh manager. A live manager blocks the start; a
    /// failed one is shut down and replaced.
    fn install(&self, config: &BridgeConfig) -> BridgeResult<Arc<ProxyManager>> {
        config.proxy.validate()?;
        let mut slot = lock(&self.manager);
        if let Some(existing) = slot.as_ref() {
            if existing.state().is_live() {
                return Err(BridgeError::AlreadyRunning(PROXY_RUNNING.into()));
            }
            info!("Replacing failed proxy manager");
            existing.shutdown();
        }
        let factory = lock(&self.factory).clone();
        let process = factory();
        let manager = Arc::new(ProxyManager::new(config.proxy.clone(), process).with_timing(config.proxy_timing));
        *slot = Some(manager.clone());
        Ok(manager)
    }

    fn discard(&self, manager: &Arc<ProxyManager>) {
        let mut slot = lock(&self.manager);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, manager)) {
            slot.take();
            publish_if_changed(&self.events, ProxyStatus::Disconnected);
        }
        manager.shutdown();
    }

    /// Start `manager` if it is still the installed one.
    fn launch(&self, manager: &Arc<ProxyManager>, runtime: &Handle) -> BridgeResult<()> {
        let slot = lock(&self.manager);
        if !slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, manager)) {
            return Err(BridgeError::NotRunning("Tor proxy was stopped while starting".into()));
        }
        self.forward(manager, runtime);
        manager.start()?;
        Ok(())
    }

    /// Republish the manager's transitions as bridge-level events for as
    /// long as it stays installed.
    fn forward(&self, manager: &Arc<ProxyManager>, runtime: &Handle) {
        let mut states = manager.subscribe();
        let slot = self.manager.clone();
        let events = self.events.clone();
        let owner = manager.clone();
        runtime.spawn(async move {
            while let Some(state) = states.recv().await {
                let installed = lock(&slot);
                if !installed.as_ref().is_some_and(|current| Arc::ptr_eq(current, &owner)) {
                    break;
                }
                publish_if_changed(&events, state.status());
            }
        });
    }

    /// Uninstall and shut down the running manager. Subscribers see
    /// `disconnected` once the manager is gone.
    fn stop(&self) {
        let mut slot = lock(&self.manager);
        if let Some(manager) = slot.take() {
            manager.shutdown();
            publish_if_changed(&self.events, ProxyStatus::Disconnected);
        }
    }
}

fn publish_if_changed(events: &Fanout<ProxyStatusEvent>, status: ProxyStatus) {
    if events.latest().map(|e| e.status) == Some(status) {
        return;
    }
    debug!(%status, "Proxy status");
    events.publish(ProxyStatusEvent::now(status));
}

impl Bridge {
    /// Write the wallet's onion-service config, then start a new proxy.
    pub(super) async fn start_proxy(&self) -> BridgeResult<String> {
        let wallet = self.require_wallet()?;
        let proxy = &self.inner.proxy;
        let manager = proxy.install(&self.inner.config)?;

        let engine = self.inner.engine.clone();
        let listen = self.inner.config.tor_listen_address.clone();
        let configured = match self.inner.pool.run(move || engine.create_tor_config(wallet, &listen)).await {
            Ok(result) => result.map_err(BridgeError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = configured.and_then(|_| proxy.launch(&manager, &self.inner.runtime)) {
            proxy.discard(&manager);
            return Err(e);
        }
        info!(control = %manager.config().control_addr(), "Tor proxy starting");
        Ok(PROXY_STARTED.into())
    }

    /// Best-effort stop. Succeeds whether or not a proxy was running.
    pub(super) fn stop_proxy(&self) -> String {
        self.inner.proxy.stop();
        PROXY_STOPPED.into()
    }
}

//! HTTP listener lifecycle

use tracing::info;

use super::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::SlotConflict;

pub const LISTENER_RUNNING: &str = "Can not start HTTP listener as it's already running";
pub const NO_LISTENER: &str = "No HTTP listener to stop";

fn listener_busy() -> BridgeError {
    BridgeError::Precondition("HTTP listener is being started or stopped".into())
}

impl Bridge {
    /// Start the listener and return the wallet's public address.
    pub(super) async fn start_listener(&self, address: Option<String>) -> BridgeResult<String> {
        let reservation = self.inner.listener.reserve().map_err(|conflict| match conflict {
            SlotConflict::Busy => listener_busy(),
            _ => BridgeError::AlreadyRunning(LISTENER_RUNNING.into()),
        })?;
        let wallet = self.require_wallet()?;
        let address = address.unwrap_or_else(|| self.inner.config.listen_address.clone());

        let engine = self.inner.engine.clone();
        let bind = address.clone();
        let listener = self.inner.pool.run(move || engine.start_listener(wallet, &bind)).await??;
        reservation.commit(listener);
        info!(%listener, %address, "HTTP listener started");

        let engine = self.inner.engine.clone();
        Ok(self.inner.pool.run(move || engine.address(wallet)).await??)
    }

    /// Stop the listener. Stopping with none running succeeds without
    /// touching the engine.
    pub(super) async fn stop_listener(&self) -> BridgeResult<String> {
        let release = match self.inner.listener.release() {
            Ok(release) => release,
            Err(SlotConflict::Vacant) => return Ok(NO_LISTENER.into()),
            Err(_) => return Err(listener_busy()),
        };
        let listener = release.handle();
        let engine = self.inner.engine.clone();
        let status = self.inner.pool.run(move || engine.stop_listener(listener)).await??;
        release.finish();
        info!(%listener, "HTTP listener stopped");
        Ok(status)
    }
}

//! Proxy process - how the driver launches and probes the proxy

use std::fs;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BootstrapPhase, ProxyConfig, ProxyError, TorControl};

/// The external proxy as seen by the driver loop. All methods run on the
/// driver thread and may block.
pub trait ProxyProcess: Send + 'static {
    /// Spawn the proxy. Returns once the process exists, not once it is ready.
    fn launch(&mut self, config: &ProxyConfig) -> Result<(), ProxyError>;

    /// One readiness check. An error means the proxy could not be reached.
    fn probe(&mut self, config: &ProxyConfig) -> Result<BootstrapPhase, ProxyError>;

    /// False once the process has exited on its own.
    fn is_alive(&mut self) -> bool;

    /// Best-effort stop. Never fails.
    fn shutdown(&mut self, config: &ProxyConfig);
}

/// Runs the `tor` binary and reads its control port.
#[derive(Default)]
pub struct TorProcess {
    child: Option<Child>,
    control: Option<TorControl>,
    io_timeout: Option<Duration>,
}

impl TorProcess {
    pub fn new() -> Self { Self::default() }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self { self.io_timeout = Some(timeout); self }

    fn timeout(&self) -> Duration { self.io_timeout.unwrap_or(Duration::from_secs(2)) }

    /// Command-line arguments for the proxy binary.
    pub fn args(config: &ProxyConfig) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            config.torrc().display().to_string(),
            "--clientonly".into(),
            "1".into(),
            "--socksport".into(),
            config.socks_addr(),
            "--controlport".into(),
            config.control_addr(),
            "--clientuseipv6".into(),
            "1".into(),
            "--DataDirectory".into(),
            config.data_dir.join("data").display().to_string(),
            "--CookieAuthentication".into(),
            "1".into(),
            "--CookieAuthFile".into(),
            config.cookie_file().display().to_string(),
        ];
        for (key, value) in &config.extra {
            args.push(format!("--{key}"));
            args.push(value.clone());
        }
        args
    }

    fn connect(&mut self, config: &ProxyConfig) -> Result<&mut TorControl, ProxyError> {
        if self.control.is_none() {
            let mut control = TorControl::connect(&config.control_addr(), self.timeout())?;
            let cookie = fs::read(config.cookie_file())?;
            control.authenticate(&cookie)?;
            self.control = Some(control);
        }
        self.control.as_mut().ok_or_else(|| ProxyError::Control("not connected".into()))
    }
}

impl ProxyProcess for TorProcess {
    fn launch(&mut self, config: &ProxyConfig) -> Result<(), ProxyError> {
        fs::create_dir_all(config.data_dir.join("data"))?;
        let args = Self::args(config);
        debug!(binary = %config.tor_binary.display(), ?args, "Launching proxy");
        let child = Command::new(&config.tor_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ProxyError::Launch(format!("{}: {e}", config.tor_binary.display())))?;
        info!(pid = child.id(), "Proxy process started");
        self.child = Some(child);
        Ok(())
    }

    fn probe(&mut self, config: &ProxyConfig) -> Result<BootstrapPhase, ProxyError> {
        let result = self.connect(config).and_then(|control| control.bootstrap_phase());
        if result.is_err() {
            self.control = None;
        }
        result
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                warn!(%status, "Proxy process exited");
                false
            }
            Some(Err(e)) => {
                warn!(error = %e, "Proxy process status unavailable");
                false
            }
            None => false,
        }
    }

    fn shutdown(&mut self, config: &ProxyConfig) {
        if let Ok(control) = self.connect(config) {
            if let Err(e) = control.signal_shutdown() {
                debug!(error = %e, "SIGNAL SHUTDOWN refused");
            }
        }
        self.control = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("Proxy process stopped");
        }
    }
}

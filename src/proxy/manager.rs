//! ProxyManager - runs one proxy on a dedicated driver thread
//!
//! A manager is single-use: it is started at most once and discarded after
//! shutdown. The driver thread is the only writer of the state; subscribers
//! get every transition, in order, through a `Fanout`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{Fanout, ProxyConfig, ProxyError, ProxyProcess, ProxyState, Subscription};

/// Driver loop periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerTiming {
    /// Delay between control-port attempts while bootstrapping.
    pub retry_period: Duration,
    /// Give up bootstrapping after this long.
    pub connect_timeout: Duration,
    /// Health-check period once running.
    pub status_period: Duration,
}

impl Default for ManagerTiming {
    fn default() -> Self {
        Self {
            retry_period: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(15),
            status_period: Duration::from_secs(5),
        }
    }
}

impl ManagerTiming {
    /// Short periods for tests.
    pub fn fast() -> Self {
        Self {
            retry_period: Duration::from_millis(10),
            connect_timeout: Duration::from_millis(300),
            status_period: Duration::from_millis(20),
        }
    }
}

pub struct ProxyManager {
    config: Arc<ProxyConfig>,
    timing: ManagerTiming,
    states: Fanout<ProxyState>,
    process: Mutex<Option<Box<dyn ProxyProcess>>>,
    stop: Mutex<Option<mpsc::Sender<()>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ProxyManager {
    pub fn new(config: ProxyConfig, process: Box<dyn ProxyProcess>) -> Self {
        let states = Fanout::new();
        states.publish(ProxyState::NotReady);
        Self {
            config: Arc::new(config),
            timing: ManagerTiming::default(),
            states,
            process: Mutex::new(Some(process)),
            stop: Mutex::new(None),
            driver: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_timing(mut self, timing: ManagerTiming) -> Self { self.timing = timing; self }

    pub fn config(&self) -> &ProxyConfig { &self.config }

    pub fn state(&self) -> ProxyState { self.states.latest().unwrap_or_default() }

    /// Current state first, then every later transition.
    pub fn subscribe(&self) -> Subscription<ProxyState> { self.states.subscribe() }

    /// Spawn the driver thread. Fails if this manager was started before.
    pub fn start(&self) -> Result<(), ProxyError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::AlreadyStarted);
        }
        let process = lock(&self.process).take().ok_or(ProxyError::AlreadyStarted)?;
        let (stop_tx, stop_rx) = mpsc::channel();
        let driver = Driver {
            config: self.config.clone(),
            timing: self.timing,
            states: self.states.clone(),
            stop: stop_rx,
            current: self.state(),
            process,
        };
        let handle = std::thread::Builder::new()
            .name("proxy-driver".into())
            .spawn(move || driver.run())?;
        *lock(&self.stop) = Some(stop_tx);
        *lock(&self.driver) = Some(handle);
        Ok(())
    }

    /// Best-effort stop. Returns at once, whatever the state; the driver
    /// thread stops the process on its own time. Subscriptions end here.
    pub fn shutdown(&self) {
        self.started.store(true, Ordering::SeqCst);
        if let Some(stop) = lock(&self.stop).take() {
            let _ = stop.send(());
        }
        lock(&self.process).take();
        self.states.close();
        info!(state = ?self.state(), "Proxy shutdown requested");
    }

    /// Block until the driver thread has exited. For tests and teardown.
    pub fn join(&self) {
        if let Some(handle) = lock(&self.driver).take() {
            if handle.join().is_err() {
                error!("Proxy driver thread panicked");
            }
        }
    }
}

impl Drop for ProxyManager {
    fn drop(&mut self) {
        // Dropping the stop sender wakes the driver, which then stops the process.
        lock(&self.stop).take();
    }
}

struct Driver {
    config: Arc<ProxyConfig>,
    timing: ManagerTiming,
    states: Fanout<ProxyState>,
    stop: mpsc::Receiver<()>,
    current: ProxyState,
    process: Box<dyn ProxyProcess>,
}

impl Driver {
    fn run(mut self) {
        self.update(ProxyState::Initializing);
        if let Err(e) = self.process.launch(&self.config) {
            error!(error = %e, "Proxy failed to launch");
            self.update(ProxyState::Failed);
            self.process.shutdown(&self.config);
            return;
        }

        if self.bootstrap() && self.monitor() {
            debug!("Proxy driver stopping on request");
        }
        self.process.shutdown(&self.config);
    }

    /// Poll until bootstrapped. False when it failed, true when running or
    /// stopped on request.
    fn bootstrap(&mut self) -> bool {
        let started = Instant::now();
        loop {
            match self.process.probe(&self.config) {
                Ok(phase) if phase.is_done() => {
                    info!(tag = %phase.tag, "Proxy bootstrapped");
                    self.update(ProxyState::Running);
                    return true;
                }
                Ok(phase) => debug!(progress = phase.progress, tag = %phase.tag, "Proxy bootstrapping"),
                Err(e) => debug!(error = %e, "Proxy not reachable yet, will retry"),
            }
            if !self.process.is_alive() {
                error!("Proxy exited while bootstrapping");
                self.update(ProxyState::Failed);
                return false;
            }
            if started.elapsed() > self.timing.connect_timeout {
                error!(timeout = ?self.timing.connect_timeout, "Proxy bootstrap timed out");
                self.update(ProxyState::Failed);
                return false;
            }
            if self.stop_requested(self.timing.retry_period) {
                return false;
            }
        }
    }

    /// Health-check loop. True when stopped on request.
    fn monitor(&mut self) -> bool {
        loop {
            if self.stop_requested(self.timing.status_period) {
                return true;
            }
            let healthy = self.process.is_alive() && self.process.probe(&self.config).is_ok();
            if !healthy {
                warn!("Proxy stopped answering");
                self.update(ProxyState::Failed);
                return false;
            }
        }
    }

    /// Sleep for `period`, waking early on shutdown.
    fn stop_requested(&self, period: Duration) -> bool {
        !matches!(self.stop.recv_timeout(period), Err(RecvTimeoutError::Timeout))
    }

    fn update(&mut self, next: ProxyState) {
        if self.current == next || !self.current.can_transition_to(next) {
            return;
        }
        debug!(from = ?self.current, to = ?next, "Proxy state");
        self.current = next;
        self.states.publish(next);
    }
}

//! Proxy Tests: manager state machine, bridge status stream, control port
//!
//! These tests verify:
//! 1. Subscribers see NotReady → Initializing → {Running | Failed}, once each
//! 2. Shutdown never fails, whatever the state
//! 3. startTor/stopTor through the bridge, including restart and AlreadyRunning
//!    and `disconnected` on the status stream after every stop
//! 4. TorProcess readiness and shutdown over a fake control port

use serde_json::json;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use wallet_bridge::proxy::BootstrapPhase;
use wallet_bridge::{
    Bridge, BridgeConfig, BridgeError, DemoEngine, ManagerTiming, ProxyConfig, ProxyError, ProxyManager, ProxyProcess,
    ProxyState, ProxyStatus, Subscription, TorProcess,
};

#[derive(Default)]
struct Script {
    launch_error: Option<String>,
    probes: VecDeque<Result<u8, String>>,
    fallback: Option<Result<u8, String>>,
    dead: bool,
    launches: usize,
    shutdowns: usize,
}

/// Proxy double driven by a shared script.
#[derive(Clone, Default)]
struct Scripted(Arc<Mutex<Script>>);

impl Scripted {
    fn bootstraps() -> Self {
        let s = Self::default();
        s.edit(|script| {
            script.probes = VecDeque::from([Err("connection refused".into()), Ok(40), Ok(100)]);
            script.fallback = Some(Ok(100));
        });
        s
    }

    fn fails_to_launch() -> Self {
        let s = Self::default();
        s.edit(|script| script.launch_error = Some("tor: not found".into()));
        s
    }

    fn edit(&self, f: impl FnOnce(&mut Script)) { f(&mut self.0.lock().unwrap()) }

    fn shutdowns(&self) -> usize { self.0.lock().unwrap().shutdowns }

    fn launches(&self) -> usize { self.0.lock().unwrap().launches }
}

impl ProxyProcess for Scripted {
    fn launch(&mut self, _config: &ProxyConfig) -> Result<(), ProxyError> {
        let mut script = self.0.lock().unwrap();
        script.launches += 1;
        match &script.launch_error {
            Some(e) => Err(ProxyError::Launch(e.clone())),
            None => Ok(()),
        }
    }

    fn probe(&mut self, _config: &ProxyConfig) -> Result<BootstrapPhase, ProxyError> {
        let mut script = self.0.lock().unwrap();
        let next = script.probes.pop_front().or_else(|| script.fallback.clone()).unwrap_or(Err("no script".into()));
        next.map(|progress| BootstrapPhase {
            progress,
            tag: if progress >= 100 { "done".into() } else { "loading".into() },
            summary: None,
        })
        .map_err(ProxyError::Control)
    }

    fn is_alive(&mut self) -> bool { !self.0.lock().unwrap().dead }

    fn shutdown(&mut self, _config: &ProxyConfig) { self.0.lock().unwrap().shutdowns += 1; }
}

async fn next<T>(sub: &mut Subscription<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("no update in time")
        .expect("subscription closed")
}

fn manager(process: &Scripted) -> ProxyManager {
    ProxyManager::new(ProxyConfig::default(), Box::new(process.clone())).with_timing(ManagerTiming::fast())
}

#[tokio::test]
async fn bootstrap_reaches_running() {
    let process = Scripted::bootstraps();
    let manager = manager(&process);
    let mut states = manager.subscribe();
    manager.start().expect("start");

    assert_eq!(next(&mut states).await, ProxyState::NotReady);
    assert_eq!(next(&mut states).await, ProxyState::Initializing);
    assert_eq!(next(&mut states).await, ProxyState::Running);
    assert_eq!(manager.state(), ProxyState::Running);

    manager.shutdown();
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), states.recv()).await.expect("closed"), None);
    tokio::task::spawn_blocking(move || manager.join()).await.unwrap();
    assert_eq!(process.shutdowns(), 1);
}

#[tokio::test]
async fn launch_failure_is_failed() {
    let process = Scripted::fails_to_launch();
    let manager = manager(&process);
    let mut states = manager.subscribe();
    manager.start().expect("start");

    assert_eq!(next(&mut states).await, ProxyState::NotReady);
    assert_eq!(next(&mut states).await, ProxyState::Initializing);
    assert_eq!(next(&mut states).await, ProxyState::Failed);
    manager.shutdown();
    assert_eq!(states.try_recv(), None);
}

#[tokio::test]
async fn bootstrap_timeout_is_failed_once() {
    let process = Scripted::default();
    process.edit(|s| s.fallback = Some(Ok(50)));
    let manager = manager(&process);
    let mut states = manager.subscribe();
    manager.start().expect("start");

    assert_eq!(next(&mut states).await, ProxyState::NotReady);
    assert_eq!(next(&mut states).await, ProxyState::Initializing);
    assert_eq!(next(&mut states).await, ProxyState::Failed);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(states.try_recv(), None);
    manager.shutdown();
}

#[tokio::test]
async fn exited_process_during_bootstrap_is_failed() {
    let process = Scripted::default();
    process.edit(|s| {
        s.fallback = Some(Err("refused".into()));
        s.dead = true;
    });
    let manager = manager(&process);
    let mut states = manager.subscribe();
    manager.start().expect("start");
    assert_eq!(next(&mut states).await, ProxyState::NotReady);
    assert_eq!(next(&mut states).await, ProxyState::Initializing);
    assert_eq!(next(&mut states).await, ProxyState::Failed);
    manager.shutdown();
}

#[tokio::test]
async fn running_proxy_that_stops_answering_fails() {
    let process = Scripted::default();
    process.edit(|s| {
        s.probes = VecDeque::from([Ok(100)]);
        s.fallback = Some(Err("connection reset".into()));
    });
    let manager = manager(&process);
    let mut states = manager.subscribe();
    manager.start().expect("start");

    assert_eq!(next(&mut states).await, ProxyState::NotReady);
    assert_eq!(next(&mut states).await, ProxyState::Initializing);
    assert_eq!(next(&mut states).await, ProxyState::Running);
    assert_eq!(next(&mut states).await, ProxyState::Failed);
    manager.shutdown();
}

#[tokio::test]
async fn late_subscriber_sees_current_state_first() {
    let process = Scripted::bootstraps();
    let manager = manager(&process);
    let mut early = manager.subscribe();
    manager.start().expect("start");
    while next(&mut early).await != ProxyState::Running {}

    let mut late = manager.subscribe();
    assert_eq!(next(&mut late).await, ProxyState::Running);
    manager.shutdown();
}

#[test]
fn manager_is_single_use_and_shutdown_never_fails() {
    let process = Scripted::bootstraps();
    let manager = manager(&process);

    manager.shutdown();
    manager.shutdown();
    assert!(matches!(manager.start(), Err(ProxyError::AlreadyStarted)));
    assert_eq!(process.launches(), 0);

    let process = Scripted::bootstraps();
    let manager = self::manager(&process);
    manager.start().expect("start");
    assert!(matches!(manager.start(), Err(ProxyError::AlreadyStarted)));
    manager.shutdown();
    manager.join();
    manager.shutdown();
    assert_eq!(process.launches(), 1);
}

async fn proxy_bridge(process: Scripted) -> (Arc<DemoEngine>, Bridge) {
    let engine = Arc::new(DemoEngine::new());
    let config = BridgeConfig::new().with_proxy_timing(ManagerTiming::fast());
    let bridge = Bridge::new(engine.clone(), config)
        .expect("bridge")
        .with_proxy_process(move || Box::new(process.clone()));
    bridge.call("openWallet", &[json!("{}"), json!("secret")]).await.expect("open");
    (engine, bridge)
}

#[tokio::test]
async fn bridge_start_stop_restart() {
    let process = Scripted::bootstraps();
    let (engine, bridge) = proxy_bridge(process.clone()).await;
    let mut events = bridge.subscribe_proxy_status();
    assert_eq!(next(&mut events).await.status, ProxyStatus::Disconnected);

    assert_eq!(bridge.call("startTor", &[]).await.unwrap(), "Run successfully");
    assert_eq!(engine.call_count("create_tor_config"), 1);
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Connected);
    assert_eq!(bridge.proxy_state(), ProxyState::Running);

    let err = bridge.call("startTor", &[]).await.unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyRunning(_)));
    assert_eq!(engine.call_count("create_tor_config"), 1);

    assert_eq!(bridge.call("stopTor", &[]).await.unwrap(), "Done");
    assert_eq!(next(&mut events).await.status, ProxyStatus::Disconnected);
    assert_eq!(bridge.call("stopTor", &[]).await.unwrap(), "Done");
    assert_eq!(bridge.proxy_state(), ProxyState::NotReady);

    process.edit(|s| s.probes = VecDeque::from([Ok(10), Ok(100)]));
    assert_eq!(bridge.call("startTor", &[]).await.unwrap(), "Run successfully");
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Connected);
    assert_eq!(process.launches(), 2);

    bridge.shutdown().await;
}

#[tokio::test]
async fn subscriber_joining_after_stop_sees_disconnected() {
    let (_engine, bridge) = proxy_bridge(Scripted::bootstraps()).await;
    let mut events = bridge.subscribe_proxy_status();
    next(&mut events).await;

    bridge.call("startTor", &[]).await.expect("start");
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Connected);

    bridge.call("stopTor", &[]).await.expect("stop");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bridge.proxy_state(), ProxyState::NotReady);

    let mut late = bridge.subscribe_proxy_status();
    assert_eq!(next(&mut late).await.status, ProxyStatus::Disconnected);
    assert!(late.try_recv().is_none());
}

#[tokio::test]
async fn shutdown_reports_disconnected() {
    let (_engine, bridge) = proxy_bridge(Scripted::bootstraps()).await;
    let mut events = bridge.subscribe_proxy_status();
    next(&mut events).await;
    bridge.call("startTor", &[]).await.expect("start");
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Connected);

    bridge.shutdown().await;
    assert_eq!(next(&mut events).await.status, ProxyStatus::Disconnected);
    let mut late = bridge.subscribe_proxy_status();
    assert_eq!(next(&mut late).await.status, ProxyStatus::Disconnected);
}

#[tokio::test]
async fn failed_proxy_is_replaced_on_next_start() {
    let process = Scripted::fails_to_launch();
    let (_engine, bridge) = proxy_bridge(process.clone()).await;
    let mut events = bridge.subscribe_proxy_status();
    next(&mut events).await;

    bridge.call("startTor", &[]).await.expect("start returns before bootstrap");
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Failed);
    assert_eq!(bridge.proxy_state(), ProxyState::Failed);

    process.edit(|s| {
        s.launch_error = None;
        s.probes = VecDeque::from([Ok(100)]);
        s.fallback = Some(Ok(100));
    });
    bridge.call("startTor", &[]).await.expect("failed manager is replaced");
    assert_eq!(next(&mut events).await.status, ProxyStatus::Disconnected);
    assert_eq!(next(&mut events).await.status, ProxyStatus::InProgress);
    assert_eq!(next(&mut events).await.status, ProxyStatus::Connected);
    bridge.shutdown().await;
}

#[tokio::test]
async fn start_needs_wallet_and_engine_config() {
    let engine = Arc::new(DemoEngine::new());
    let process = Scripted::bootstraps();
    let launched = process.clone();
    let bridge = Bridge::new(engine.clone(), BridgeConfig::new().with_proxy_timing(ManagerTiming::fast()))
        .expect("bridge")
        .with_proxy_process(move || Box::new(process.clone()));

    assert_eq!(bridge.call("startTor", &[]).await, Err(BridgeError::wallet_not_open()));
    assert!(engine.calls().is_empty());

    bridge.call("openWallet", &[json!("{}"), json!("secret")]).await.expect("open");
    engine.fail_on("create_tor_config", "Unable to write torrc");
    let err = bridge.call("startTor", &[]).await.unwrap_err();
    assert_eq!(err.to_string(), "Unable to write torrc");
    assert_eq!(bridge.proxy_state(), ProxyState::NotReady);
    assert_eq!(launched.launches(), 0);

    engine.clear_failure("create_tor_config");
    bridge.call("startTor", &[]).await.expect("start after fix");
    bridge.shutdown().await;
}

#[tokio::test]
async fn invalid_proxy_config_is_a_precondition() {
    let engine = Arc::new(DemoEngine::new());
    let config = BridgeConfig::new().with_proxy(ProxyConfig::default().with_control("127.0.0.1", 0));
    let bridge = Bridge::new(engine, config).expect("bridge");
    bridge.call("openWallet", &[json!("{}"), json!("secret")]).await.expect("open");
    let err = bridge.call("startTor", &[]).await.unwrap_err();
    assert!(matches!(err, BridgeError::Precondition(_)), "{err}");
}

/// Serve one control connection, recording every command line.
fn fake_control_port(cookie: &'static [u8]) -> (u16, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let mut seen = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim().to_string();
            let reply: &[u8] = if let Some(hex_cookie) = line.strip_prefix("AUTHENTICATE ") {
                if hex_cookie == hex::encode(cookie) {
                    b"250 OK\r\n"
                } else {
                    b"515 Authentication failed: Wrong length on authentication cookie.\r\n"
                }
            } else if line == "GETINFO status/bootstrap-phase" {
                b"250-status/bootstrap-phase=NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY=\"Done\"\r\n250 OK\r\n"
            } else if line == "SIGNAL SHUTDOWN" {
                b"250 OK\r\n"
            } else {
                b"510 Unrecognized command\r\n"
            };
            seen.push(line);
            if writer.write_all(reply).is_err() {
                break;
            }
        }
        seen
    });
    (port, server)
}

fn tor_config(dir: &TempDir, port: u16, cookie: &[u8]) -> ProxyConfig {
    let config = ProxyConfig::default().with_data_dir(dir.path()).with_control("127.0.0.1", port);
    std::fs::create_dir_all(config.cookie_file().parent().unwrap()).unwrap();
    std::fs::write(config.cookie_file(), cookie).unwrap();
    config
}

#[test]
fn tor_process_probes_and_shuts_down_over_control_port() {
    const COOKIE: &[u8] = &[0x13, 0x37, 0xbe, 0xef];
    let dir = TempDir::new().expect("tempdir");
    let (port, server) = fake_control_port(COOKIE);
    let config = tor_config(&dir, port, COOKIE);

    let mut process = TorProcess::new().with_io_timeout(Duration::from_secs(2));
    let phase = process.probe(&config).expect("probe");
    assert!(phase.is_done());
    assert_eq!(phase.summary.as_deref(), Some("Done"));
    process.shutdown(&config);
    drop(process);

    let seen = server.join().unwrap();
    assert_eq!(seen, vec!["AUTHENTICATE 1337beef", "GETINFO status/bootstrap-phase", "SIGNAL SHUTDOWN"]);
}

#[test]
fn tor_process_with_wrong_cookie_is_unreachable() {
    let dir = TempDir::new().expect("tempdir");
    let (port, server) = fake_control_port(b"right");
    let config = tor_config(&dir, port, b"wrong");

    let mut process = TorProcess::new().with_io_timeout(Duration::from_secs(2));
    let err = process.probe(&config).unwrap_err();
    assert!(err.to_string().contains("515"), "{err}");
    drop(process);
    server.join().unwrap();
}

//! wallet-bridge CLI - drive the bridge against the demo engine
//!
//!   wallet-bridge call <name> [args...]   → run one command, print the result
//!   wallet-bridge repl                    → one command per line until EOF
//!
//! Arguments are read as JSON when they parse (`true`, `10`, `"x"`), else as
//! plain strings.
//!
//! Output format:
//!   --json     Compact JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use wallet_bridge::logging::init_logging;
use wallet_bridge::{install_signal_handlers, Bridge, BridgeConfig, BridgeResult, DemoEngine, ProxyStatusEvent};

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(args.get(1..).unwrap_or_default());

    if opts.help {
        print_usage();
        return Ok(());
    }
    if opts.version {
        println!("wallet-bridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    match opts.command.as_deref() {
        Some("call") => rt.block_on(cmd_call(&opts)),
        Some("repl") => rt.block_on(cmd_repl(&opts)),
        Some(other) => anyhow::bail!("Unknown command: {other}"),
        None => {
            print_usage();
            Ok(())
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                _ if opts.command.is_none() => opts.command = Some(arg.clone()),
                _ => opts.positional.push(arg.clone()),
            }
        }
        opts
    }

    fn pretty(&self) -> bool {
        !self.json && (self.pretty || std::io::stdout().is_terminal())
    }
}

fn print_usage() {
    println!(
        r#"wallet-bridge - wallet command bridge (demo engine)

USAGE:
    wallet-bridge <command> [args...] [options]

COMMANDS:
    call <name> [args...]   Run one bridge command
    repl                    Read `name args...` lines from stdin

OUTPUT OPTIONS:
    --json                  Compact JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

ENVIRONMENT:
    RUST_LOG                        Log filter (default: info)
    WALLET_BRIDGE_LOG_JSON=1        JSON logs on stderr
    WALLET_BRIDGE_WORKERS           Worker pool size (default: 4)
    WALLET_BRIDGE_LISTEN_ADDR       Default HTTP listener address
    WALLET_BRIDGE_TOR_LISTEN_ADDR   Onion service target address
    WALLET_BRIDGE_DATA_DIR          Data directory root
    WALLET_BRIDGE_TOR_BIN           Tor binary (default: tor)

EXAMPLES:
    wallet-bridge call seedNew 32
    printf 'openWallet {{}} secret\nbalance true\n' | wallet-bridge repl --json"#
    );
}

fn demo_bridge() -> Result<Bridge> {
    let engine = Arc::new(DemoEngine::new());
    Bridge::new(engine, BridgeConfig::from_env()).context("Failed to start bridge")
}

/// JSON when it parses, otherwise the raw string.
fn to_value(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

/// Engine payloads are usually JSON text; embed them as JSON when they are.
fn render(command: &str, result: &BridgeResult<String>) -> Value {
    match result {
        Ok(payload) => json!({
            "command": command,
            "ok": serde_json::from_str::<Value>(payload).unwrap_or_else(|_| Value::String(payload.clone())),
        }),
        Err(e) => json!({ "command": command, "error": e.to_string(), "kind": e.kind() }),
    }
}

fn encode(value: &Value, pretty: bool) -> Result<String> {
    let text = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    Ok(text)
}

async fn cmd_call(opts: &ParsedArgs) -> Result<()> {
    let (name, rest) = opts.positional.split_first().context("Usage: call <name> [args...]")?;
    let args: Vec<Value> = rest.iter().map(|a| to_value(a)).collect();

    let bridge = demo_bridge()?;
    let result = bridge.call(name, &args).await;
    bridge.shutdown().await;

    let output = encode(&render(name, &result), opts.pretty())?;
    match result {
        Ok(_) => {
            println!("{output}");
            Ok(())
        }
        Err(_) => {
            eprintln!("{output}");
            std::process::exit(1);
        }
    }
}

async fn cmd_repl(opts: &ParsedArgs) -> Result<()> {
    let bridge = demo_bridge()?;
    let shutdown = install_signal_handlers();
    let pretty = opts.pretty();

    let mut status = bridge.subscribe_proxy_status();
    let status_pretty = pretty;
    tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            let line = json!({ "event": ProxyStatusEvent::NAME, "status": event.status, "at": event.at });
            if let Ok(text) = encode(&line, status_pretty) {
                println!("{text}");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("REPL ready");
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown.wait() => break,
        };
        let Some(line) = line else { break };
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else { continue };
        if matches!(name, "quit" | "exit") {
            break;
        }
        let args: Vec<Value> = words.map(to_value).collect();
        debug!(command = name, args = args.len(), "REPL command");

        let result = bridge.call(name, &args).await;
        let mut text = encode(&render(name, &result), pretty)?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }

    bridge.shutdown().await;
    info!("REPL closed");
    Ok(())
}

//! DemoEngine - In-memory engine with canned wallet payloads
//!
//! Stands in for the native engine in demo mode and in tests. Recent calls
//! are recorded so callers can check which operations reached the engine.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{EngineError, EngineResult, ListenerHandle, WalletEngine, WalletHandle};

const DEMO_ADDRESS: &str = "grin1dhvv9mvarqwl6fderuxhcz6v4lzjwsmsaswy8vy5ruaf6slvwljs3mxjsq";
const SPENDABLE: u64 = 104_751_338_749;

/// Oldest calls are dropped past this many.
const CALL_LOG_LIMIT: usize = 1024;

#[derive(Default)]
struct DemoState {
    next_handle: u64,
    wallets: HashSet<u64>,
    listeners: HashSet<u64>,
    calls: VecDeque<String>,
    failures: HashMap<String, String>,
}

#[derive(Default)]
pub struct DemoEngine {
    state: Mutex<DemoState>,
    password: Option<String>,
    latency: Duration,
}

impl DemoEngine {
    pub fn new() -> Self { Self::default() }

    /// Reject `open` unless the password matches.
    pub fn with_password(mut self, password: impl Into<String>) -> Self { self.password = Some(password.into()); self }

    /// Sleep this long inside every call, simulating a slow engine.
    pub fn with_latency(mut self, latency: Duration) -> Self { self.latency = latency; self }

    /// Make every call to `op` fail with `message` until cleared.
    pub fn fail_on(&self, op: &str, message: impl Into<String>) {
        self.lock().failures.insert(op.to_string(), message.into());
    }

    pub fn clear_failure(&self, op: &str) {
        self.lock().failures.remove(op);
    }

    /// Names of the most recent calls, oldest first.
    pub fn calls(&self) -> Vec<String> { self.lock().calls.iter().cloned().collect() }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == op).count()
    }

    pub fn open_wallets(&self) -> usize { self.lock().wallets.len() }

    pub fn running_listeners(&self) -> usize { self.lock().listeners.len() }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Records the call, applies latency and injected failures.
    fn enter(&self, op: &str) -> EngineResult<()> {
        {
            let mut state = self.lock();
            if state.calls.len() == CALL_LOG_LIMIT {
                state.calls.pop_front();
            }
            state.calls.push_back(op.to_string());
            if let Some(message) = state.failures.get(op) {
                return Err(EngineError::new(message.clone()));
            }
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(())
    }

    fn wallet(&self, op: &str, wallet: WalletHandle) -> EngineResult<()> {
        self.enter(op)?;
        if self.lock().wallets.contains(&wallet.0) {
            Ok(())
        } else {
            Err(EngineError::new(format!("Generic error: unknown wallet {wallet}")))
        }
    }

    fn next_handle(&self) -> u64 {
        let mut state = self.lock();
        state.next_handle += 1;
        state.next_handle
    }
}

fn balance_summary() -> Value {
    json!({
        "amount_awaiting_confirmation": "0",
        "amount_awaiting_finalization": "0",
        "amount_currently_spendable": SPENDABLE.to_string(),
        "amount_immature": "0",
        "amount_locked": "0",
        "amount_reverted": "0",
        "last_confirmed_height": "986000",
        "minimum_confirmations": "10",
        "total": SPENDABLE.to_string(),
    })
}

fn transaction(id: u32, tx_type: &str, credited: &str, debited: &str, fee: &str, slate_id: &str) -> Value {
    let now = Utc::now().to_rfc3339();
    json!({
        "amount_credited": credited,
        "amount_debited": debited,
        "confirmation_ts": now,
        "confirmed": true,
        "creation_ts": now,
        "fee": fee,
        "id": id,
        "num_inputs": 0,
        "num_outputs": 1,
        "tx_slate_id": slate_id,
        "tx_type": tx_type,
    })
}

fn transactions() -> Vec<Value> {
    vec![
        transaction(0, "TxReceived", "123438749", "0", "0", "slateId1"),
        transaction(1, "TxSent", "0", "123438749", "8000000", "6ef39b6d-ce3c-4a22-a536-cea395dc4b62"),
    ]
}

fn slatepack(kind: &str) -> String {
    format!("BEGINSLATEPACK. demo{kind}payload. ENDSLATEPACK.")
}

impl WalletEngine for DemoEngine {
    fn open(&self, _config: &str, password: &str) -> EngineResult<WalletHandle> {
        self.enter("open")?;
        if let Some(expected) = &self.password {
            if expected != password {
                return Err(EngineError::new("Wallet can not be opened: invalid password"));
            }
        }
        let handle = self.next_handle();
        self.lock().wallets.insert(handle);
        Ok(WalletHandle(handle))
    }

    fn close(&self, wallet: WalletHandle) -> EngineResult<String> {
        self.wallet("close", wallet)?;
        self.lock().wallets.remove(&wallet.0);
        Ok("Wallet has been closed".into())
    }

    fn set_logger(&self) -> EngineResult<String> {
        self.enter("set_logger")?;
        Ok("Logger initiated successfully!".into())
    }

    fn check_password(&self, wallet: WalletHandle, password: &str) -> EngineResult<String> {
        self.wallet("check_password", wallet)?;
        match &self.password {
            Some(expected) if expected != password => Err(EngineError::new("Invalid password")),
            _ => Ok(String::new()),
        }
    }

    fn seed_new(&self, length: u64) -> EngineResult<String> {
        self.enter("seed_new")?;
        let words = match length {
            16 => 12,
            20 => 15,
            24 => 18,
            28 => 21,
            32 => 24,
            other => return Err(EngineError::new(format!("Generic error: invalid seed length {other}"))),
        };
        Ok(vec!["abandon"; words].join(" "))
    }

    fn wallet_init(&self, _config: &str, phrase: &str, _password: &str) -> EngineResult<String> {
        self.enter("wallet_init")?;
        if phrase.split_whitespace().count() < 12 {
            return Err(EngineError::new("Keychain error"));
        }
        Ok(String::new())
    }

    fn wallet_phrase(&self, _wallet_dir: &str, _password: &str) -> EngineResult<String> {
        self.enter("wallet_phrase")?;
        Ok(vec!["abandon"; 24].join(" "))
    }

    fn wallet_pmmr_range(&self, wallet: WalletHandle) -> EngineResult<String> {
        self.wallet("wallet_pmmr_range", wallet)?;
        Ok(json!([1, 986000]).to_string())
    }

    fn wallet_scan_outputs(&self, wallet: WalletHandle, _last: u64, highest_index: u64) -> EngineResult<String> {
        self.wallet("wallet_scan_outputs", wallet)?;
        Ok(json!(highest_index).to_string())
    }

    fn balance(&self, wallet: WalletHandle, refresh_from_node: bool) -> EngineResult<String> {
        self.wallet("balance", wallet)?;
        Ok(json!([refresh_from_node, balance_summary()]).to_string())
    }

    fn txs_get(&self, wallet: WalletHandle, _minimum_confirmations: u64, refresh_from_node: bool) -> EngineResult<String> {
        self.wallet("txs_get", wallet)?;
        Ok(json!([refresh_from_node, transactions(), balance_summary()]).to_string())
    }

    fn tx_get(&self, wallet: WalletHandle, refresh_from_node: bool, slate_id: &str) -> EngineResult<String> {
        self.wallet("tx_get", wallet)?;
        let tx = transactions()
            .into_iter()
            .find(|tx| tx["tx_slate_id"] == slate_id)
            .ok_or_else(|| EngineError::new(format!("Generic error: transaction {slate_id} not found")))?;
        Ok(json!([refresh_from_node, [tx]]).to_string())
    }

    fn tx_strategies(&self, wallet: WalletHandle, amount: u64, _minimum_confirmations: u64) -> EngineResult<String> {
        self.wallet("tx_strategies", wallet)?;
        if amount > SPENDABLE {
            return Err(EngineError::new("LibWallet Error: Not enough funds"));
        }
        Ok(json!([
            {"selection_strategy_is_use_all": true, "total": SPENDABLE, "fee": 8_000_000},
            {"selection_strategy_is_use_all": false, "total": amount, "fee": 8_000_000},
        ])
        .to_string())
    }

    fn tx_create(&self, wallet: WalletHandle, amount: u64, _minimum_confirmations: u64, _use_all: bool) -> EngineResult<String> {
        self.wallet("tx_create", wallet)?;
        if amount > SPENDABLE {
            return Err(EngineError::new("LibWallet Error: Not enough funds"));
        }
        Ok(json!([slatepack("send"), {"amount": amount.to_string()}]).to_string())
    }

    fn tx_send_address(&self, wallet: WalletHandle, amount: u64, _minimum_confirmations: u64, _use_all: bool, address: &str) -> EngineResult<String> {
        self.wallet("tx_send_address", wallet)?;
        Ok(json!({"amount": amount.to_string(), "destination": address}).to_string())
    }

    fn tx_send_https(&self, wallet: WalletHandle, amount: u64, _minimum_confirmations: u64, _use_all: bool, url: &str) -> EngineResult<String> {
        self.wallet("tx_send_https", wallet)?;
        Ok(json!({"amount": amount.to_string(), "destination": url}).to_string())
    }

    fn tx_cancel(&self, wallet: WalletHandle, _id: u32) -> EngineResult<String> {
        self.wallet("tx_cancel", wallet)?;
        Ok(String::new())
    }

    fn tx_receive(&self, wallet: WalletHandle, _account: &str, _slatepack: &str) -> EngineResult<String> {
        self.wallet("tx_receive", wallet)?;
        Ok(slatepack("receive"))
    }

    fn tx_finalize(&self, wallet: WalletHandle, _slatepack: &str) -> EngineResult<String> {
        self.wallet("tx_finalize", wallet)?;
        Ok(json!({"finalized": true}).to_string())
    }

    fn tx_post(&self, wallet: WalletHandle, _slate_id: &str) -> EngineResult<String> {
        self.wallet("tx_post", wallet)?;
        Ok(String::new())
    }

    fn slatepack_decode(&self, slatepack: &str) -> EngineResult<String> {
        self.enter("slatepack_decode")?;
        if !slatepack.starts_with("BEGINSLATEPACK") {
            return Err(EngineError::new("Generic error: invalid slatepack"));
        }
        Ok(json!({"ver": "4:3", "sta": "S1"}).to_string())
    }

    fn address(&self, wallet: WalletHandle) -> EngineResult<String> {
        self.wallet("address", wallet)?;
        Ok(DEMO_ADDRESS.into())
    }

    fn start_listener(&self, wallet: WalletHandle, _listen_address: &str) -> EngineResult<ListenerHandle> {
        self.wallet("start_listener", wallet)?;
        let handle = self.next_handle();
        self.lock().listeners.insert(handle);
        Ok(ListenerHandle(handle))
    }

    fn stop_listener(&self, listener: ListenerHandle) -> EngineResult<String> {
        self.enter("stop_listener")?;
        if self.lock().listeners.remove(&listener.0) {
            Ok("HTTP listener stopped".into())
        } else {
            Err(EngineError::new(format!("Generic error: unknown {listener}")))
        }
    }

    fn create_tor_config(&self, wallet: WalletHandle, _listen_address: &str) -> EngineResult<String> {
        self.wallet("create_tor_config", wallet)?;
        Ok(String::new())
    }
}

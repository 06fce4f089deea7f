//! Command catalog - named operations with positional arguments
//!
//! Names are the ones the UI sends (`openWallet`, `txsGet`, ...). Arguments
//! arrive as JSON values; numbers may come as doubles or numeric strings.

use serde_json::Value;
use std::fmt;

use crate::engine::{EngineResult, WalletEngine, WalletHandle};
use crate::error::{BridgeError, BridgeResult};

/// String argument kept out of logs and `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Secret(***)") }
}

/// Operations that need a live wallet handle and go straight to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOp {
    WalletPhrase { wallet_dir: String, password: Secret },
    CheckPassword { password: Secret },
    PmmrRange,
    ScanOutputs { last_retrieved_index: u64, highest_index: u64 },
    Balance { refresh_from_node: bool },
    TxsGet { minimum_confirmations: u64, refresh_from_node: bool },
    TxGet { refresh_from_node: bool, slate_id: String },
    TxStrategies { amount: u64, minimum_confirmations: u64 },
    TxCreate { amount: u64, minimum_confirmations: u64, use_all: bool },
    TxSendAddress { amount: u64, minimum_confirmations: u64, use_all: bool, address: String },
    TxSendHttps { amount: u64, minimum_confirmations: u64, use_all: bool, url: String },
    TxCancel { id: u32 },
    TxReceive { account: String, slatepack: String },
    TxFinalize { slatepack: String },
    TxPost { slate_id: String },
    Address,
}

impl WalletOp {
    pub fn name(&self) -> &'static str {
        match self {
            WalletOp::WalletPhrase { .. } => "walletPhrase",
            WalletOp::CheckPassword { .. } => "checkPassword",
            WalletOp::PmmrRange => "walletPmmrRange",
            WalletOp::ScanOutputs { .. } => "walletScanOutputs",
            WalletOp::Balance { .. } => "balance",
            WalletOp::TxsGet { .. } => "txsGet",
            WalletOp::TxGet { .. } => "txGet",
            WalletOp::TxStrategies { .. } => "txStrategies",
            WalletOp::TxCreate { .. } => "txCreate",
            WalletOp::TxSendAddress { .. } => "txSendAddress",
            WalletOp::TxSendHttps { .. } => "txSendHttps",
            WalletOp::TxCancel { .. } => "txCancel",
            WalletOp::TxReceive { .. } => "txReceive",
            WalletOp::TxFinalize { .. } => "txFinalize",
            WalletOp::TxPost { .. } => "txPost",
            WalletOp::Address => "getAddress",
        }
    }

    pub fn invoke(&self, engine: &dyn WalletEngine, wallet: WalletHandle) -> EngineResult<String> {
        match self {
            WalletOp::WalletPhrase { wallet_dir, password } => engine.wallet_phrase(wallet_dir, password.expose()),
            WalletOp::CheckPassword { password } => engine.check_password(wallet, password.expose()),
            WalletOp::PmmrRange => engine.wallet_pmmr_range(wallet),
            WalletOp::ScanOutputs { last_retrieved_index, highest_index } => {
                engine.wallet_scan_outputs(wallet, *last_retrieved_index, *highest_index)
            }
            WalletOp::Balance { refresh_from_node } => engine.balance(wallet, *refresh_from_node),
            WalletOp::TxsGet { minimum_confirmations, refresh_from_node } => {
                engine.txs_get(wallet, *minimum_confirmations, *refresh_from_node)
            }
            WalletOp::TxGet { refresh_from_node, slate_id } => engine.tx_get(wallet, *refresh_from_node, slate_id),
            WalletOp::TxStrategies { amount, minimum_confirmations } => {
                engine.tx_strategies(wallet, *amount, *minimum_confirmations)
            }
            WalletOp::TxCreate { amount, minimum_confirmations, use_all } => {
                engine.tx_create(wallet, *amount, *minimum_confirmations, *use_all)
            }
            WalletOp::TxSendAddress { amount, minimum_confirmations, use_all, address } => {
                engine.tx_send_address(wallet, *amount, *minimum_confirmations, *use_all, address)
            }
            WalletOp::TxSendHttps { amount, minimum_confirmations, use_all, url } => {
                engine.tx_send_https(wallet, *amount, *minimum_confirmations, *use_all, url)
            }
            WalletOp::TxCancel { id } => engine.tx_cancel(wallet, *id),
            WalletOp::TxReceive { account, slatepack } => engine.tx_receive(wallet, account, slatepack),
            WalletOp::TxFinalize { slatepack } => engine.tx_finalize(wallet, slatepack),
            WalletOp::TxPost { slate_id } => engine.tx_post(wallet, slate_id),
            WalletOp::Address => engine.address(wallet),
        }
    }
}

/// Engine operations that need no wallet handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    SetLogger,
    SeedNew { length: u64 },
    WalletInit { config: String, phrase: Secret, password: Secret },
    SlatepackDecode { slatepack: String },
}

impl EngineOp {
    pub fn name(&self) -> &'static str {
        match self {
            EngineOp::SetLogger => "setLogger",
            EngineOp::SeedNew { .. } => "seedNew",
            EngineOp::WalletInit { .. } => "walletInit",
            EngineOp::SlatepackDecode { .. } => "slatepackDecode",
        }
    }

    pub fn invoke(&self, engine: &dyn WalletEngine) -> EngineResult<String> {
        match self {
            EngineOp::SetLogger => engine.set_logger(),
            EngineOp::SeedNew { length } => engine.seed_new(*length),
            EngineOp::WalletInit { config, phrase, password } => {
                engine.wallet_init(config, phrase.expose(), password.expose())
            }
            EngineOp::SlatepackDecode { slatepack } => engine.slatepack_decode(slatepack),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenWallet { config: String, password: Secret },
    CloseWallet,
    /// `None` uses the configured listen address.
    StartListener { address: Option<String> },
    StopListener,
    StartProxy,
    StopProxy,
    Wallet(WalletOp),
    Engine(EngineOp),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenWallet { .. } => "openWallet",
            Command::CloseWallet => "closeWallet",
            Command::StartListener { .. } => "startListenWithHttp",
            Command::StopListener => "stopListenWithHttp",
            Command::StartProxy => "startTor",
            Command::StopProxy => "stopTor",
            Command::Wallet(op) => op.name(),
            Command::Engine(op) => op.name(),
        }
    }

    /// Needs a live wallet handle.
    pub fn is_wallet_scoped(&self) -> bool {
        matches!(self, Command::CloseWallet | Command::StartListener { .. } | Command::StartProxy | Command::Wallet(_))
    }

    /// Every name `parse` accepts.
    pub const NAMES: &'static [&'static str] = &[
        "setLogger", "openWallet", "closeWallet", "checkPassword", "seedNew", "walletInit", "walletPhrase",
        "walletPmmrRange", "walletScanOutputs", "balance", "txsGet", "txGet", "txStrategies", "txCreate", "txSendAddress",
        "txSendHttps", "txCancel", "txReceive", "txFinalize", "txPost", "slatepackDecode", "getAddress",
        "startListenWithHttp", "stopListenWithHttp", "startTor", "stopTor",
    ];

    pub fn parse(name: &str, args: &[Value]) -> BridgeResult<Command> {
        let mut a = Args::new(name, args);
        let command = match name {
            "openWallet" => Command::OpenWallet { config: a.string()?, password: a.secret()? },
            "closeWallet" => Command::CloseWallet,
            "setLogger" => Command::Engine(EngineOp::SetLogger),
            "checkPassword" => Command::Wallet(WalletOp::CheckPassword { password: a.secret()? }),
            "seedNew" => Command::Engine(EngineOp::SeedNew { length: a.number()? }),
            "walletInit" => Command::Engine(EngineOp::WalletInit { config: a.string()?, phrase: a.secret()?, password: a.secret()? }),
            "slatepackDecode" => Command::Engine(EngineOp::SlatepackDecode { slatepack: a.string()? }),
            "walletPhrase" => Command::Wallet(WalletOp::WalletPhrase { wallet_dir: a.string()?, password: a.secret()? }),
            "walletPmmrRange" => Command::Wallet(WalletOp::PmmrRange),
            "walletScanOutputs" => Command::Wallet(WalletOp::ScanOutputs { last_retrieved_index: a.number()?, highest_index: a.number()? }),
            "balance" => Command::Wallet(WalletOp::Balance { refresh_from_node: a.boolean()? }),
            "txsGet" => Command::Wallet(WalletOp::TxsGet { minimum_confirmations: a.number()?, refresh_from_node: a.boolean()? }),
            "txGet" => Command::Wallet(WalletOp::TxGet { refresh_from_node: a.boolean()?, slate_id: a.string()? }),
            "txStrategies" => Command::Wallet(WalletOp::TxStrategies { amount: a.number()?, minimum_confirmations: a.number()? }),
            "txCreate" => Command::Wallet(WalletOp::TxCreate { amount: a.number()?, minimum_confirmations: a.number()?, use_all: a.boolean()? }),
            "txSendAddress" => Command::Wallet(WalletOp::TxSendAddress {
                amount: a.number()?,
                minimum_confirmations: a.number()?,
                use_all: a.boolean()?,
                address: a.string()?,
            }),
            "txSendHttps" => Command::Wallet(WalletOp::TxSendHttps {
                amount: a.number()?,
                minimum_confirmations: a.number()?,
                use_all: a.boolean()?,
                url: a.string()?,
            }),
            "txCancel" => Command::Wallet(WalletOp::TxCancel { id: a.id()? }),
            "txReceive" => Command::Wallet(WalletOp::TxReceive { account: a.string()?, slatepack: a.string()? }),
            "txFinalize" => Command::Wallet(WalletOp::TxFinalize { slatepack: a.string()? }),
            "txPost" => Command::Wallet(WalletOp::TxPost { slate_id: a.string()? }),
            "getAddress" => Command::Wallet(WalletOp::Address),
            "startListenWithHttp" => Command::StartListener { address: a.optional_string()? },
            "stopListenWithHttp" => Command::StopListener,
            "startTor" => Command::StartProxy,
            "stopTor" => Command::StopProxy,
            other => return Err(BridgeError::InvalidCommand(format!("unknown operation {other}"))),
        };
        a.finish()?;
        Ok(command)
    }
}

/// Positional argument reader.
struct Args<'a> {
    name: &'a str,
    values: &'a [Value],
    pos: usize,
}

impl<'a> Args<'a> {
    fn new(name: &'a str, values: &'a [Value]) -> Self { Self { name, values, pos: 0 } }

    fn next(&mut self) -> Option<&'a Value> {
        let value = self.values.get(self.pos);
        self.pos += 1;
        value
    }

    fn bad(&self, expected: &str) -> BridgeError {
        BridgeError::InvalidCommand(format!("{}: argument {} must be {expected}", self.name, self.pos))
    }

    fn string(&mut self) -> BridgeResult<String> {
        match self.next() {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(self.bad("a string")),
        }
    }

    fn optional_string(&mut self) -> BridgeResult<Option<String>> {
        match self.next() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.bad("a string")),
        }
    }

    fn secret(&mut self) -> BridgeResult<Secret> { self.string().map(Secret) }

    fn boolean(&mut self) -> BridgeResult<bool> {
        match self.next() {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s == "true" => Ok(true),
            Some(Value::String(s)) if s == "false" => Ok(false),
            _ => Err(self.bad("a boolean")),
        }
    }

    /// Non-negative integer. Doubles are truncated toward zero.
    fn number(&mut self) -> BridgeResult<u64> {
        let parsed = match self.next() {
            Some(Value::Number(n)) => n.as_u64().or_else(|| {
                n.as_f64().filter(|f| f.is_finite() && *f >= 0.0 && *f < u64::MAX as f64).map(|f| f.trunc() as u64)
            }),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.bad("a non-negative integer"))
    }

    fn id(&mut self) -> BridgeResult<u32> {
        let n = self.number()?;
        u32::try_from(n).map_err(|_| self.bad("a transaction id"))
    }

    fn finish(&self) -> BridgeResult<()> {
        if self.pos < self.values.len() {
            return Err(BridgeError::InvalidCommand(format!(
                "{}: expected {} arguments, got {}",
                self.name,
                self.pos,
                self.values.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_catalog_name() {
        for name in Command::NAMES {
            let args: Vec<Value> = match *name {
                "openWallet" | "walletPhrase" | "txReceive" => vec![json!("a"), json!("b")],
                "walletInit" => vec![json!("a"), json!("b"), json!("c")],
                "seedNew" | "txCancel" => vec![json!(32)],
                "slatepackDecode" | "txFinalize" | "txPost" | "checkPassword" => vec![json!("s")],
                "walletScanOutputs" | "txStrategies" => vec![json!(1), json!(2)],
                "balance" => vec![json!(true)],
                "txsGet" => vec![json!(10), json!(false)],
                "txGet" => vec![json!(true), json!("id")],
                "txCreate" => vec![json!(1), json!(10), json!(false)],
                "txSendAddress" | "txSendHttps" => vec![json!(1), json!(10), json!(false), json!("dest")],
                _ => vec![],
            };
            let command = Command::parse(name, &args).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(command.name(), *name);
        }
    }

    #[test]
    fn doubles_and_numeric_strings_are_accepted() {
        let command = Command::parse("txCreate", &[json!(1500.0), json!("10"), json!("true")]).unwrap();
        assert_eq!(
            command,
            Command::Wallet(WalletOp::TxCreate { amount: 1500, minimum_confirmations: 10, use_all: true })
        );
    }

    #[test]
    fn wrong_types_and_arity_are_rejected() {
        assert!(matches!(Command::parse("txCreate", &[json!(-1), json!(10), json!(true)]), Err(BridgeError::InvalidCommand(_))));
        assert!(matches!(Command::parse("balance", &[]), Err(BridgeError::InvalidCommand(_))));
        assert!(matches!(Command::parse("closeWallet", &[json!(1)]), Err(BridgeError::InvalidCommand(_))));
        assert!(matches!(Command::parse("txCancel", &[json!(u64::MAX)]), Err(BridgeError::InvalidCommand(_))));
        assert!(matches!(Command::parse("mineBlock", &[]), Err(BridgeError::InvalidCommand(_))));
    }

    #[test]
    fn listener_address_is_optional() {
        assert_eq!(Command::parse("startListenWithHttp", &[]).unwrap(), Command::StartListener { address: None });
        assert_eq!(
            Command::parse("startListenWithHttp", &[json!("0.0.0.0:3415")]).unwrap(),
            Command::StartListener { address: Some("0.0.0.0:3415".into()) }
        );
    }

    #[test]
    fn scope_and_redaction() {
        assert!(Command::CloseWallet.is_wallet_scoped());
        assert!(Command::StartProxy.is_wallet_scoped());
        assert!(!Command::StopListener.is_wallet_scoped());
        assert!(!Command::Engine(EngineOp::SeedNew { length: 32 }).is_wallet_scoped());
        assert!(!Command::Engine(EngineOp::SetLogger).is_wallet_scoped());
        assert!(Command::parse("checkPassword", &[json!("pw")]).unwrap().is_wallet_scoped());

        let open = Command::parse("openWallet", &[json!("{}"), json!("hunter2")]).unwrap();
        assert!(!format!("{open:?}").contains("hunter2"));
        let check = Command::parse("checkPassword", &[json!("hunter2")]).unwrap();
        assert!(!format!("{check:?}").contains("hunter2"));
    }
}

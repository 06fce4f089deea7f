//! Tor control-port client (blocking, used from the driver thread)
//!
//! Speaks just enough of the control protocol to authenticate with the
//! cookie, read bootstrap progress, and request shutdown.

use regex::Regex;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::OnceLock;
use std::time::Duration;

use super::ProxyError;

/// Parsed `status/bootstrap-phase` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPhase {
    pub progress: u8,
    pub tag: String,
    pub summary: Option<String>,
}

impl BootstrapPhase {
    pub fn is_done(&self) -> bool { self.progress >= 100 }

    /// `NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY="Done"`
    pub fn parse(line: &str) -> Option<Self> {
        static PHASE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = PHASE
            .get_or_init(|| Regex::new(r#"PROGRESS=(\d{1,3})\s+TAG=([\w-]+)(?:\s+SUMMARY="([^"]*)")?"#).ok())
            .as_ref()?;
        let caps = re.captures(line)?;
        let progress: u16 = caps.get(1)?.as_str().parse().ok()?;
        Some(Self {
            progress: progress.min(100) as u8,
            tag: caps.get(2)?.as_str().to_string(),
            summary: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

pub struct TorControl {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TorControl {
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, ProxyError> {
        let sock = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ProxyError::Control(format!("no address for {addr}")))?;
        let stream = TcpStream::connect_timeout(&sock, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self { reader: BufReader::new(stream), writer })
    }

    pub fn authenticate(&mut self, cookie: &[u8]) -> Result<(), ProxyError> {
        self.command(&format!("AUTHENTICATE {}", hex::encode(cookie)))?;
        Ok(())
    }

    /// `GETINFO <key>`, returning the value.
    pub fn get_info(&mut self, key: &str) -> Result<String, ProxyError> {
        let lines = self.command(&format!("GETINFO {key}"))?;
        let prefix = format!("{key}=");
        lines
            .iter()
            .find_map(|l| l.strip_prefix(&prefix))
            .map(str::to_string)
            .ok_or_else(|| ProxyError::Control(format!("missing {key} in reply")))
    }

    pub fn bootstrap_phase(&mut self) -> Result<BootstrapPhase, ProxyError> {
        let raw = self.get_info("status/bootstrap-phase")?;
        BootstrapPhase::parse(&raw).ok_or_else(|| ProxyError::Control(format!("unparsable bootstrap phase: {raw}")))
    }

    pub fn signal_shutdown(&mut self) -> Result<(), ProxyError> {
        self.command("SIGNAL SHUTDOWN")?;
        Ok(())
    }

    /// Send one command and collect the reply body (status codes stripped).
    /// Any non-250 final line is an error.
    fn command(&mut self, line: &str) -> Result<Vec<String>, ProxyError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;

        let mut body = Vec::new();
        loop {
            let mut raw = String::new();
            if self.reader.read_line(&mut raw)? == 0 {
                return Err(ProxyError::Control("connection closed".into()));
            }
            let reply = raw.trim_end_matches(['\r', '\n']);
            let (Some(code), Some(sep), Some(text)) = (reply.get(..3), reply.get(3..4), reply.get(4..)) else {
                return Err(ProxyError::Control(format!("short reply: {reply}")));
            };
            if code != "250" {
                return Err(ProxyError::Control(reply.to_string()));
            }
            if text != "OK" || sep != " " {
                body.push(text.to_string());
            }
            if sep == " " {
                return Ok(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn parses_bootstrap_line() {
        let phase = BootstrapPhase::parse(r#"NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY="Done""#).unwrap();
        assert!(phase.is_done());
        assert_eq!(phase.tag, "done");
        assert_eq!(phase.summary.as_deref(), Some("Done"));

        let partial = BootstrapPhase::parse("NOTICE BOOTSTRAP PROGRESS=45 TAG=loading_descriptors").unwrap();
        assert_eq!(partial.progress, 45);
        assert!(!partial.is_done());
        assert!(partial.summary.is_none());

        assert!(BootstrapPhase::parse("garbage").is_none());
    }

    #[test]
    fn bootstrap_pattern_is_shared_between_threads() {
        let parsed: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| BootstrapPhase::parse("NOTICE BOOTSTRAP PROGRESS=250 TAG=done")))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect();
        for phase in parsed {
            assert_eq!(phase.map(|p| p.progress), Some(100));
        }
    }

    #[test]
    fn talks_to_control_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut seen = Vec::new();
            for _ in 0..2 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                seen.push(line.trim().to_string());
                if line.starts_with("AUTHENTICATE") {
                    writer.write_all(b"250 OK\r\n").unwrap();
                } else {
                    writer
                        .write_all(b"250-status/bootstrap-phase=NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY=\"Done\"\r\n250 OK\r\n")
                        .unwrap();
                }
            }
            seen
        });

        let mut control = TorControl::connect(&addr, Duration::from_secs(2)).unwrap();
        control.authenticate(&[0xab, 0xcd]).unwrap();
        let phase = control.bootstrap_phase().unwrap();
        assert!(phase.is_done());

        let seen = server.join().unwrap();
        assert_eq!(seen[0], "AUTHENTICATE abcd");
        assert_eq!(seen[1], "GETINFO status/bootstrap-phase");
    }

    #[test]
    fn error_reply_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut writer = stream;
            writer.write_all(b"515 Authentication failed\r\n").unwrap();
        });

        let mut control = TorControl::connect(&addr, Duration::from_secs(2)).unwrap();
        let err = control.authenticate(b"bad").unwrap_err();
        assert!(err.to_string().contains("515"));
        server.join().unwrap();
    }
}

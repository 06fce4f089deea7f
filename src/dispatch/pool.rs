//! Worker pool and single-shot completions

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Semaphore};

use crate::error::{BridgeError, BridgeResult};

/// Bounded pool for blocking engine calls. At most `size` calls run at once;
/// the rest wait for a permit without holding a thread.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self { permits: Arc::new(Semaphore::new(size)), size }
    }

    pub fn size(&self) -> usize { self.size }

    pub fn idle(&self) -> usize { self.permits.available_permits() }

    /// Run `f` on the blocking pool once a permit is free.
    pub async fn run<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BridgeError::Internal("worker pool closed".into()))?;
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| BridgeError::Internal(format!("worker failed: {e}")))
    }
}

/// Resolves a `PendingCompletion`. Consumed on use, so a command resolves at
/// most once; dropping it unresolved fails the completion.
pub struct Completer {
    tx: oneshot::Sender<BridgeResult<String>>,
}

impl Completer {
    pub fn resolve(self, result: BridgeResult<String>) {
        // Receiver gone means the caller stopped listening.
        let _ = self.tx.send(result);
    }
}

/// Single-shot result of one dispatched command.
pub struct PendingCompletion {
    command: &'static str,
    rx: oneshot::Receiver<BridgeResult<String>>,
}

impl PendingCompletion {
    pub fn channel(command: &'static str) -> (Completer, PendingCompletion) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, PendingCompletion { command, rx })
    }

    /// Already-resolved completion.
    pub fn ready(command: &'static str, result: BridgeResult<String>) -> PendingCompletion {
        let (completer, pending) = Self::channel(command);
        completer.resolve(result);
        pending
    }

    pub fn command(&self) -> &'static str { self.command }

    /// Wait from synchronous code. Must not be called from inside the
    /// runtime driving the bridge.
    pub fn wait(self) -> BridgeResult<String> {
        let command = self.command;
        self.rx.blocking_recv().unwrap_or_else(|_| Err(dropped(command)))
    }
}

impl Future for PendingCompletion {
    type Output = BridgeResult<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let command = self.command;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(dropped(command))))
    }
}

fn dropped(command: &str) -> BridgeError {
    BridgeError::Internal(format!("{command} was dropped before resolving"))
}

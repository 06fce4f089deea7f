//! Fanout - ordered push delivery to a list of subscribers
//!
//! Each subscriber owns an unbounded channel, so a slow reader never drops or
//! reorders events and never blocks the publisher.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

struct Inner<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    last: Option<T>,
    closed: bool,
}

pub struct Fanout<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Clone + Send + 'static> Default for Fanout<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Clone + Send + 'static> Fanout<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner { subscribers: Vec::new(), last: None, closed: false })) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// New subscribers first receive the most recent value, if any.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if let Some(last) = inner.last.clone() {
            let _ = tx.send(last);
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// Deliver to every live subscriber, pruning the ones that went away.
    /// Publishing and delivery share one lock, so all subscribers see the
    /// same order.
    pub fn publish(&self, value: T) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        inner.last = Some(value);
    }

    pub fn latest(&self) -> Option<T> { self.lock().last.clone() }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    /// End every subscription. Later publishes are ignored.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }
}

/// Receiving end of one subscription.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Next value, or `None` once the publisher is closed and drained.
    pub async fn recv(&mut self) -> Option<T> { self.rx.recv().await }

    pub fn try_recv(&mut self) -> Option<T> { self.rx.try_recv().ok() }

    /// Blocking receive for non-async callers. Must not be called from
    /// inside a tokio runtime.
    pub fn blocking_recv(&mut self) -> Option<T> { self.rx.blocking_recv() }
}

//! Round synchronization: the start gate, completion signals and shutdown.
//!
//! These replace the counting semaphores of a classic RTOS design:
//!
//! ```text
//! Coordinator                                   Agents (n)
//!     |-- RoundGate::release(ticket) ----------->| GateWaiter::wait()
//!     |                                          |   ... compute ...
//!     |<-- CompletionGuard::complete(value) -----|
//!     |   CompletionWaiter::wait_for(n - 1)      |
//! ```

use crate::error::EnvError;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, Clone)]
enum GateState<T> {
    Idle,
    Open(T),
    Closed,
}

/// Barrier that releases every subscribed agent at once with a ticket.
///
/// Each call to `release` wakes every waiter exactly once. Waiters must be
/// subscribed before the release they are meant to observe.
pub struct RoundGate<T> {
    tx: watch::Sender<GateState<T>>,
}

impl<T: Clone + Send + Sync + 'static> RoundGate<T> {
    /// Creates a gate with no round pending.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Idle);
        Self { tx }
    }
    
    /// Creates a waiter that will observe every subsequent release.
    pub fn subscribe(&self) -> GateWaiter<T> {
        GateWaiter {
            rx: self.tx.subscribe(),
        }
    }
    
    /// Opens the gate for one round.
    pub fn release(&self, ticket: T) -> Result<(), EnvError> {
        if self.is_closed() {
            return Err(EnvError::ChannelClosed);
        }
        self.tx.send_replace(GateState::Open(ticket));
        Ok(())
    }
    
    /// Closes the gate for good. Every waiter returns `ChannelClosed`.
    pub fn close(&self) {
        self.tx.send_replace(GateState::Closed);
    }
    
    /// Returns true once the gate has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(*self.tx.borrow(), GateState::Closed)
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RoundGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One agent's view of a `RoundGate`.
pub struct GateWaiter<T> {
    rx: watch::Receiver<GateState<T>>,
}

impl<T: Clone> GateWaiter<T> {
    /// Blocks until the next release and returns its ticket.
    pub async fn wait(&mut self) -> Result<T, EnvError> {
        let closed = matches!(*self.rx.borrow(), GateState::Closed);
        if closed {
            return Err(EnvError::ChannelClosed);
        }
        
        loop {
            if self.rx.changed().await.is_err() {
                return Err(EnvError::ChannelClosed);
            }
            let state = self.rx.borrow_and_update().clone();
            match state {
                GateState::Open(ticket) => return Ok(ticket),
                GateState::Closed => return Err(EnvError::ChannelClosed),
                GateState::Idle => continue,
            }
        }
    }
}

/// Creates a completion channel: cloneable senders, one waiter.
pub fn completion_channel<T>() -> (CompletionSender<T>, CompletionWaiter<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CompletionSender { tx },
        CompletionWaiter { rx: Mutex::new(rx) },
    )
}

/// Sending half of the completion channel.
pub struct CompletionSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for CompletionSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> CompletionSender<T> {
    /// Arms a guard that reports `on_drop` unless completed explicitly.
    pub fn guard(&self, on_drop: T) -> CompletionGuard<T> {
        CompletionGuard {
            tx: self.tx.clone(),
            pending: Some(on_drop),
        }
    }
}

/// Signals completion exactly once: explicitly, or on drop.
///
/// The drop path covers early returns and panics in the agent, so the
/// coordinator never waits on a signal that will not come.
pub struct CompletionGuard<T> {
    tx: mpsc::UnboundedSender<T>,
    pending: Option<T>,
}

impl<T> CompletionGuard<T> {
    /// Reports `value` and disarms the drop signal.
    pub fn complete(mut self, value: T) {
        self.pending = None;
        let _ = self.tx.send(value);
    }
}

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.pending.take() {
            let _ = self.tx.send(value);
        }
    }
}

/// Receiving half of the completion channel.
pub struct CompletionWaiter<T> {
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> CompletionWaiter<T> {
    /// Blocks until exactly `count` completions have arrived.
    pub async fn wait_for(&self, count: usize) -> Result<Vec<T>, EnvError> {
        let mut rx = self.rx.lock().await;
        let mut completions = Vec::with_capacity(count);
        
        while completions.len() < count {
            match rx.recv().await {
                Some(value) => completions.push(value),
                None => return Err(EnvError::ChannelClosed),
            }
        }
        
        Ok(completions)
    }
    
    /// Discards completions left over from an aborted round.
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Cloneable one-shot teardown flag.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Creates an untriggered flag.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
    
    /// Fires the flag. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
    
    /// Returns true once triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
    
    /// Resolves once the flag fires (immediately if it already has).
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let fired = *rx.borrow_and_update();
            if fired {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

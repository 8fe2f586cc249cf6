//! Production implementation of ChannelFabric using Tokio.

use crate::error::EnvError;
use crate::fabric::ChannelFabric;
use crate::gate::Shutdown;
use crate::types::{AgentId, WireMessage};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};

/// Traffic counters for one fabric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FabricStats {
    /// Messages enqueued
    pub sent: u64,
    
    /// Messages dequeued
    pub received: u64,
    
    /// Messages discarded by `purge`
    pub purged: u64,
}

/// One bounded (level, destination) queue.
struct Queue {
    tx: mpsc::Sender<WireMessage>,
    
    /// Only the destination drains the queue, so the lock is uncontended
    rx: Mutex<mpsc::Receiver<WireMessage>>,
}

/// Fabric backed by bounded `tokio::sync::mpsc` channels.
///
/// Queues are laid out level-major: `(level, agent)` lives at
/// `level * agents + agent`. Each queue has its own lock, so traffic to
/// unrelated agents never serializes.
pub struct TokioFabric {
    agents: usize,
    
    /// Capacity of every queue on a level, indexed by level
    capacities: Vec<usize>,
    
    queues: Vec<Queue>,
    
    shutdown: Shutdown,
    
    sent: AtomicU64,
    
    received: AtomicU64,
    
    purged: AtomicU64,
}

impl TokioFabric {
    /// Creates a fabric for `agents` destinations with one level per
    /// entry of `capacities`.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(agents: usize, capacities: &[usize]) -> Self {
        let capacities: Vec<usize> = capacities.iter().map(|c| (*c).max(1)).collect();
        let mut queues = Vec::with_capacity(capacities.len() * agents);
        
        for capacity in &capacities {
            for _ in 0..agents {
                let (tx, rx) = mpsc::channel(*capacity);
                queues.push(Queue {
                    tx,
                    rx: Mutex::new(rx),
                });
            }
        }
        
        Self {
            agents,
            capacities,
            queues,
            shutdown: Shutdown::new(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        }
    }
    
    /// Creates a fabric where every level has the same capacity.
    pub fn uniform(levels: usize, agents: usize, capacity: usize) -> Self {
        Self::new(agents, &vec![capacity; levels])
    }
    
    /// Returns the per-queue capacity of a level.
    pub fn capacity(&self, level: usize) -> Option<usize> {
        self.capacities.get(level).copied()
    }
    
    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> FabricStats {
        FabricStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
    
    fn queue(&self, level: usize, agent: AgentId) -> Result<&Queue, EnvError> {
        if level >= self.capacities.len() || agent.index() >= self.agents {
            return Err(EnvError::no_queue(level, agent));
        }
        Ok(&self.queues[level * self.agents + agent.index()])
    }
}

#[async_trait]
impl ChannelFabric for TokioFabric {
    async fn send(&self, level: usize, to: AgentId, message: WireMessage) -> Result<(), EnvError> {
        if self.shutdown.is_triggered() {
            return Err(EnvError::ChannelClosed);
        }
        let queue = self.queue(level, to)?;
        
        tokio::select! {
            sent = queue.tx.send(message) => {
                sent.map_err(|_| EnvError::ChannelClosed)?;
            }
            _ = self.shutdown.triggered() => return Err(EnvError::ChannelClosed),
        }
        
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    
    async fn receive(&self, level: usize, at: AgentId) -> Result<WireMessage, EnvError> {
        if self.shutdown.is_triggered() {
            return Err(EnvError::ChannelClosed);
        }
        let queue = self.queue(level, at)?;
        
        let message = tokio::select! {
            message = async {
                let mut rx = queue.rx.lock().await;
                rx.recv().await
            } => message.ok_or(EnvError::ChannelClosed)?,
            _ = self.shutdown.triggered() => return Err(EnvError::ChannelClosed),
        };
        
        self.received.fetch_add(1, Ordering::Relaxed);
        Ok(message)
    }
    
    async fn purge(&self) -> usize {
        let mut purged = 0;
        for queue in &self.queues {
            let mut rx = queue.rx.lock().await;
            while rx.try_recv().is_ok() {
                purged += 1;
            }
        }
        self.purged.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }
    
    fn close(&self) {
        self.shutdown.trigger();
    }
    
    fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }
    
    fn levels(&self) -> usize {
        self.capacities.len()
    }
    
    fn agents(&self) -> usize {
        self.agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    
    #[tokio::test]
    async fn test_send_then_receive() {
        let fabric = TokioFabric::uniform(2, 3, 2);
        
        fabric.send(1, AgentId(2), WireMessage::from("A:0")).await.unwrap();
        let got = fabric.receive(1, AgentId(2)).await.unwrap();
        
        assert_eq!(got, WireMessage::from("A:0"));
        assert_eq!(fabric.stats(), FabricStats { sent: 1, received: 1, purged: 0 });
    }
    
    #[tokio::test]
    async fn test_queues_are_isolated_by_level() {
        let fabric = TokioFabric::uniform(2, 2, 1);
        
        fabric.send(0, AgentId(1), WireMessage::from("A:0")).await.unwrap();
        
        let other_level = tokio::time::timeout(
            Duration::from_millis(20),
            fabric.receive(1, AgentId(1)),
        ).await;
        assert!(other_level.is_err());
        
        assert!(fabric.receive(0, AgentId(1)).await.is_ok());
    }
    
    #[tokio::test]
    async fn test_full_queue_blocks_instead_of_dropping() {
        let fabric = Arc::new(TokioFabric::uniform(1, 2, 1));
        fabric.send(0, AgentId(1), WireMessage::from("A:0")).await.unwrap();
        
        let sender = Arc::clone(&fabric);
        let blocked = tokio::spawn(async move {
            sender.send(0, AgentId(1), WireMessage::from("R:0")).await
        });
        
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        
        // Draining one slot lets the blocked sender through
        assert_eq!(fabric.receive(0, AgentId(1)).await.unwrap(), WireMessage::from("A:0"));
        blocked.await.unwrap().unwrap();
        assert_eq!(fabric.receive(0, AgentId(1)).await.unwrap(), WireMessage::from("R:0"));
    }
    
    #[tokio::test]
    async fn test_close_releases_blocked_receiver() {
        let fabric = Arc::new(TokioFabric::uniform(1, 2, 1));
        
        let receiver = Arc::clone(&fabric);
        let waiting = tokio::spawn(async move { receiver.receive(0, AgentId(0)).await });
        
        tokio::time::sleep(Duration::from_millis(10)).await;
        fabric.close();
        
        assert_eq!(waiting.await.unwrap(), Err(EnvError::ChannelClosed));
        assert!(fabric.is_closed());
        assert_eq!(
            fabric.send(0, AgentId(0), WireMessage::from("A:1")).await,
            Err(EnvError::ChannelClosed)
        );
    }
    
    #[tokio::test]
    async fn test_purge_empties_every_queue() {
        let fabric = TokioFabric::uniform(2, 3, 2);
        fabric.send(0, AgentId(0), WireMessage::from("X:3")).await.unwrap();
        fabric.send(1, AgentId(2), WireMessage::from("A:0.1")).await.unwrap();
        fabric.send(1, AgentId(2), WireMessage::from("R:0.1")).await.unwrap();
        
        assert_eq!(fabric.purge().await, 3);
        assert_eq!(fabric.purge().await, 0);
        
        fabric.send(1, AgentId(2), WireMessage::from("A:1.0")).await.unwrap();
        assert_eq!(fabric.receive(1, AgentId(2)).await.unwrap(), WireMessage::from("A:1.0"));
        assert_eq!(fabric.stats(), FabricStats { sent: 4, received: 1, purged: 3 });
    }
    
    #[tokio::test]
    async fn test_out_of_range_queue() {
        let fabric = TokioFabric::uniform(2, 3, 1);
        
        assert_eq!(
            fabric.send(2, AgentId(0), WireMessage::from("A:1")).await,
            Err(EnvError::no_queue(2, AgentId(0)))
        );
        assert!(fabric.receive(0, AgentId(3)).await.is_err());
    }
    
    #[test]
    fn test_capacity_floor() {
        let fabric = TokioFabric::new(4, &[0, 3, 6]);
        
        assert_eq!(fabric.levels(), 3);
        assert_eq!(fabric.agents(), 4);
        assert_eq!(fabric.capacity(0), Some(1));
        assert_eq!(fabric.capacity(2), Some(6));
        assert_eq!(fabric.capacity(3), None);
    }
}

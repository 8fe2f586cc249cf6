//! Channel fabric abstraction for the generals.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{AgentId, WireMessage};

/// A grid of bounded FIFO queues, one per (recursion level, destination).
///
/// # Implementations
///
/// - **Production**: `TokioFabric` - bounded `tokio::sync::mpsc` queues
/// - **Simulation**: wrappers that observe traffic before delegating
///
/// # Packet Flow
///
/// ```text
/// Agent A                    Fabric                     Agent B
///   |                          |                           |
///   |-- send(k, B, msg) ------>| queue (k, B)              |
///   |                          |<-- receive(k, B) ---------|
///   |                          |-- msg ------------------->|
/// ```
///
/// Levels run from `0` (the commander's initial order) up to `m`, the
/// recursion depth of the round. Any number of senders may feed the same
/// queue; only the destination agent drains it.
#[async_trait]
pub trait ChannelFabric: Send + Sync + 'static {
    /// Enqueues a message for `to` on the given level.
    ///
    /// # Blocking
    /// Waits while the destination queue is full. Messages are never
    /// dropped.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued
    /// * `Err(EnvError::ChannelClosed)` - The fabric was closed
    /// * `Err(EnvError::NoSuchQueue)` - Level or agent out of range
    async fn send(&self, level: usize, to: AgentId, message: WireMessage) -> Result<(), EnvError>;
    
    /// Dequeues the next message addressed to `at` on the given level.
    ///
    /// # Blocking
    /// Waits until a message arrives or the fabric is closed.
    async fn receive(&self, level: usize, at: AgentId) -> Result<WireMessage, EnvError>;
    
    /// Discards everything still queued, on every level and for every
    /// agent, and returns how many messages were dropped.
    ///
    /// Only meaningful between rounds, while nobody is sending.
    async fn purge(&self) -> usize;
    
    /// Closes the fabric, releasing every blocked sender and receiver.
    fn close(&self);
    
    /// Returns true once `close` has been called.
    fn is_closed(&self) -> bool;
    
    /// Number of recursion levels (m + 1).
    fn levels(&self) -> usize;
    
    /// Number of agents addressed by each level.
    fn agents(&self) -> usize;
}

//! Recording channel fabric for property checks.

use async_trait::async_trait;
use generals_core::codec;
use generals_core::Message;
use generals_env::{AgentId, ChannelFabric, EnvError, FabricStats, TokioFabric, WireMessage};
use std::sync::{Mutex, MutexGuard};

/// One message that made it onto the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub level: usize,
    pub to: AgentId,
    
    /// Decoded payload; `None` if the bytes did not decode
    pub message: Option<Message>,
}

/// Fabric wrapper that logs every successful send before it is consumed.
pub struct RecordingFabric<F: ChannelFabric = TokioFabric> {
    inner: F,
    sent: Mutex<Vec<SentRecord>>,
}

impl<F: ChannelFabric> RecordingFabric<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            sent: Mutex::new(Vec::new()),
        }
    }
    
    pub fn inner(&self) -> &F {
        &self.inner
    }
    
    /// Returns and clears everything recorded so far.
    pub fn take_records(&self) -> Vec<SentRecord> {
        std::mem::take(&mut *self.records())
    }
    
    /// Number of records currently held.
    pub fn record_count(&self) -> usize {
        self.records().len()
    }
    
    fn records(&self) -> MutexGuard<'_, Vec<SentRecord>> {
        // A panicking agent cannot leave a half-written record behind
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordingFabric<TokioFabric> {
    pub fn stats(&self) -> FabricStats {
        self.inner.stats()
    }
}

#[async_trait]
impl<F: ChannelFabric> ChannelFabric for RecordingFabric<F> {
    async fn send(&self, level: usize, to: AgentId, message: WireMessage) -> Result<(), EnvError> {
        let decoded = codec::decode(&message).ok();
        self.inner.send(level, to, message).await?;
        self.records().push(SentRecord {
            level,
            to,
            message: decoded,
        });
        Ok(())
    }
    
    async fn receive(&self, level: usize, at: AgentId) -> Result<WireMessage, EnvError> {
        self.inner.receive(level, at).await
    }
    
    async fn purge(&self) -> usize {
        self.inner.purge().await
    }
    
    fn close(&self) {
        self.inner.close();
    }
    
    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
    
    fn levels(&self) -> usize {
        self.inner.levels()
    }
    
    fn agents(&self) -> usize {
        self.inner.agents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generals_core::Decision;
    
    #[tokio::test]
    async fn test_records_decoded_sends() {
        let fabric = RecordingFabric::new(TokioFabric::uniform(2, 3, 4));
        let order = Message::order(Decision::Retreat, AgentId(2));
        
        fabric.send(0, AgentId(1), codec::encode(&order)).await.unwrap();
        fabric.send(1, AgentId(0), WireMessage::from("garbage")).await.unwrap();
        
        let records = fabric.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, Some(order));
        assert_eq!(records[0].to, AgentId(1));
        assert_eq!(records[1].level, 1);
        assert!(records[1].message.is_none());
        assert_eq!(fabric.record_count(), 0);
        
        // Delivery is untouched
        let wire = fabric.receive(0, AgentId(1)).await.unwrap();
        assert_eq!(wire.as_bytes(), b"R:2");
        assert_eq!(fabric.stats().sent, 2);
    }
    
    #[tokio::test]
    async fn test_failed_send_not_recorded() {
        let fabric = RecordingFabric::new(TokioFabric::uniform(1, 2, 1));
        
        assert!(fabric.send(3, AgentId(0), WireMessage::from("A:1")).await.is_err());
        fabric.close();
        assert!(fabric.is_closed());
        assert!(fabric.send(0, AgentId(0), WireMessage::from("A:1")).await.is_err());
        assert_eq!(fabric.record_count(), 0);
    }
}

//! Test fabric that tampers with chosen sends.

use async_trait::async_trait;
use crate::config::RoundConfig;
use generals_env::{AgentId, ChannelFabric, EnvError, TokioFabric, WireMessage};
use std::sync::Mutex;

/// One-shot rule: the first send to `to` on `level` carries `payload`.
#[derive(Debug, Clone)]
pub struct Tamper {
    pub level: usize,
    pub to: AgentId,
    pub payload: WireMessage,
    
    /// Swap the real message out instead of queueing `payload` ahead of it
    pub replace: bool,
}

impl Tamper {
    pub fn replace(level: usize, to: AgentId, payload: &str) -> Self {
        Self { level, to, payload: WireMessage::from(payload), replace: true }
    }
    
    pub fn prepend(level: usize, to: AgentId, payload: &str) -> Self {
        Self { level, to, payload: WireMessage::from(payload), replace: false }
    }
}

pub struct TamperingFabric {
    inner: TokioFabric,
    rules: Mutex<Vec<Tamper>>,
}

impl TamperingFabric {
    /// A fabric sized for `config`, with no rules yet.
    pub fn for_config(config: &RoundConfig) -> Self {
        Self {
            inner: TokioFabric::new(config.agents(), &config.fabric_capacities()),
            rules: Mutex::new(Vec::new()),
        }
    }
    
    pub fn arm(&self, tamper: Tamper) {
        self.rules.lock().unwrap().push(tamper);
    }
    
    pub fn inner(&self) -> &TokioFabric {
        &self.inner
    }
    
    fn take_rule(&self, level: usize, to: AgentId) -> Option<Tamper> {
        let mut rules = self.rules.lock().unwrap();
        let index = rules.iter().position(|r| r.level == level && r.to == to)?;
        Some(rules.remove(index))
    }
}

#[async_trait]
impl ChannelFabric for TamperingFabric {
    async fn send(&self, level: usize, to: AgentId, message: WireMessage) -> Result<(), EnvError> {
        match self.take_rule(level, to) {
            Some(rule) if rule.replace => self.inner.send(level, to, rule.payload).await,
            Some(rule) => {
                self.inner.send(level, to, rule.payload).await?;
                self.inner.send(level, to, message).await
            }
            None => self.inner.send(level, to, message).await,
        }
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

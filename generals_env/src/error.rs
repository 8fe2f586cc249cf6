//! Error types for the generals environment abstraction.

use crate::types::AgentId;
use thiserror::Error;

/// Errors that can occur in the channel fabric and round primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// The fabric or gate was torn down while a caller was blocked on it
    #[error("Channel closed")]
    ChannelClosed,
    
    /// No queue exists for the requested (level, agent) pair
    #[error("No queue for level {level}, agent {agent}")]
    NoSuchQueue { level: usize, agent: AgentId },
}

impl EnvError {
    /// Creates a missing-queue error.
    pub fn no_queue(level: usize, agent: AgentId) -> Self {
        Self::NoSuchQueue { level, agent }
    }
    
    /// Returns true if this error means the round was torn down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}

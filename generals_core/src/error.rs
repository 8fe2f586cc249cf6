//! Error taxonomy of the Oral-Messages engine.

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::message::Path;
use generals_env::{AgentId, EnvError};
use thiserror::Error;

/// Errors raised by setup, the engine and the round coordinator.
///
/// Only `Configuration` is expected from well-behaved callers; the rest
/// end a round (`ChannelClosed`) or flag an engine bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneralsError {
    /// Setup or broadcast rejected before anything ran
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    
    /// A payload on an engine channel did not decode
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] CodecError),
    
    /// An agent was asked to sign a message it already relayed
    #[error("relay cycle: agent {agent} already on path {path}")]
    RelayCycle { agent: AgentId, path: Path },
    
    /// A well-formed message that cannot belong to this agent's round
    #[error("unexpected message for agent {agent} at level {level}: path {path}")]
    UnexpectedMessage {
        agent: AgentId,
        level: usize,
        path: Path,
    },
    
    /// The event loop of this general was already handed out
    #[error("agent {0} already has a runtime")]
    AgentTaken(AgentId),
    
    /// The round was torn down while this call was blocked
    #[error("round aborted: channel closed")]
    ChannelClosed,
    
    /// Any other fabric failure
    #[error("fabric error: {0}")]
    Fabric(EnvError),
}

impl GeneralsError {
    /// Returns true if the error only means the round was torn down.
    pub fn is_aborted(&self) -> bool {
        matches!(self, GeneralsError::ChannelClosed)
    }
}

impl From<EnvError> for GeneralsError {
    fn from(err: EnvError) -> Self {
        if err.is_closed() {
            GeneralsError::ChannelClosed
        } else {
            GeneralsError::Fabric(err)
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, GeneralsError>;

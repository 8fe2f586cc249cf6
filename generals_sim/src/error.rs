//! Harness errors.

use generals_core::GeneralsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    
    #[error(transparent)]
    Generals(#[from] GeneralsError),
    
    #[error("Agent task {agent} panicked: {reason}")]
    AgentPanicked { agent: usize, reason: String },
}

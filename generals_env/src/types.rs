//! Common types for the generals environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of a general taking part in a round.
///
/// Ids are dense: a round with `n` generals uses ids `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Creates an AgentId from its raw value.
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    
    /// Returns the id as a queue/table index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    
    /// Iterates over every id of a round with `count` generals, ascending.
    pub fn all(count: usize) -> impl Iterator<Item = AgentId> {
        (0..count as u32).map(AgentId)
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded message as it travels through the channel fabric.
///
/// The fabric never looks inside the payload; decoding is the job of
/// the receiving engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// The raw encoded bytes
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Creates a new wire message from payload bytes.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
    
    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
    
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

impl From<String> for WireMessage {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<&str> for WireMessage {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

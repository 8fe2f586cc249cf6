//! Generals Core - Oral-Messages Byzantine agreement
//!
//! This library runs the recursive OM(m) algorithm between n concurrent
//! generals. With at most m traitors and n > 3m:
//! 1. **Agreement**: every loyal lieutenant decides the same value
//! 2. **Validity**: if the commander is loyal, that value is its order
//!
//! ```text
//!              commander --- level 0 ---> lieutenants
//!                                           |
//!        OM(m): each relays what it heard --+-- level 1 ---> peers
//!                                                  |
//!                 ... down to level m, then majority back up
//! ```
//!
//! Every relay carries the path of generals it went through, so a value is
//! never relayed back to a general that already signed it.

pub mod agent_runtime;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod report;
pub mod traitor;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use agent_runtime::{AgentOutcome, AgentRuntime, AgentState, Completion, RoundTicket};
pub use codec::CodecError;
pub use config::{ConfigError, RoundConfig};
pub use coordinator::{Generals, RoundOutcome};
pub use engine::{eligible, majority, OmEngine};
pub use error::{GeneralsError, Result};
pub use message::{Decision, Message, Path};
pub use report::{Observation, Report};
pub use traitor::TraitorStrategy;

pub use generals_env::{AgentId, ChannelFabric, TokioFabric, WireMessage};

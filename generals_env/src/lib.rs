//! Generals Environment Abstraction Layer
//!
//! This crate provides the message substrate the Oral-Messages engine runs
//! on: a grid of bounded queues (the *channel fabric*) plus the
//! synchronization that turns one round into a single synchronous call.
//!
//! # Core Concept: Levels and Destinations
//!
//! Every recursion depth of OM(m) gets its own row of queues, one per
//! agent. Level 0 carries the commander's order, level `k` carries the
//! relays of an agent running with `k` levels of recursion left:
//!
//! ```text
//!            agent 0   agent 1   agent 2   agent 3
//! level m   [queue]   [queue]   [queue]   [queue]
//!   ...
//! level 0   [queue]   [queue]   [queue]   [queue]
//! ```
//!
//! Queues are bounded: a full queue blocks the sender, it never drops.
//!
//! # Example
//!
//! ```ignore
//! use generals_env::{AgentId, ChannelFabric, TokioFabric, WireMessage};
//!
//! let fabric = TokioFabric::uniform(2, 4, 3);
//! fabric.send(1, AgentId(2), WireMessage::from("A:3.0")).await?;
//! let wire = fabric.receive(1, AgentId(2)).await?;
//! ```

mod error;
mod fabric;
mod gate;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use fabric::ChannelFabric;
pub use gate::{
    completion_channel, CompletionGuard, CompletionSender, CompletionWaiter, GateWaiter,
    RoundGate, Shutdown,
};
pub use tokio_impl::{FabricStats, TokioFabric};
pub use types::{AgentId, WireMessage};

//! Generals Simulation Harness
//!
//! This crate bootstraps a set of generals, plays named scenarios against
//! them, and checks every round with an oracle that knows the traitors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ Generals (coordinator, gate, completions)            │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │ General │◄────────────►│ General │     ...               │
//! │  │   #0    │  Recording   │   #1    │                       │
//! │  └─────────┘   Fabric     └─────────┘                       │
//! │                   │                                         │
//! │  ┌────────────────▼──────────────────┐                      │
//! │  │            Oracle                 │                      │
//! │  │  (agreement, validity, paths)     │                      │
//! │  └───────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use generals_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 7).run(ScenarioId::DeepRecursion);
//! assert!(result.passed);
//! ```

mod error;
mod world;
mod oracle;
mod network;
mod roster;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use world::{RoundTrace, SimConfig, SimWorld};
pub use oracle::{Oracle, Violation};
pub use network::{RecordingFabric, SentRecord};
pub use roster::DeterministicRoster;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};

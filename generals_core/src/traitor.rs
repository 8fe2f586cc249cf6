//! Deterministic traitor model.
//!
//! A traitor signs honestly (its id still goes on the path) but lies about
//! the value. Lies are a pure function of who is lying and to whom, so
//! every run of a scenario is reproducible.

use crate::config::RoundConfig;
use crate::message::{Decision, Message};
use generals_env::AgentId;
use serde::{Deserialize, Serialize};

/// How a traitor picks the value it relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitorStrategy {
    /// Even ids relay Retreat, odd ids relay Attack, to every target
    #[default]
    Parity,
    
    /// Relay the opposite of the value being passed on
    Invert,
    
    /// Tell each target something different: `(agent + target)` even
    /// relays Retreat, odd relays Attack
    Equivocate,
}

impl TraitorStrategy {
    /// Returns every strategy.
    pub fn all() -> Vec<TraitorStrategy> {
        vec![
            TraitorStrategy::Parity,
            TraitorStrategy::Invert,
            TraitorStrategy::Equivocate,
        ]
    }
    
    pub fn name(&self) -> &'static str {
        match self {
            TraitorStrategy::Parity => "parity",
            TraitorStrategy::Invert => "invert",
            TraitorStrategy::Equivocate => "equivocate",
        }
    }
    
    /// The value a traitor sends to `target` instead of `honest`.
    pub fn lie(&self, agent: AgentId, target: AgentId, honest: Decision) -> Decision {
        match self {
            TraitorStrategy::Parity => parity(agent.0 as u64),
            TraitorStrategy::Invert => honest.opposite(),
            TraitorStrategy::Equivocate => parity(agent.0 as u64 + target.0 as u64),
        }
    }
}

fn parity(n: u64) -> Decision {
    if n % 2 == 0 {
        Decision::Retreat
    } else {
        Decision::Attack
    }
}

impl std::fmt::Display for TraitorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TraitorStrategy {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parity" => Ok(TraitorStrategy::Parity),
            "invert" => Ok(TraitorStrategy::Invert),
            "equivocate" => Ok(TraitorStrategy::Equivocate),
            _ => Err(format!(
                "Unknown traitor strategy: {}. Valid: parity, invert, equivocate",
                s
            )),
        }
    }
}

/// Applies the traitor model to one outgoing hop.
///
/// Called once per (sender, target) pair right before the send. Loyal
/// senders get their message back unchanged; the path is never altered.
pub fn corrupt(message: &Message, agent: AgentId, target: AgentId, config: &RoundConfig) -> Message {
    if config.is_loyal(agent) {
        return message.clone();
    }
    let lie = config.strategy().lie(agent, target, message.value());
    message.with_value(lie)
}

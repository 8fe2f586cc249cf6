//! SimWorld - one set of generals, their tasks, and everything they sent.

use crate::error::SimError;
use crate::network::{RecordingFabric, SentRecord};

use generals_core::{Decision, Generals, GeneralsError, RoundConfig, RoundOutcome, TraitorStrategy};
use generals_env::{AgentId, FabricStats, TokioFabric};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,
    
    /// Number of generals for seeded scenarios
    pub num_agents: usize,
    
    /// Rounds played by multi-round scenarios
    pub rounds: usize,
    
    /// Order of every round (drawn from the seed when unset)
    pub order: Option<Decision>,
    
    /// How traitors lie (drawn from the seed when unset)
    pub strategy: Option<TraitorStrategy>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 7,
            rounds: 3,
            order: None,
            strategy: None,
        }
    }
}

impl SimConfig {
    /// Loads a JSON config; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Everything one round produced.
#[derive(Debug, Clone)]
pub struct RoundTrace {
    pub outcome: RoundOutcome,
    
    /// Every message put on the fabric during the round, commander included
    pub sends: Vec<SentRecord>,
}

/// The SimWorld - a set of generals with one task per agent.
pub struct SimWorld {
    generals: Generals<RecordingFabric>,
    handles: Vec<JoinHandle<()>>,
}

impl SimWorld {
    /// Sets up the generals on a recording fabric. No task is spawned yet.
    pub fn new(config: RoundConfig) -> Result<Self, GeneralsError> {
        config.validate()?;
        let fabric = RecordingFabric::new(TokioFabric::new(
            config.agents(),
            &config.fabric_capacities(),
        ));
        let generals = Generals::setup_with_fabric(config, fabric)?;
        
        Ok(Self {
            generals,
            handles: Vec::new(),
        })
    }
    
    pub fn config(&self) -> &RoundConfig {
        self.generals.config()
    }
    
    /// Spawns one task per general. Must be called inside a tokio runtime.
    pub fn spawn_agents(&mut self) -> Vec<AgentId> {
        let mut ids = Vec::new();
        
        for agent in self.generals.agents() {
            ids.push(agent.id());
            self.handles.push(tokio::spawn(agent.run()));
        }
        
        debug!(agents = ids.len(), "agents spawned");
        ids
    }
    
    /// Plays one round and returns its outcome with the traffic it caused.
    pub async fn run_round(&self, order: Decision, commander: AgentId) -> Result<RoundTrace, GeneralsError> {
        let fabric = self.generals.fabric();
        let stale = fabric.take_records();
        if !stale.is_empty() {
            debug!(stale = stale.len(), "discarding records from an earlier round");
        }
        
        let outcome = self.generals.broadcast(order, commander).await?;
        
        Ok(RoundTrace {
            outcome,
            sends: fabric.take_records(),
        })
    }
    
    pub fn stats(&self) -> FabricStats {
        self.generals.fabric().stats()
    }
    
    /// Returns the number of spawned agent tasks.
    pub fn agent_count(&self) -> usize {
        self.handles.len()
    }
    
    /// Cleans up the generals and joins every agent task.
    pub async fn shutdown(mut self) -> Result<(), SimError> {
        self.generals.cleanup();
        
        for (agent, handle) in std::mem::take(&mut self.handles).into_iter().enumerate() {
            if let Err(e) = handle.await {
                return Err(SimError::AgentPanicked {
                    agent,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

//! Round configuration and its validation.

use crate::traitor::TraitorStrategy;
use generals_env::AgentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a round cannot be set up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a round needs at least 2 generals, got {0}")]
    TooFewAgents(usize),
    
    #[error("{agents} generals cannot tolerate {traitors} traitors (need n > 3m)")]
    TooManyTraitors { agents: usize, traitors: usize },
    
    #[error("agent {agent} is not one of the {agents} generals")]
    UnknownAgent { agent: AgentId, agents: usize },
    
    #[error("reporter {reporter} is not one of the {agents} generals")]
    UnknownReporter { reporter: AgentId, agents: usize },
    
    #[error("commander {commander} is not one of the {agents} generals")]
    UnknownCommander { commander: AgentId, agents: usize },
    
    #[error("fabric is {levels} levels x {agents} agents, round needs {expected_levels} x {expected_agents}")]
    FabricShape {
        levels: usize,
        agents: usize,
        expected_levels: usize,
        expected_agents: usize,
    },
}

/// Everything fixed for the lifetime of a set-up round.
///
/// The commander is not part of the configuration: it is chosen per
/// broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// `loyalty[i]` is false if general `i` is a traitor
    loyalty: Vec<bool>,
    
    /// General whose base-case observations form the round's report
    reporter: AgentId,
    
    /// How traitors lie
    #[serde(default)]
    strategy: TraitorStrategy,
}

impl RoundConfig {
    /// Creates and validates a configuration.
    pub fn new(loyalty: Vec<bool>, reporter: AgentId) -> Result<Self, ConfigError> {
        let config = Self {
            loyalty,
            reporter,
            strategy: TraitorStrategy::default(),
        };
        config.validate()?;
        Ok(config)
    }
    
    /// Creates a configuration of `agents` generals where exactly the
    /// listed ids are traitors.
    pub fn with_traitors(
        agents: usize,
        traitors: &[AgentId],
        reporter: AgentId,
    ) -> Result<Self, ConfigError> {
        let mut loyalty = vec![true; agents];
        for traitor in traitors {
            match loyalty.get_mut(traitor.index()) {
                Some(slot) => *slot = false,
                None => return Err(ConfigError::UnknownAgent { agent: *traitor, agents }),
            }
        }
        Self::new(loyalty, reporter)
    }
    
    /// Sets the traitor strategy.
    pub fn with_strategy(mut self, strategy: TraitorStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    
    /// Checks `n >= 2`, `reporter < n` and `n > 3m`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agents = self.agents();
        if agents < 2 {
            return Err(ConfigError::TooFewAgents(agents));
        }
        if self.reporter.index() >= agents {
            return Err(ConfigError::UnknownReporter {
                reporter: self.reporter,
                agents,
            });
        }
        let traitors = self.traitor_count();
        if agents <= 3 * traitors {
            return Err(ConfigError::TooManyTraitors { agents, traitors });
        }
        Ok(())
    }
    
    /// Checks that `commander` can lead a round.
    pub fn check_commander(&self, commander: AgentId) -> Result<(), ConfigError> {
        if commander.index() >= self.agents() {
            return Err(ConfigError::UnknownCommander {
                commander,
                agents: self.agents(),
            });
        }
        Ok(())
    }
    
    pub fn agents(&self) -> usize {
        self.loyalty.len()
    }
    
    pub fn reporter(&self) -> AgentId {
        self.reporter
    }
    
    pub fn strategy(&self) -> TraitorStrategy {
        self.strategy
    }
    
    pub fn is_loyal(&self, agent: AgentId) -> bool {
        self.loyalty.get(agent.index()).copied().unwrap_or(false)
    }
    
    /// Ids of every traitor, ascending.
    pub fn traitors(&self) -> Vec<AgentId> {
        AgentId::all(self.agents())
            .filter(|id| !self.is_loyal(*id))
            .collect()
    }
    
    pub fn traitor_count(&self) -> usize {
        self.loyalty.iter().filter(|loyal| !**loyal).count()
    }
    
    /// Recursion depth m of OM(m): one level per tolerated traitor.
    pub fn depth(&self) -> usize {
        self.traitor_count()
    }
    
    /// Number of fabric levels a round needs (m + 1).
    pub fn levels(&self) -> usize {
        self.depth() + 1
    }
    
    /// Per-level queue capacity for this round.
    ///
    /// All sub-rounds of one level share the destination's queue, so on
    /// level `k >= 1` an agent can receive one message for every relay
    /// chain of `m - k + 1` distinct generals drawn from the `n - 2` that
    /// are neither the commander nor the agent itself. Capacity never
    /// drops below `n - 1`.
    pub fn fabric_capacities(&self) -> Vec<usize> {
        let agents = self.agents();
        let depth = self.depth();
        let floor = agents.saturating_sub(1).max(1);
        
        (0..=depth)
            .map(|level| {
                if level == 0 {
                    return floor;
                }
                let chain = depth - level + 1;
                permutations(agents.saturating_sub(2), chain).max(floor)
            })
            .collect()
    }
}

/// Ordered selections of `r` items out of `n`, saturating.
fn permutations(n: usize, r: usize) -> usize {
    if r > n {
        return 0;
    }
    (n - r + 1..=n).fold(1usize, |acc, k| acc.saturating_mul(k))
}

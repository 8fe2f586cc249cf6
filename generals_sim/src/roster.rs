//! Deterministic roster for simulation.

use generals_core::{ConfigError, Decision, RoundConfig, TraitorStrategy};
use generals_env::AgentId;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Draws traitors, commanders and orders from a single seed.
///
/// The same seed always yields the same sequence of draws, so a failing
/// run can be replayed from its seed alone.
pub struct DeterministicRoster {
    seed: u64,
    rng: ChaCha8Rng,
}

impl DeterministicRoster {
    pub fn new(seed: u64) -> Self {
        // Golden ratio prime
        let roster_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(roster_seed),
        }
    }
    
    pub fn seed(&self) -> u64 {
        self.seed
    }
    
    /// Most traitors OM(m) tolerates among `agents` generals.
    pub fn max_traitors(agents: usize) -> usize {
        agents.saturating_sub(1) / 3
    }
    
    /// Picks `count` distinct traitors, capped at `max_traitors`, ascending.
    pub fn pick_traitors(&mut self, agents: usize, count: usize) -> Vec<AgentId> {
        let count = count.min(Self::max_traitors(agents));
        let mut traitors: Vec<AgentId> = index::sample(&mut self.rng, agents, count)
            .into_iter()
            .map(|i| AgentId(i as u32))
            .collect();
        traitors.sort();
        traitors
    }
    
    pub fn pick_commander(&mut self, agents: usize) -> AgentId {
        AgentId(self.rng.gen_range(0..agents.max(1)) as u32)
    }
    
    /// Picks a commander from the loyal generals, if there is one.
    pub fn pick_loyal_commander(&mut self, config: &RoundConfig) -> Option<AgentId> {
        let loyal: Vec<AgentId> = AgentId::all(config.agents())
            .filter(|id| config.is_loyal(*id))
            .collect();
        loyal.choose(&mut self.rng).copied()
    }
    
    pub fn pick_order(&mut self) -> Decision {
        if self.rng.gen_bool(0.5) {
            Decision::Attack
        } else {
            Decision::Retreat
        }
    }
    
    pub fn pick_strategy(&mut self) -> TraitorStrategy {
        TraitorStrategy::all()
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_default()
    }
    
    /// Builds a round with as many traitors as `agents` tolerates and a
    /// random reporter.
    pub fn round_config(&mut self, agents: usize, strategy: TraitorStrategy) -> Result<RoundConfig, ConfigError> {
        let traitors = self.pick_traitors(agents, Self::max_traitors(agents));
        let reporter = self.pick_commander(agents);
        Ok(RoundConfig::with_traitors(agents, &traitors, reporter)?.with_strategy(strategy))
    }
}

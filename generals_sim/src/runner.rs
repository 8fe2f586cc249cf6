//! Scenario runner - plays scenarios and checks them against the oracle.

use crate::oracle::Oracle;
use crate::roster::DeterministicRoster;
use crate::scenarios::ScenarioId;
use crate::world::{RoundTrace, SimConfig, SimWorld};

use generals_core::{ConfigError, Decision, GeneralsError, RoundConfig, TraitorStrategy};
use generals_env::AgentId;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Generals in the round
    pub agents: usize,
    
    /// Traitors among them (the recursion depth m)
    pub traitors: usize,
    
    /// Rounds completed
    pub rounds: u64,
    
    /// Messages put on the fabric, commander orders included
    pub messages_sent: u64,
    
    /// Messages taken off the fabric
    pub messages_received: u64,
    
    /// Highest fabric level used
    pub max_level: usize,
    
    /// Base-case values recorded by the reporter
    pub observations: u64,
}

impl ScenarioMetrics {
    fn absorb(&mut self, trace: &RoundTrace) {
        self.rounds += 1;
        self.messages_sent += trace.sends.len() as u64;
        if let Some(level) = trace.sends.iter().map(|s| s.level).max() {
            self.max_level = self.max_level.max(level);
        }
        if let Some(report) = &trace.outcome.report {
            self.observations += report.observations.len() as u64;
        }
    }
}

/// Runs generals scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
    
    /// Generals in seeded scenarios
    num_agents: usize,
    
    /// Rounds in multi-round scenarios
    rounds: usize,
    
    order: Option<Decision>,
    strategy: Option<TraitorStrategy>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self {
            seed,
            num_agents,
            rounds: 3,
            order: None,
            strategy: None,
        }
    }
    
    /// Creates a runner from a harness config.
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            seed: config.seed,
            num_agents: config.num_agents,
            rounds: config.rounds,
            order: config.order,
            strategy: config.strategy,
        }
    }
    
    /// Sets the seed, keeping everything else.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }
    
    /// Fixes the order of every round.
    pub fn with_order(mut self, order: Decision) -> Self {
        self.order = Some(order);
        self
    }
    
    /// Fixes how traitors lie.
    pub fn with_strategy(mut self, strategy: TraitorStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
    
    /// Runs a scenario on a fresh runtime and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => return self.result(scenario, Err(format!("runtime: {}", e))),
        };
        let outcome = runtime.block_on(self.run_async(scenario));
        self.result(scenario, outcome)
    }
    
    /// Runs a scenario on the current runtime.
    pub async fn run_async(&self, scenario: ScenarioId) -> Result<ScenarioMetrics, String> {
        match scenario {
            ScenarioId::LoyalCommander => self.run_loyal_commander().await,
            ScenarioId::TraitorLieutenant => self.run_traitor_lieutenant().await,
            ScenarioId::TraitorCommander => self.run_traitor_commander().await,
            ScenarioId::InvalidConfig => self.run_invalid_config(),
            ScenarioId::DeepRecursion => self.run_deep_recursion().await,
            ScenarioId::WideCouncil => self.run_wide_council().await,
            ScenarioId::EquivocatingCommander => self.run_equivocating_commander().await,
            ScenarioId::RandomRoster => self.run_random_roster().await,
        }
    }
    
    fn result(&self, scenario: ScenarioId, outcome: Result<ScenarioMetrics, String>) -> ScenarioResult {
        match outcome {
            Ok(metrics) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: true,
                failure_reason: None,
                metrics,
            },
            Err(reason) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                failure_reason: Some(reason),
                metrics: ScenarioMetrics::default(),
            },
        }
    }
    
    fn roster(&self) -> DeterministicRoster {
        DeterministicRoster::new(self.seed)
    }
    
    fn strategy_or(&self, fallback: TraitorStrategy) -> TraitorStrategy {
        self.strategy.unwrap_or(fallback)
    }
    
    /// GEN-001: the reporter decides what a loyal commander ordered.
    async fn run_loyal_commander(&self) -> Result<ScenarioMetrics, String> {
        let config = RoundConfig::new(vec![true; 4], AgentId(0)).map_err(setup_failed)?;
        
        self.play(config, &[(Decision::Attack, AgentId(3))], |trace| {
            let report = trace.outcome.report.as_ref().ok_or("reporter sent no report")?;
            expect_decision(report.decision, Decision::Attack, AgentId(0))
        })
        .await
    }
    
    /// GEN-002: a single traitor lieutenant cannot sway the others.
    async fn run_traitor_lieutenant(&self) -> Result<ScenarioMetrics, String> {
        let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(0))
            .map_err(setup_failed)?
            .with_strategy(self.strategy_or(TraitorStrategy::Invert));
        
        self.play(config, &[(Decision::Attack, AgentId(3))], |trace| {
            for agent in [AgentId(0), AgentId(2)] {
                let decided = trace.outcome.decision_of(agent);
                expect_decision(decided, Decision::Attack, agent)?;
            }
            Ok(())
        })
        .await
    }
    
    /// GEN-003: a traitor commander cannot split the loyal lieutenants.
    async fn run_traitor_commander(&self) -> Result<ScenarioMetrics, String> {
        let config = RoundConfig::with_traitors(4, &[AgentId(0)], AgentId(1))
            .map_err(setup_failed)?
            .with_strategy(self.strategy_or(TraitorStrategy::Equivocate));
        
        self.play(config, &[(Decision::Attack, AgentId(0))], |_| Ok(())).await
    }
    
    /// GEN-004: setup refuses n <= 3m, however the config was built.
    fn run_invalid_config(&self) -> Result<ScenarioMetrics, String> {
        let built = RoundConfig::with_traitors(4, &[AgentId(1), AgentId(2)], AgentId(0));
        if !matches!(built, Err(ConfigError::TooManyTraitors { agents: 4, traitors: 2 })) {
            return Err(format!("constructor accepted 2 traitors of 4: {:?}", built));
        }
        
        let raw = serde_json::json!({ "loyalty": [true, false, false, true], "reporter": 0 });
        let config: RoundConfig = serde_json::from_value(raw).map_err(|e| e.to_string())?;
        match SimWorld::new(config) {
            Err(GeneralsError::Configuration(ConfigError::TooManyTraitors { .. })) => {
                Ok(ScenarioMetrics {
                    agents: 4,
                    traitors: 2,
                    ..Default::default()
                })
            }
            Err(e) => Err(format!("setup failed for the wrong reason: {}", e)),
            Ok(_) => Err("setup accepted 2 traitors of 4".to_string()),
        }
    }
    
    /// GEN-005: OM(2) with both orders; the reporter sees every chain.
    async fn run_deep_recursion(&self) -> Result<ScenarioMetrics, String> {
        let config = RoundConfig::with_traitors(7, &[AgentId(2), AgentId(5)], AgentId(0))
            .map_err(setup_failed)?
            .with_strategy(self.strategy_or(TraitorStrategy::Equivocate));
        let rounds = [
            (Decision::Attack, AgentId(6)),
            (Decision::Retreat, AgentId(6)),
        ];
        
        self.play(config, &rounds, |trace| {
            let report = trace.outcome.report.as_ref().ok_or("reporter sent no report")?;
            // Chains commander -> a -> b with a, b drawn from the five others
            if report.observations.len() != 20 {
                return Err(format!(
                    "reporter saw {} base-case values, expected 20",
                    report.observations.len()
                ));
            }
            Ok(())
        })
        .await
    }
    
    /// GEN-006: OM(3) among ten generals.
    async fn run_wide_council(&self) -> Result<ScenarioMetrics, String> {
        let mut roster = self.roster();
        let strategy = self.strategy.unwrap_or_else(|| roster.pick_strategy());
        let config = roster.round_config(10, strategy).map_err(setup_failed)?;
        let commander = roster
            .pick_loyal_commander(&config)
            .ok_or("roster has no loyal general")?;
        let order = self.order.unwrap_or_else(|| roster.pick_order());
        
        debug!(traitors = ?config.traitors(), %commander, %strategy, "wide council");
        self.play(config, &[(order, commander)], |_| Ok(())).await
    }
    
    /// GEN-007: a commander that tells each lieutenant something different.
    async fn run_equivocating_commander(&self) -> Result<ScenarioMetrics, String> {
        let config = RoundConfig::with_traitors(7, &[AgentId(0), AgentId(3)], AgentId(1))
            .map_err(setup_failed)?
            .with_strategy(TraitorStrategy::Equivocate);
        let loyalty = config.clone();
        
        self.play(config, &[(Decision::Attack, AgentId(0))], |trace| {
            let loyal = trace.outcome.loyal_decisions(&loyalty);
            if loyal.len() != 5 {
                return Err(format!("{} loyal lieutenants decided, expected 5", loyal.len()));
            }
            Ok(())
        })
        .await
    }
    
    /// GEN-008: seeded traitors, then several rounds with random commanders.
    async fn run_random_roster(&self) -> Result<ScenarioMetrics, String> {
        let mut roster = self.roster();
        let strategy = self.strategy.unwrap_or_else(|| roster.pick_strategy());
        let config = roster
            .round_config(self.num_agents, strategy)
            .map_err(setup_failed)?;
        
        let rounds: Vec<(Decision, AgentId)> = (0..self.rounds)
            .map(|_| {
                let order = self.order.unwrap_or_else(|| roster.pick_order());
                (order, roster.pick_commander(self.num_agents))
            })
            .collect();
        
        debug!(
            agents = self.num_agents,
            traitors = ?config.traitors(),
            %strategy,
            rounds = rounds.len(),
            "random roster"
        );
        self.play(config, &rounds, |_| Ok(())).await
    }
    
    /// Sets up a world, plays `rounds` in order and checks each against the
    /// oracle and `check`. The world is always shut down.
    async fn play(
        &self,
        config: RoundConfig,
        rounds: &[(Decision, AgentId)],
        check: impl Fn(&RoundTrace) -> Result<(), String>,
    ) -> Result<ScenarioMetrics, String> {
        let oracle = Oracle::new(config.clone());
        let mut metrics = ScenarioMetrics {
            agents: config.agents(),
            traitors: config.traitor_count(),
            ..Default::default()
        };
        
        let mut world = SimWorld::new(config).map_err(setup_failed)?;
        world.spawn_agents();
        
        let played = async {
            for (order, commander) in rounds {
                let trace = world
                    .run_round(*order, *commander)
                    .await
                    .map_err(|e| format!("round failed: {}", e))?;
                metrics.absorb(&trace);
                
                let violations = oracle.check(&trace);
                if !violations.is_empty() {
                    for violation in &violations {
                        warn!("{}", violation);
                    }
                    let reasons: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                    return Err(format!(
                        "round {} ({} from {}): {}",
                        trace.outcome.round,
                        order,
                        commander,
                        reasons.join("; ")
                    ));
                }
                check(&trace)?;
            }
            Ok::<(), String>(())
        }
        .await;
        
        metrics.messages_received = world.stats().received;
        let shutdown = world.shutdown().await.map_err(|e| e.to_string());
        
        played?;
        shutdown?;
        Ok(metrics)
    }
}

fn setup_failed(err: impl std::fmt::Display) -> String {
    format!("setup failed: {}", err)
}

fn expect_decision(decided: Option<Decision>, expected: Decision, agent: AgentId) -> Result<(), String> {
    match decided {
        Some(decision) if decision == expected => Ok(()),
        Some(decision) => Err(format!("general {} decided {}, expected {}", agent, decision, expected)),
        None => Err(format!("general {} did not decide", agent)),
    }
}

//! Round coordinator - setup, broadcast, cleanup.
//!
//! `Generals` owns everything a round shares: the configuration, the
//! channel fabric, the start gate and the completion channel. There is no
//! process-wide state; two `Generals` never interfere.

use crate::agent_runtime::{AgentOutcome, AgentRuntime, Completion, RoundTicket};
use crate::codec;
use crate::config::{ConfigError, RoundConfig};
use crate::error::{GeneralsError, Result};
use crate::message::{Decision, Message};
use crate::report::Report;
use crate::traitor;
use generals_env::{
    completion_channel, AgentId, ChannelFabric, CompletionSender, CompletionWaiter,
    FabricStats, RoundGate, Shutdown, TokioFabric,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything observed about one finished round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub round: u64,
    pub order: Decision,
    pub commander: AgentId,
    
    /// Final OM(m) decision of every lieutenant that finished
    pub decisions: BTreeMap<AgentId, Decision>,
    
    /// Lieutenants that hit a bad message or an invariant violation
    pub failures: BTreeMap<AgentId, GeneralsError>,
    
    /// Lieutenants released by teardown
    pub aborted: Vec<AgentId>,
    
    /// The reporter's report, unless the reporter commanded the round
    pub report: Option<Report>,
}

impl RoundOutcome {
    fn collect(ticket: RoundTicket, order: Decision, completions: Vec<Completion>) -> Self {
        let mut outcome = Self {
            round: ticket.round,
            order,
            commander: ticket.commander,
            decisions: BTreeMap::new(),
            failures: BTreeMap::new(),
            aborted: Vec::new(),
            report: None,
        };
        
        for completion in completions {
            match completion.outcome {
                AgentOutcome::Decided(decision) => {
                    outcome.decisions.insert(completion.agent, decision);
                }
                AgentOutcome::Failed(err) => {
                    outcome.failures.insert(completion.agent, err);
                }
                AgentOutcome::Aborted => outcome.aborted.push(completion.agent),
            }
            if completion.report.is_some() {
                outcome.report = completion.report;
            }
        }
        outcome.aborted.sort();
        outcome
    }
    
    pub fn decision_of(&self, agent: AgentId) -> Option<Decision> {
        self.decisions.get(&agent).copied()
    }
    
    /// True if every lieutenant decided.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_empty()
    }
    
    /// Decisions of the loyal lieutenants only.
    pub fn loyal_decisions(&self, config: &RoundConfig) -> BTreeMap<AgentId, Decision> {
        self.decisions
            .iter()
            .filter(|(agent, _)| config.is_loyal(**agent))
            .map(|(agent, decision)| (*agent, *decision))
            .collect()
    }
    
    /// The value every loyal lieutenant decided, if they all agree.
    pub fn agreement(&self, config: &RoundConfig) -> Option<Decision> {
        let loyal = self.loyal_decisions(config);
        let mut values = loyal.values();
        let first = *values.next()?;
        values.all(|d| *d == first).then_some(first)
    }
}

/// A set-up group of generals.
pub struct Generals<F: ChannelFabric = TokioFabric> {
    config: Arc<RoundConfig>,
    fabric: Arc<F>,
    gate: RoundGate<RoundTicket>,
    completion_tx: CompletionSender<Completion>,
    completions: CompletionWaiter<Completion>,
    shutdown: Shutdown,
    next_round: AtomicU64,
    
    /// One flag per general, set once its runtime has been handed out
    issued: Vec<AtomicBool>,
    
    /// Serializes broadcasts: rounds never overlap
    round_lock: Mutex<()>,
}

impl Generals<TokioFabric> {
    /// Validates the configuration and allocates a fabric sized for it.
    ///
    /// Nothing is allocated if validation fails.
    pub fn setup(config: RoundConfig) -> Result<Self> {
        config.validate()?;
        let fabric = TokioFabric::new(config.agents(), &config.fabric_capacities());
        Self::setup_with_fabric(config, fabric)
    }
    
    /// Traffic counters of the round fabric.
    pub fn stats(&self) -> FabricStats {
        self.fabric.stats()
    }
}

impl<F: ChannelFabric> Generals<F> {
    /// Sets up with a caller-supplied fabric of the right shape.
    pub fn setup_with_fabric(config: RoundConfig, fabric: F) -> Result<Self> {
        config.validate()?;
        if fabric.levels() != config.levels() || fabric.agents() != config.agents() {
            return Err(ConfigError::FabricShape {
                levels: fabric.levels(),
                agents: fabric.agents(),
                expected_levels: config.levels(),
                expected_agents: config.agents(),
            }
            .into());
        }
        
        let (completion_tx, completions) = completion_channel();
        let issued = AgentId::all(config.agents()).map(|_| AtomicBool::new(false)).collect();
        debug!(
            agents = config.agents(),
            traitors = config.traitor_count(),
            reporter = %config.reporter(),
            "generals set up"
        );
        
        Ok(Self {
            config: Arc::new(config),
            fabric: Arc::new(fabric),
            gate: RoundGate::new(),
            completion_tx,
            completions,
            shutdown: Shutdown::new(),
            next_round: AtomicU64::new(1),
            issued,
            round_lock: Mutex::new(()),
        })
    }
    
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }
    
    pub fn fabric(&self) -> &Arc<F> {
        &self.fabric
    }
    
    /// Creates the event loop of one general.
    ///
    /// The runtime is subscribed to the gate on creation, so it must be
    /// created before the `broadcast` it is meant to take part in. Each
    /// general gets at most one runtime; asking again is `AgentTaken`.
    pub fn agent(&self, id: AgentId) -> Result<AgentRuntime<F>> {
        let issued = self.issued.get(id.index()).ok_or(ConfigError::UnknownAgent {
            agent: id,
            agents: self.config.agents(),
        })?;
        if issued.swap(true, Ordering::AcqRel) {
            return Err(GeneralsError::AgentTaken(id));
        }
        Ok(self.runtime(id))
    }
    
    /// Creates the event loops of every general not handed out yet,
    /// ascending.
    pub fn agents(&self) -> Vec<AgentRuntime<F>> {
        AgentId::all(self.config.agents())
            .filter(|id| !self.issued[id.index()].swap(true, Ordering::AcqRel))
            .map(|id| self.runtime(id))
            .collect()
    }
    
    fn runtime(&self, id: AgentId) -> AgentRuntime<F> {
        AgentRuntime::new(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.fabric),
            self.gate.subscribe(),
            self.completion_tx.clone(),
        )
    }
    
    /// Runs one round: `commander` orders `order`, every other general
    /// runs OM(m), and the call returns once all n-1 have finished.
    pub async fn broadcast(&self, order: Decision, commander: AgentId) -> Result<RoundOutcome> {
        self.config.check_commander(commander)?;
        let _round = self.round_lock.lock().await;
        if self.shutdown.is_triggered() {
            return Err(GeneralsError::ChannelClosed);
        }
        
        let stale = self.completions.drain().await;
        if stale > 0 {
            debug!(stale, "dropped completions of an aborted round");
        }
        let purged = self.fabric.purge().await;
        if purged > 0 {
            debug!(purged, "dropped messages left over from an earlier round");
        }
        
        let ticket = RoundTicket {
            round: self.next_round.fetch_add(1, Ordering::Relaxed),
            commander,
        };
        info!(
            round = ticket.round,
            %commander,
            %order,
            loyal = self.config.is_loyal(commander),
            "broadcast"
        );
        
        let initial = Message::order(order, commander);
        for target in AgentId::all(self.config.agents()).filter(|id| *id != commander) {
            let sent = traitor::corrupt(&initial, commander, target, &self.config);
            self.fabric.send(0, target, codec::encode(&sent)).await?;
        }
        
        self.gate.release(ticket)?;
        
        let expected = self.config.agents() - 1;
        let completions = tokio::select! {
            done = self.await_completions(ticket.round, expected) => done?,
            _ = self.shutdown.triggered() => return Err(GeneralsError::ChannelClosed),
        };
        
        let outcome = RoundOutcome::collect(ticket, order, completions);
        debug!(
            round = ticket.round,
            decided = outcome.decisions.len(),
            failed = outcome.failures.len(),
            aborted = outcome.aborted.len(),
            "round complete"
        );
        Ok(outcome)
    }
    
    /// Releases the fabric and the gate. Agents blocked anywhere in a
    /// round are woken with `ChannelClosed` and stop. Idempotent.
    pub fn cleanup(&self) {
        if self.shutdown.is_triggered() {
            return;
        }
        debug!("cleaning up generals");
        self.shutdown.trigger();
        self.fabric.close();
        self.gate.close();
    }
    
    pub fn is_cleaned_up(&self) -> bool {
        self.shutdown.is_triggered()
    }
    
    async fn await_completions(&self, round: u64, expected: usize) -> Result<Vec<Completion>> {
        let mut completions = Vec::with_capacity(expected);
        while completions.len() < expected {
            let batch = self.completions.wait_for(expected - completions.len()).await?;
            for completion in batch {
                if completion.round == round {
                    completions.push(completion);
                } else {
                    debug!(round = completion.round, agent = %completion.agent, "stale completion");
                }
            }
        }
        Ok(completions)
    }
}

impl<F: ChannelFabric> Drop for Generals<F> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Tamper, TamperingFabric};
    use crate::TraitorStrategy;
    use generals_env::WireMessage;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    
    fn spawn_all(generals: &Generals) -> Vec<JoinHandle<()>> {
        generals.agents().into_iter().map(|a| tokio::spawn(a.run())).collect()
    }
    
    async fn shutdown(generals: Generals, handles: Vec<JoinHandle<()>>) {
        generals.cleanup();
        for handle in handles {
            handle.await.unwrap();
        }
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_loyal_commander_no_traitors() {
        let config = RoundConfig::new(vec![true; 4], AgentId(0)).unwrap();
        let generals = Generals::setup(config).unwrap();
        let handles = spawn_all(&generals);
        
        let outcome = generals.broadcast(Decision::Attack, AgentId(3)).await.unwrap();
        
        assert!(outcome.is_complete());
        assert_eq!(outcome.decisions.len(), 3);
        let report = outcome.report.unwrap();
        assert_eq!(report.decision, Some(Decision::Attack));
        assert_eq!(report.values_from(AgentId(3)), vec![Decision::Attack]);
        // m = 0: only the commander's three orders travel
        assert_eq!(generals.stats().sent, 3);
        
        shutdown(generals, handles).await;
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_traitor_lieutenant_every_strategy() {
        for strategy in TraitorStrategy::all() {
            let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(0))
                .unwrap()
                .with_strategy(strategy);
            let generals = Generals::setup(config).unwrap();
            let handles = spawn_all(&generals);
            
            let outcome = generals.broadcast(Decision::Attack, AgentId(3)).await.unwrap();
            
            assert_eq!(outcome.decision_of(AgentId(0)), Some(Decision::Attack), "{}", strategy);
            assert_eq!(outcome.decision_of(AgentId(2)), Some(Decision::Attack), "{}", strategy);
            assert_eq!(outcome.agreement(generals.config()), Some(Decision::Attack));
            
            shutdown(generals, handles).await;
        }
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_traitor_commander_loyal_agree() {
        for strategy in TraitorStrategy::all() {
            let config = RoundConfig::with_traitors(4, &[AgentId(0)], AgentId(1))
                .unwrap()
                .with_strategy(strategy);
            let generals = Generals::setup(config).unwrap();
            let handles = spawn_all(&generals);
            
            let outcome = generals.broadcast(Decision::Attack, AgentId(0)).await.unwrap();
            
            assert!(outcome.is_complete());
            assert!(outcome.agreement(generals.config()).is_some(), "{}", strategy);
            
            shutdown(generals, handles).await;
        }
    }
    
    #[tokio::test]
    async fn test_setup_rejects_two_traitors_of_four() {
        let loyalty = vec![true, false, false, true];
        let err = RoundConfig::new(loyalty.clone(), AgentId(0)).unwrap_err();
        assert_eq!(err, ConfigError::TooManyTraitors { agents: 4, traitors: 2 });
        
        // A deserialized config skips `new`, setup still refuses it
        let json = serde_json::json!({ "loyalty": loyalty, "reporter": 0 });
        let config: RoundConfig = serde_json::from_value(json).unwrap();
        assert!(matches!(
            Generals::setup(config),
            Err(GeneralsError::Configuration(ConfigError::TooManyTraitors { .. }))
        ));
    }
    
    #[tokio::test]
    async fn test_fabric_shape_mismatch() {
        let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(0)).unwrap();
        let fabric = TokioFabric::uniform(1, 4, 3);
        
        assert!(matches!(
            Generals::setup_with_fabric(config, fabric),
            Err(GeneralsError::Configuration(ConfigError::FabricShape { .. }))
        ));
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_multiple_rounds_rotate_commander() {
        let config = RoundConfig::with_traitors(7, &[AgentId(1), AgentId(5)], AgentId(0))
            .unwrap()
            .with_strategy(TraitorStrategy::Equivocate);
        let generals = Generals::setup(config).unwrap();
        let handles = spawn_all(&generals);
        
        for (i, commander) in [6u32, 0, 1, 3].into_iter().enumerate() {
            let order = if i % 2 == 0 { Decision::Attack } else { Decision::Retreat };
            let outcome = generals.broadcast(order, AgentId(commander)).await.unwrap();
            
            assert_eq!(outcome.round, i as u64 + 1);
            assert!(outcome.is_complete());
            let agreed = outcome.agreement(generals.config());
            assert!(agreed.is_some());
            if generals.config().is_loyal(AgentId(commander)) {
                assert_eq!(agreed, Some(order));
            }
            // The reporter commanded round 2 and has nothing to report
            assert_eq!(outcome.report.is_some(), commander != 0);
        }
        
        shutdown(generals, handles).await;
    }
    
    #[tokio::test]
    async fn test_unknown_commander() {
        let generals = Generals::setup(RoundConfig::new(vec![true; 4], AgentId(0)).unwrap()).unwrap();
        
        let err = generals.broadcast(Decision::Attack, AgentId(4)).await.unwrap_err();
        assert!(matches!(
            err,
            GeneralsError::Configuration(ConfigError::UnknownCommander { .. })
        ));
        assert!(generals.agent(AgentId(4)).is_err());
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cleanup_mid_round_releases_everyone() {
        let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(0)).unwrap();
        let generals = Arc::new(Generals::setup(config).unwrap());
        
        // Agent 2 never runs, so agents 0 and 1 block waiting for its relay
        let mut handles = Vec::new();
        for id in [0u32, 1, 3] {
            let agent = generals.agent(AgentId(id)).unwrap();
            handles.push(tokio::spawn(agent.run()));
        }
        
        let coordinator = Arc::clone(&generals);
        let round = tokio::spawn(async move {
            coordinator.broadcast(Decision::Attack, AgentId(3)).await
        });
        
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!round.is_finished());
        generals.cleanup();
        
        assert_eq!(round.await.unwrap().unwrap_err(), GeneralsError::ChannelClosed);
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("agent leaked after cleanup")
                .unwrap();
        }
        assert!(generals.is_cleaned_up());
        assert_eq!(
            generals.broadcast(Decision::Attack, AgentId(3)).await.unwrap_err(),
            GeneralsError::ChannelClosed
        );
    }
    
    async fn broadcast_within<F: ChannelFabric>(
        generals: &Generals<F>,
        order: Decision,
        commander: AgentId,
    ) -> RoundOutcome {
        tokio::time::timeout(Duration::from_secs(5), generals.broadcast(order, commander))
            .await
            .expect("round hung")
            .unwrap()
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bad_relay_fails_only_its_receiver() {
        let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(2)).unwrap();
        let fabric = TamperingFabric::for_config(&config);
        fabric.arm(Tamper::prepend(1, AgentId(2), "X:3.0"));
        let generals = Generals::setup_with_fabric(config, fabric).unwrap();
        let handles: Vec<_> = generals.agents().into_iter().map(|a| tokio::spawn(a.run())).collect();
        
        let outcome = broadcast_within(&generals, Decision::Attack, AgentId(3)).await;
        
        assert!(matches!(
            outcome.failures.get(&AgentId(2)),
            Some(GeneralsError::MalformedMessage(_))
        ));
        assert_eq!(outcome.decision_of(AgentId(0)), Some(Decision::Attack));
        assert!(outcome.decision_of(AgentId(1)).is_some());
        assert!(outcome.aborted.is_empty());
        
        generals.cleanup();
        for handle in handles {
            handle.await.unwrap();
        }
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_round_after_failed_round_starts_clean() {
        let config = RoundConfig::with_traitors(4, &[AgentId(1)], AgentId(2)).unwrap();
        let fabric = TamperingFabric::for_config(&config);
        // Agent 0 reads garbage and the real order stays queued behind it
        fabric.arm(Tamper::prepend(0, AgentId(0), "X:3"));
        let generals = Generals::setup_with_fabric(config, fabric).unwrap();
        let handles: Vec<_> = generals.agents().into_iter().map(|a| tokio::spawn(a.run())).collect();
        
        let first = broadcast_within(&generals, Decision::Attack, AgentId(3)).await;
        assert!(first.failures.contains_key(&AgentId(0)));
        assert_eq!(first.decision_of(AgentId(2)), Some(Decision::Attack));
        
        for round in 2..=3 {
            let outcome = broadcast_within(&generals, Decision::Retreat, AgentId(3)).await;
            assert_eq!(outcome.round, round);
            assert!(outcome.is_complete());
            assert_eq!(outcome.decision_of(AgentId(0)), Some(Decision::Retreat));
            assert_eq!(outcome.agreement(generals.config()), Some(Decision::Retreat));
        }
        assert_eq!(generals.fabric().inner().stats().purged, 1);
        
        generals.cleanup();
        for handle in handles {
            handle.await.unwrap();
        }
    }
    
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_order_is_purged_before_round() {
        let config = RoundConfig::new(vec![true; 4], AgentId(2)).unwrap();
        let generals = Generals::setup(config).unwrap();
        let handles = spawn_all(&generals);
        
        generals
            .fabric()
            .send(0, AgentId(0), WireMessage::from("A:3"))
            .await
            .unwrap();
        let outcome = broadcast_within(&generals, Decision::Retreat, AgentId(3)).await;
        
        assert!(outcome.is_complete());
        assert_eq!(outcome.decision_of(AgentId(0)), Some(Decision::Retreat));
        assert_eq!(generals.stats().purged, 1);
        
        shutdown(generals, handles).await;
    }
    
    #[tokio::test]
    async fn test_each_agent_is_issued_once() {
        let generals = Generals::setup(RoundConfig::new(vec![true; 4], AgentId(0)).unwrap()).unwrap();
        
        assert!(generals.agent(AgentId(1)).is_ok());
        assert_eq!(
            generals.agent(AgentId(1)).unwrap_err(),
            GeneralsError::AgentTaken(AgentId(1))
        );
        
        let rest: Vec<_> = generals.agents().iter().map(|a| a.id()).collect();
        assert_eq!(rest, vec![AgentId(0), AgentId(2), AgentId(3)]);
        assert!(generals.agents().is_empty());
        assert!(matches!(
            generals.agent(AgentId(4)),
            Err(GeneralsError::Configuration(ConfigError::UnknownAgent { .. }))
        ));
    }
}

//! Agent Runtime - one concurrent general.
//!
//! This module drives a single general through its rounds, connecting the
//! OM engine to the round gate and the completion channel.
//!
//! # Lifecycle
//!
//! ```text
//! WaitingForBarrier --(ticket)--> WaitingForOrder --(level 0)--> Computing
//!        ^                                                          |
//!        +-------------- Idle <---- Reporting (reporter only) <-----+
//! ```
//!
//! The round's commander sits the round out and goes straight back to
//! waiting. Every other general signals completion exactly once per round,
//! whatever happens inside the round.
//!
//! # Usage
//!
//! ```ignore
//! let generals = Generals::setup(config)?;
//! for agent in generals.agents() {
//!     tokio::spawn(agent.run());
//! }
//! let outcome = generals.broadcast(Decision::Attack, AgentId(3)).await?;
//! ```

use crate::codec;
use crate::config::RoundConfig;
use crate::engine::OmEngine;
use crate::error::{GeneralsError, Result};
use crate::message::{Decision, Message};
use crate::report::Report;
use generals_env::{AgentId, ChannelFabric, CompletionSender, GateWaiter};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the coordinator hands every agent when it opens the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTicket {
    /// Round number, starting at 1
    pub round: u64,
    
    pub commander: AgentId,
}

/// How one agent's round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Decided(Decision),
    
    /// The agent finished the round but hit a bad message or an engine
    /// invariant on the way
    Failed(GeneralsError),
    
    /// The round was torn down underneath the agent
    Aborted,
}

/// Completion signal sent to the coordinator.
#[derive(Debug, Clone)]
pub struct Completion {
    pub agent: AgentId,
    pub round: u64,
    pub outcome: AgentOutcome,
    
    /// Set only by the reporter
    pub report: Option<Report>,
}

impl Completion {
    fn aborted(agent: AgentId, round: u64) -> Self {
        Self {
            agent,
            round,
            outcome: AgentOutcome::Aborted,
            report: None,
        }
    }
}

/// Where an agent is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    WaitingForBarrier,
    WaitingForOrder,
    Computing,
    Reporting,
    Idle,
    Stopped,
}

/// A general's event loop.
pub struct AgentRuntime<F: ChannelFabric> {
    id: AgentId,
    config: Arc<RoundConfig>,
    fabric: Arc<F>,
    gate: GateWaiter<RoundTicket>,
    done: CompletionSender<Completion>,
    state: AgentState,
    rounds_played: u64,
}

impl<F: ChannelFabric> std::fmt::Debug for AgentRuntime<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("rounds_played", &self.rounds_played)
            .finish_non_exhaustive()
    }
}

impl<F: ChannelFabric> AgentRuntime<F> {
    pub(crate) fn new(
        id: AgentId,
        config: Arc<RoundConfig>,
        fabric: Arc<F>,
        gate: GateWaiter<RoundTicket>,
        done: CompletionSender<Completion>,
    ) -> Self {
        Self {
            id,
            config,
            fabric,
            gate,
            done,
            state: AgentState::Idle,
            rounds_played: 0,
        }
    }
    
    pub fn id(&self) -> AgentId {
        self.id
    }
    
    pub fn state(&self) -> AgentState {
        self.state
    }
    
    /// Rounds this agent took part in as a lieutenant.
    pub fn rounds_played(&self) -> u64 {
        self.rounds_played
    }
    
    /// Runs rounds until the generals are cleaned up.
    pub async fn run(mut self) {
        debug!(agent = %self.id, "agent started");
        while self.step().await {}
        self.state = AgentState::Stopped;
        debug!(agent = %self.id, rounds = self.rounds_played, "agent stopped");
    }
    
    /// Waits for one round and plays it.
    ///
    /// Returns false once the gate or the fabric has been closed.
    pub async fn step(&mut self) -> bool {
        self.state = AgentState::WaitingForBarrier;
        let ticket = match self.gate.wait().await {
            Ok(ticket) => ticket,
            Err(_) => return false,
        };
        
        if ticket.commander == self.id {
            debug!(agent = %self.id, round = ticket.round, "commanding, sitting out");
            self.state = AgentState::Idle;
            return true;
        }
        
        let guard = self.done.guard(Completion::aborted(self.id, ticket.round));
        self.rounds_played += 1;
        
        match self.play(&ticket).await {
            Ok(played) => {
                if let Some(report) = &played.report {
                    self.state = AgentState::Reporting;
                    info!(round = ticket.round, "report\n{}", report);
                }
                self.state = AgentState::Idle;
                let outcome = match played.fault {
                    Some(fault) => {
                        error!(agent = %self.id, round = ticket.round, error = %fault, "round failed");
                        AgentOutcome::Failed(fault)
                    }
                    None => {
                        debug!(agent = %self.id, round = ticket.round, decision = %played.decision, "decided");
                        AgentOutcome::Decided(played.decision)
                    }
                };
                guard.complete(Completion {
                    agent: self.id,
                    round: ticket.round,
                    outcome,
                    report: played.report,
                });
            }
            Err(e) if e.is_aborted() => {
                warn!(agent = %self.id, round = ticket.round, "round aborted");
                self.state = AgentState::Idle;
                drop(guard);
            }
            Err(e) => {
                error!(agent = %self.id, round = ticket.round, error = %e, "round failed");
                self.state = AgentState::Idle;
                guard.complete(Completion {
                    agent: self.id,
                    round: ticket.round,
                    outcome: AgentOutcome::Failed(e),
                    report: None,
                });
            }
        }
        
        !self.fabric.is_closed()
    }
    
    /// Plays one round as a lieutenant.
    ///
    /// A bad order or relay never stops the agent from relaying: a
    /// commander's order that is unreadable counts as `Decision::TIE_BREAK`,
    /// and bad relays are dropped by the mailbox. Either way the first
    /// fault marks the round as failed for this agent once it is done.
    async fn play(&mut self, ticket: &RoundTicket) -> Result<Played> {
        self.state = AgentState::WaitingForOrder;
        let wire = self.fabric.receive(0, self.id).await?;
        let fallback = Message::order(Decision::TIE_BREAK, ticket.commander);
        
        let (order, mut fault) = match codec::decode(&wire) {
            Ok(order) if order.path() == fallback.path() => (order, None),
            Ok(order) => {
                let fault = GeneralsError::UnexpectedMessage {
                    agent: self.id,
                    level: 0,
                    path: order.path().clone(),
                };
                (fallback, Some(fault))
            }
            Err(err) => (fallback, Some(GeneralsError::from(err))),
        };
        if let Some(fault) = &fault {
            error!(agent = %self.id, round = ticket.round, error = %fault, "bad order, assuming {}", Decision::TIE_BREAK);
        }
        
        self.state = AgentState::Computing;
        let mut engine = OmEngine::new(self.id, &self.config, self.fabric.as_ref());
        let decision = engine.decide(order).await?;
        
        if engine.parked() > 0 {
            warn!(agent = %self.id, parked = engine.parked(), "messages left unread");
        }
        if fault.is_none() {
            fault = engine.faults().first().cloned();
        }
        Ok(Played {
            decision,
            report: engine.into_report(),
            fault,
        })
    }
}

struct Played {
    decision: Decision,
    report: Option<Report>,
    fault: Option<GeneralsError>,
}

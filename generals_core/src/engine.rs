//! OM(m) - the recursive Oral-Messages engine.
//!
//! Every lieutenant runs its own copy of the recursion concurrently:
//!
//! ```text
//! om(msg, k):
//!   k == 0  -> msg.value
//!   k  > 0  -> sign msg, relay it (per-target corruption) to every
//!              general not on the path, collect what each of them
//!              relayed for the same sub-round, recurse with k - 1 on
//!              each, return majority(msg.value, results...)
//! ```
//!
//! Sub-rounds are visited in ascending sender order by every agent, and an
//! agent always sends before it receives, so agents never wait on each
//! other in a cycle.

use crate::codec;
use crate::config::RoundConfig;
use crate::error::{GeneralsError, Result};
use crate::mailbox::Mailbox;
use crate::message::{Decision, Message, Path};
use crate::report::Report;
use crate::traitor;
use generals_env::{AgentId, ChannelFabric};
use std::future::Future;
use std::pin::Pin;
use tracing::trace;

/// Generals that take part in the sub-round of `path` alongside `acting`:
/// everyone not on the path, minus `acting` itself, ascending.
///
/// The same set is both the relay targets and the expected senders.
pub fn eligible(agents: usize, path: &Path, acting: AgentId) -> Vec<AgentId> {
    AgentId::all(agents)
        .filter(|id| *id != acting && !path.contains(*id))
        .collect()
}

/// Most frequent value; ties (including no votes) go to `Decision::TIE_BREAK`.
pub fn majority(votes: &[Decision]) -> Decision {
    let attack = votes.iter().filter(|v| **v == Decision::Attack).count();
    let retreat = votes.len() - attack;
    
    if attack > retreat {
        Decision::Attack
    } else if retreat > attack {
        Decision::Retreat
    } else {
        Decision::TIE_BREAK
    }
}

type OmFuture<'s> = Pin<Box<dyn Future<Output = Result<Decision>> + Send + 's>>;

/// One agent's OM computation for one round.
pub struct OmEngine<'a, F: ChannelFabric + ?Sized> {
    agent: AgentId,
    config: &'a RoundConfig,
    fabric: &'a F,
    mailbox: Mailbox,
    
    /// Present only on the reporter
    report: Option<Report>,
}

impl<'a, F: ChannelFabric + ?Sized> OmEngine<'a, F> {
    pub fn new(agent: AgentId, config: &'a RoundConfig, fabric: &'a F) -> Self {
        let report = (config.reporter() == agent).then(|| Report::new(agent));
        Self {
            agent,
            config,
            fabric,
            mailbox: Mailbox::new(agent),
            report,
        }
    }
    
    /// Runs OM(m) on the commander's order, m being the traitor count.
    pub async fn decide(&mut self, order: Message) -> Result<Decision> {
        let decision = self.om(order, self.config.depth()).await?;
        if let Some(report) = self.report.as_mut() {
            report.set_decision(decision);
        }
        Ok(decision)
    }
    
    /// The recursive step with `remaining` levels left.
    pub fn om(&mut self, message: Message, remaining: usize) -> OmFuture<'_> {
        Box::pin(async move {
            self.check_path(&message, remaining)?;
            
            if remaining == 0 {
                if let Some(report) = self.report.as_mut() {
                    report.record(&message);
                }
                return Ok(message.value());
            }
            
            let peers = eligible(self.config.agents(), message.path(), self.agent);
            let outgoing = codec::append_signer(&message, self.agent)?;
            
            for target in &peers {
                let relayed = traitor::corrupt(&outgoing, self.agent, *target, self.config);
                trace!(
                    agent = %self.agent,
                    level = remaining,
                    %target,
                    value = %relayed.value(),
                    "relay"
                );
                self.fabric
                    .send(remaining, *target, codec::encode(&relayed))
                    .await?;
            }
            
            let received = self
                .mailbox
                .collect(self.fabric, remaining, message.path(), &peers)
                .await?;
            
            let mut votes = Vec::with_capacity(received.len() + 1);
            votes.push(message.value());
            
            for (origin, sub) in received {
                let vote = self.om(sub, remaining - 1).await?;
                trace!(agent = %self.agent, level = remaining, %origin, %vote, "sub-round");
                votes.push(vote);
            }
            
            Ok(majority(&votes))
        })
    }
    
    /// Messages still parked for sub-rounds that never ran.
    pub fn parked(&self) -> usize {
        self.mailbox.parked()
    }
    
    /// Messages the mailbox dropped during the round, oldest first.
    pub fn faults(&self) -> &[GeneralsError] {
        self.mailbox.faults()
    }
    
    /// Consumes the engine, handing over the reporter's report.
    pub fn into_report(self) -> Option<Report> {
        self.report
    }
    
    /// A message entering level `remaining` carries the commander plus one
    /// relay per level already done, and never passes through us.
    fn check_path(&self, message: &Message, remaining: usize) -> Result<()> {
        let expected = self.config.depth().checked_sub(remaining).map(|done| done + 1);
        if Some(message.path().len()) != expected || message.path().contains(self.agent) {
            return Err(GeneralsError::UnexpectedMessage {
                agent: self.agent,
                level: remaining,
                path: message.path().clone(),
            });
        }
        Ok(())
    }
}

//! Per-agent demultiplexing of a shared level queue.
//!
//! Every sub-round on a level writes into the same `(level, agent)` queue,
//! but an agent works through its sub-rounds one at a time. Messages that
//! belong to a sub-round the agent has not reached yet are parked here.

use crate::codec;
use crate::error::{GeneralsError, Result};
use crate::message::{Message, Path};
use generals_env::{AgentId, ChannelFabric};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, trace};

pub struct Mailbox {
    agent: AgentId,
    
    /// Early arrivals keyed by (level, full path)
    parked: HashMap<(usize, Path), Message>,
    
    /// Messages dropped because they could not belong to this round
    faults: Vec<GeneralsError>,
}

impl Mailbox {
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            parked: HashMap::new(),
            faults: Vec::new(),
        }
    }
    
    /// Number of messages waiting for a later sub-round.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }
    
    /// Everything dropped so far, oldest first.
    pub fn faults(&self) -> &[GeneralsError] {
        &self.faults
    }
    
    /// Gathers exactly one message from every sender in `senders` for the
    /// sub-round rooted at `parent`, keyed by sender.
    ///
    /// Parked messages are served first; the fabric is only drained for
    /// what is still missing. A payload that does not decode, or that no
    /// honest sender could have produced for this round, is dropped and
    /// recorded as a fault; collection goes on with the next message.
    /// Only fabric errors end the call.
    pub async fn collect<F: ChannelFabric + ?Sized>(
        &mut self,
        fabric: &F,
        level: usize,
        parent: &Path,
        senders: &[AgentId],
    ) -> Result<BTreeMap<AgentId, Message>> {
        let mut collected = BTreeMap::new();
        
        for sender in senders {
            if let Some(path) = parent.appended(*sender) {
                if let Some(message) = self.parked.remove(&(level, path)) {
                    collected.insert(*sender, message);
                }
            }
        }
        
        while collected.len() < senders.len() {
            let wire = fabric.receive(level, self.agent).await?;
            let message = match codec::decode(&wire) {
                Ok(message) => message,
                Err(err) => {
                    self.drop_fault(level, err.into());
                    continue;
                }
            };
            let path = message.path();
            
            if path.contains(self.agent) {
                let fault = self.unexpected(level, &message);
                self.drop_fault(level, fault);
                continue;
            }
            
            if path.is_child_of(parent) {
                match message.sender() {
                    Some(sender) if senders.contains(&sender) && !collected.contains_key(&sender) => {
                        trace!(agent = %self.agent, level, %path, "collected");
                        collected.insert(sender, message);
                    }
                    _ => {
                        let fault = self.unexpected(level, &message);
                        self.drop_fault(level, fault);
                    }
                }
                continue;
            }
            
            let key = (level, path.clone());
            if self.parked.contains_key(&key) {
                let fault = self.unexpected(level, &message);
                self.drop_fault(level, fault);
                continue;
            }
            trace!(agent = %self.agent, level, %path, "parked");
            self.parked.insert(key, message);
        }
        
        Ok(collected)
    }
    
    fn drop_fault(&mut self, level: usize, fault: GeneralsError) {
        error!(agent = %self.agent, level, error = %fault, "dropping message");
        self.faults.push(fault);
    }
    
    fn unexpected(&self, level: usize, message: &Message) -> GeneralsError {
        GeneralsError::UnexpectedMessage {
            agent: self.agent,
            level,
            path: message.path().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Decision;
    use generals_env::{TokioFabric, WireMessage};
    
    fn message(value: Decision, raw: &[u32]) -> Message {
        Message::new(value, Path::from_ids(raw.iter().map(|i| AgentId(*i)).collect()).unwrap())
    }
    
    #[tokio::test]
    async fn test_parks_other_sub_rounds() {
        let fabric = TokioFabric::uniform(2, 7, 8);
        let mut mailbox = Mailbox::new(AgentId(0));
        
        // Sub-round [6, 2] arrives before sub-round [6, 1] is complete
        for m in [
            message(Decision::Attack, &[6, 2, 3]),
            message(Decision::Retreat, &[6, 1, 3]),
            message(Decision::Attack, &[6, 1, 2]),
            message(Decision::Retreat, &[6, 2, 1]),
        ] {
            fabric.send(1, AgentId(0), codec::encode(&m)).await.unwrap();
        }
        
        let parent = Path::from_ids(vec![AgentId(6), AgentId(1)]).unwrap();
        let got = mailbox
            .collect(&fabric, 1, &parent, &[AgentId(2), AgentId(3)])
            .await
            .unwrap();
        
        assert_eq!(got[&AgentId(3)].value(), Decision::Retreat);
        assert_eq!(got[&AgentId(2)].value(), Decision::Attack);
        assert_eq!(mailbox.parked(), 1);
        
        // The parked message is served without touching the fabric
        let parent = Path::from_ids(vec![AgentId(6), AgentId(2)]).unwrap();
        let got = mailbox
            .collect(&fabric, 1, &parent, &[AgentId(3)])
            .await
            .unwrap();
        assert_eq!(got[&AgentId(3)].value(), Decision::Attack);
        assert_eq!(mailbox.parked(), 0);
        assert_eq!(fabric.stats().received, 3);
    }
    
    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let fabric = TokioFabric::uniform(2, 4, 3);
        let mut mailbox = Mailbox::new(AgentId(1));
        let good = message(Decision::Retreat, &[3, 0]);
        fabric.send(1, AgentId(1), WireMessage::from("Z:0")).await.unwrap();
        fabric.send(1, AgentId(1), codec::encode(&good)).await.unwrap();
        
        let got = mailbox
            .collect(&fabric, 1, &Path::from_origin(AgentId(3)), &[AgentId(0)])
            .await
            .unwrap();
        
        assert_eq!(got[&AgentId(0)], good);
        assert_eq!(mailbox.faults().len(), 1);
        assert!(matches!(mailbox.faults()[0], GeneralsError::MalformedMessage(_)));
    }
    
    #[tokio::test]
    async fn test_unexpected_messages_are_skipped() {
        let fabric = TokioFabric::uniform(2, 4, 6);
        let mut mailbox = Mailbox::new(AgentId(1));
        let through_self = message(Decision::Attack, &[3, 1]);
        let first = message(Decision::Attack, &[3, 0]);
        let duplicate = message(Decision::Retreat, &[3, 0]);
        let last = message(Decision::Retreat, &[3, 2]);
        for m in [&through_self, &first, &duplicate, &last] {
            fabric.send(1, AgentId(1), codec::encode(m)).await.unwrap();
        }
        
        let got = mailbox
            .collect(&fabric, 1, &Path::from_origin(AgentId(3)), &[AgentId(0), AgentId(2)])
            .await
            .unwrap();
        
        assert_eq!(got[&AgentId(0)], first);
        assert_eq!(got[&AgentId(2)], last);
        assert_eq!(
            mailbox.faults(),
            &[
                GeneralsError::UnexpectedMessage {
                    agent: AgentId(1),
                    level: 1,
                    path: through_self.path().clone(),
                },
                GeneralsError::UnexpectedMessage {
                    agent: AgentId(1),
                    level: 1,
                    path: duplicate.path().clone(),
                },
            ]
        );
    }
}

//! The reporter's view of a round.

use crate::message::{Decision, Message, Path};
use generals_env::AgentId;
use serde::{Deserialize, Serialize};

/// One value the reporter took at the base case of the recursion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Full relay chain, commander first; the last entry sent it
    pub path: Path,
    
    /// Value as received
    pub value: Decision,
}

impl Observation {
    /// The general that delivered this value.
    pub fn sender(&self) -> Option<AgentId> {
        self.path.last()
    }
}

/// Report accumulated by the designated reporter during one round.
///
/// Only the reporter's own engine writes to it. It leaves the agent inside
/// the completion signal, so any reader sees it after the round is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reporter: AgentId,
    
    /// Base-case values in the order they were used
    pub observations: Vec<Observation>,
    
    /// The reporter's final OM(m) decision
    pub decision: Option<Decision>,
}

impl Report {
    pub fn new(reporter: AgentId) -> Self {
        Self {
            reporter,
            observations: Vec::new(),
            decision: None,
        }
    }
    
    /// Records a base-case message.
    pub fn record(&mut self, message: &Message) {
        self.observations.push(Observation {
            path: message.path().clone(),
            value: message.value(),
        });
    }
    
    pub fn set_decision(&mut self, decision: Decision) {
        self.decision = Some(decision);
    }
    
    /// Values delivered by one sender, in observation order.
    pub fn values_from(&self, sender: AgentId) -> Vec<Decision> {
        self.observations
            .iter()
            .filter(|o| o.sender() == Some(sender))
            .map(|o| o.value)
            .collect()
    }
    
    /// Serializes the report for export.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.decision {
            Some(decision) => writeln!(f, "general {} decided {}", self.reporter, decision)?,
            None => writeln!(f, "general {} has not decided", self.reporter)?,
        }
        for observation in &self.observations {
            writeln!(f, "  {}: {}", observation.path, observation.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn path(raw: &[u32]) -> Path {
        Path::from_ids(raw.iter().map(|i| AgentId(*i)).collect()).unwrap()
    }
    
    #[test]
    fn test_record_and_query() {
        let mut report = Report::new(AgentId(0));
        report.record(&Message::new(Decision::Attack, path(&[3, 1])));
        report.record(&Message::new(Decision::Retreat, path(&[3, 2])));
        report.record(&Message::new(Decision::Attack, path(&[3, 2, 1])));
        report.set_decision(Decision::Attack);
        
        assert_eq!(report.observations.len(), 3);
        assert_eq!(report.values_from(AgentId(1)), vec![Decision::Attack, Decision::Attack]);
        assert_eq!(report.values_from(AgentId(2)), vec![Decision::Retreat]);
        assert_eq!(report.decision, Some(Decision::Attack));
    }
    
    #[test]
    fn test_display() {
        let mut report = Report::new(AgentId(0));
        report.record(&Message::new(Decision::Retreat, path(&[3, 1])));
        report.set_decision(Decision::Attack);
        
        assert_eq!(report.to_string(), "general 0 decided Attack\n  3 -> 1: Retreat\n");
    }
    
    #[test]
    fn test_json_export() {
        let mut report = Report::new(AgentId(2));
        report.record(&Message::new(Decision::Attack, path(&[0])));
        
        let json = report.to_json().unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert!(json.contains("\"attack\""));
    }
}

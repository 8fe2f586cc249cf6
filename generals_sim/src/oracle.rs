//! Ground truth oracle for simulation.
//!
//! The Oracle knows who the traitors are and what OM(m) must guarantee.
//! After each round it checks:
//! - Every lieutenant finished with a decision
//! - Agreement: all loyal lieutenants decided the same value
//! - Validity: with a loyal commander, that value is the order
//! - Every relay path starts at the commander, has the length of its
//!   level, and never reaches a general already on it
//! - Each level carried exactly the fan-out OM(m) prescribes, and no
//!   level beyond m was used

use crate::world::RoundTrace;
use generals_core::{Decision, Path, RoundConfig};
use generals_env::AgentId;
use std::collections::BTreeMap;
use thiserror::Error;

/// A broken guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("General {agent} did not decide: {reason}")]
    Undecided { agent: AgentId, reason: String },
    
    #[error("Loyal generals disagree: {0:?}")]
    Disagreement(BTreeMap<AgentId, Decision>),
    
    #[error("Loyal commander ordered {order} but general {agent} decided {decided}")]
    Invalid {
        order: Decision,
        agent: AgentId,
        decided: Decision,
    },
    
    #[error("Undecodable message on level {level} to {to}")]
    Malformed { level: usize, to: AgentId },
    
    #[error("Path {path} on level {level} does not start at commander {commander}")]
    WrongOrigin {
        level: usize,
        path: Path,
        commander: AgentId,
    },
    
    #[error("Path {path} on level {level} has length {len}, expected {expected}")]
    PathLength {
        level: usize,
        path: Path,
        len: usize,
        expected: usize,
    },
    
    #[error("Path {path} relayed back to general {to}")]
    CycleRelay { path: Path, to: AgentId },
    
    #[error("Level {level} carried {actual} messages, expected {expected}")]
    FanOut {
        level: usize,
        actual: usize,
        expected: usize,
    },
}

/// The Oracle - checks a finished round against the OM(m) guarantees.
pub struct Oracle {
    config: RoundConfig,
}

impl Oracle {
    pub fn new(config: RoundConfig) -> Self {
        Self { config }
    }
    
    /// Returns every violation found in the round, in check order.
    pub fn check(&self, trace: &RoundTrace) -> Vec<Violation> {
        let mut violations = Vec::new();
        violations.extend(self.check_completion(trace));
        violations.extend(self.check_agreement(trace));
        violations.extend(self.check_validity(trace));
        violations.extend(self.check_paths(trace));
        violations.extend(self.check_fan_out(trace));
        violations
    }
    
    /// Path length of a message on `level`: the commander alone on level
    /// 0, then one more signer for each relay.
    pub fn path_len(&self, level: usize) -> usize {
        if level == 0 {
            1
        } else {
            (self.config.depth() + 2).saturating_sub(level)
        }
    }
    
    /// Messages a round puts on `level`.
    ///
    /// Every chain of `j` distinct lieutenants behind the commander is
    /// relayed to the `n - 1 - j` generals not on it.
    pub fn expected_fan_out(&self, level: usize) -> usize {
        if level > self.config.depth() {
            return 0;
        }
        let lieutenants = self.config.agents() - 1;
        let chain = self.path_len(level) - 1;
        if chain > lieutenants {
            return 0;
        }
        let chains: usize = (lieutenants - chain + 1..=lieutenants).product();
        chains * (lieutenants - chain)
    }
    
    fn check_completion(&self, trace: &RoundTrace) -> Vec<Violation> {
        let outcome = &trace.outcome;
        AgentId::all(self.config.agents())
            .filter(|agent| *agent != outcome.commander)
            .filter(|agent| outcome.decision_of(*agent).is_none())
            .map(|agent| {
                let reason = match outcome.failures.get(&agent) {
                    Some(err) => err.to_string(),
                    None if outcome.aborted.contains(&agent) => "aborted".to_string(),
                    None => "no completion".to_string(),
                };
                Violation::Undecided { agent, reason }
            })
            .collect()
    }
    
    fn check_agreement(&self, trace: &RoundTrace) -> Option<Violation> {
        let loyal = trace.outcome.loyal_decisions(&self.config);
        match trace.outcome.agreement(&self.config) {
            None if !loyal.is_empty() => Some(Violation::Disagreement(loyal)),
            _ => None,
        }
    }
    
    fn check_validity(&self, trace: &RoundTrace) -> Vec<Violation> {
        let outcome = &trace.outcome;
        if !self.config.is_loyal(outcome.commander) {
            return Vec::new();
        }
        outcome
            .loyal_decisions(&self.config)
            .into_iter()
            .filter(|(_, decided)| *decided != outcome.order)
            .map(|(agent, decided)| Violation::Invalid {
                order: outcome.order,
                agent,
                decided,
            })
            .collect()
    }
    
    fn check_paths(&self, trace: &RoundTrace) -> Vec<Violation> {
        let commander = trace.outcome.commander;
        let mut violations = Vec::new();
        
        for record in &trace.sends {
            let message = match &record.message {
                Some(message) => message,
                None => {
                    violations.push(Violation::Malformed {
                        level: record.level,
                        to: record.to,
                    });
                    continue;
                }
            };
            let path = message.path();
            
            if path.origin() != Some(commander) {
                violations.push(Violation::WrongOrigin {
                    level: record.level,
                    path: path.clone(),
                    commander,
                });
            }
            let expected = self.path_len(record.level);
            if path.len() != expected {
                violations.push(Violation::PathLength {
                    level: record.level,
                    path: path.clone(),
                    len: path.len(),
                    expected,
                });
            }
            if path.contains(record.to) {
                violations.push(Violation::CycleRelay {
                    path: path.clone(),
                    to: record.to,
                });
            }
        }
        violations
    }
    
    fn check_fan_out(&self, trace: &RoundTrace) -> Vec<Violation> {
        let mut per_level: BTreeMap<usize, usize> = BTreeMap::new();
        for record in &trace.sends {
            *per_level.entry(record.level).or_default() += 1;
        }
        
        let highest = per_level.keys().next_back().copied().unwrap_or(0);
        (0..=highest.max(self.config.depth()))
            .filter_map(|level| {
                let actual = per_level.get(&level).copied().unwrap_or(0);
                let expected = self.expected_fan_out(level);
                (actual != expected).then_some(Violation::FanOut {
                    level,
                    actual,
                    expected,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SentRecord;
    use generals_core::{Message, RoundOutcome};
    
    fn config(agents: usize, traitors: &[u32]) -> RoundConfig {
        let traitors: Vec<AgentId> = traitors.iter().map(|t| AgentId(*t)).collect();
        RoundConfig::with_traitors(agents, &traitors, AgentId(0)).unwrap()
    }
    
    fn outcome(commander: u32, order: Decision, decisions: &[(u32, Decision)]) -> RoundOutcome {
        RoundOutcome {
            round: 1,
            order,
            commander: AgentId(commander),
            decisions: decisions.iter().map(|(a, d)| (AgentId(*a), *d)).collect(),
            failures: BTreeMap::new(),
            aborted: Vec::new(),
            report: None,
        }
    }
    
    fn record(level: usize, to: u32, value: Decision, path: &[u32]) -> SentRecord {
        let path = Path::from_ids(path.iter().map(|p| AgentId(*p)).collect()).unwrap();
        SentRecord {
            level,
            to: AgentId(to),
            message: Some(Message::new(value, path)),
        }
    }
    
    #[test]
    fn test_expected_fan_out() {
        let oracle = Oracle::new(config(7, &[2, 5]));
        
        assert_eq!(oracle.path_len(0), 1);
        assert_eq!(oracle.path_len(2), 2);
        assert_eq!(oracle.path_len(1), 3);
        assert_eq!(oracle.expected_fan_out(0), 6);
        assert_eq!(oracle.expected_fan_out(2), 30);
        assert_eq!(oracle.expected_fan_out(1), 120);
        assert_eq!(oracle.expected_fan_out(3), 0);
    }
    
    #[test]
    fn test_clean_loyal_round() {
        use Decision::Attack;
        let oracle = Oracle::new(config(4, &[]));
        let trace = RoundTrace {
            outcome: outcome(3, Attack, &[(0, Attack), (1, Attack), (2, Attack)]),
            sends: vec![
                record(0, 0, Attack, &[3]),
                record(0, 1, Attack, &[3]),
                record(0, 2, Attack, &[3]),
            ],
        };
        
        assert!(oracle.check(&trace).is_empty());
    }
    
    #[test]
    fn test_detects_disagreement_and_invalidity() {
        use Decision::*;
        let oracle = Oracle::new(config(4, &[]));
        let trace = RoundTrace {
            outcome: outcome(3, Attack, &[(0, Attack), (1, Retreat), (2, Attack)]),
            sends: Vec::new(),
        };
        
        let violations = oracle.check(&trace);
        assert!(matches!(violations[0], Violation::Disagreement(_)));
        assert_eq!(
            violations[1],
            Violation::Invalid { order: Attack, agent: AgentId(1), decided: Retreat }
        );
        assert_eq!(
            violations[2],
            Violation::FanOut { level: 0, actual: 0, expected: 3 }
        );
    }
    
    #[test]
    fn test_detects_bad_paths() {
        use Decision::Attack;
        let oracle = Oracle::new(config(4, &[1]));
        let mut trace = RoundTrace {
            outcome: outcome(3, Attack, &[(0, Attack), (1, Attack), (2, Attack)]),
            sends: vec![
                record(1, 2, Attack, &[0, 1]),
                record(1, 1, Attack, &[3, 1]),
                record(1, 0, Attack, &[3]),
            ],
        };
        trace.sends.push(SentRecord { level: 0, to: AgentId(2), message: None });
        
        let violations = oracle.check_paths(&trace);
        assert_eq!(
            violations,
            vec![
                Violation::WrongOrigin {
                    level: 1,
                    path: Path::from_ids(vec![AgentId(0), AgentId(1)]).unwrap(),
                    commander: AgentId(3),
                },
                Violation::CycleRelay {
                    path: Path::from_ids(vec![AgentId(3), AgentId(1)]).unwrap(),
                    to: AgentId(1),
                },
                Violation::PathLength {
                    level: 1,
                    path: Path::from_origin(AgentId(3)),
                    len: 1,
                    expected: 2,
                },
                Violation::Malformed { level: 0, to: AgentId(2) },
            ]
        );
    }
    
    #[test]
    fn test_missing_lieutenant() {
        let oracle = Oracle::new(config(4, &[]));
        let mut outcome = outcome(3, Decision::Attack, &[(0, Decision::Attack)]);
        outcome.aborted.push(AgentId(2));
        let trace = RoundTrace { outcome, sends: Vec::new() };
        
        let undecided: Vec<_> = oracle
            .check_completion(&trace)
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(
            undecided,
            vec![
                "General 1 did not decide: no completion".to_string(),
                "General 2 did not decide: aborted".to_string(),
            ]
        );
    }
}

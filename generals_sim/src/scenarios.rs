//! Named rounds the harness knows how to play.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// GEN-001: No traitors, the reporter follows the order
    LoyalCommander,
    
    /// GEN-002: One lying lieutenant out of four
    TraitorLieutenant,
    
    /// GEN-003: The commander itself lies
    TraitorCommander,
    
    /// GEN-004: Too many traitors for OM(m)
    InvalidConfig,
    
    /// GEN-005: Two levels of relays
    DeepRecursion,
    
    /// GEN-006: Ten generals, three traitors
    WideCouncil,
    
    /// GEN-007: A traitor commander telling each lieutenant something else
    EquivocatingCommander,
    
    /// GEN-008: Seeded traitors, commanders and orders over several rounds
    RandomRoster,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::LoyalCommander,
            ScenarioId::TraitorLieutenant,
            ScenarioId::TraitorCommander,
            ScenarioId::InvalidConfig,
            ScenarioId::DeepRecursion,
            ScenarioId::WideCouncil,
            ScenarioId::EquivocatingCommander,
            ScenarioId::RandomRoster,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::LoyalCommander => "loyal_commander",
            ScenarioId::TraitorLieutenant => "traitor_lieutenant",
            ScenarioId::TraitorCommander => "traitor_commander",
            ScenarioId::InvalidConfig => "invalid_config",
            ScenarioId::DeepRecursion => "deep_recursion",
            ScenarioId::WideCouncil => "wide_council",
            ScenarioId::EquivocatingCommander => "equivocating_commander",
            ScenarioId::RandomRoster => "random_roster",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::LoyalCommander => "N=4, commander 3 orders attack, reporter 0 must attack",
            ScenarioId::TraitorLieutenant => "N=4, traitor 1, lieutenants 0 and 2 must follow commander 3",
            ScenarioId::TraitorCommander => "N=4, traitor commander 0, loyal lieutenants must agree",
            ScenarioId::InvalidConfig => "N=4 with 2 traitors must be refused at setup",
            ScenarioId::DeepRecursion => "N=7, m=2, both orders from loyal commander 6",
            ScenarioId::WideCouncil => "N=10, m=3, seeded traitors, loyal commander",
            ScenarioId::EquivocatingCommander => "N=7, traitors 0 and 3 equivocate, 0 commands",
            ScenarioId::RandomRoster => "Seeded roster, several rounds with rotating commanders",
        }
    }
    
    /// Returns true if the scenario draws from the seed.
    pub fn is_seeded(&self) -> bool {
        matches!(self, ScenarioId::WideCouncil | ScenarioId::RandomRoster)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loyal_commander" | "loyal" | "gen-001" => Ok(ScenarioId::LoyalCommander),
            "traitor_lieutenant" | "gen-002" => Ok(ScenarioId::TraitorLieutenant),
            "traitor_commander" | "gen-003" => Ok(ScenarioId::TraitorCommander),
            "invalid_config" | "invalid" | "gen-004" => Ok(ScenarioId::InvalidConfig),
            "deep_recursion" | "deep" | "gen-005" => Ok(ScenarioId::DeepRecursion),
            "wide_council" | "wide" | "gen-006" => Ok(ScenarioId::WideCouncil),
            "equivocating_commander" | "equivocate" | "gen-007" => Ok(ScenarioId::EquivocatingCommander),
            "random_roster" | "random" | "gen-008" => Ok(ScenarioId::RandomRoster),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

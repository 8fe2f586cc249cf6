//! Decision values, relay paths and the immutable message that carries them.

use generals_env::AgentId;
use serde::{Deserialize, Serialize};

/// The order being agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Attack,
    Retreat,
}

impl Decision {
    /// Value chosen when a majority vote is tied.
    pub const TIE_BREAK: Decision = Decision::Retreat;
    
    /// Single-character wire symbol.
    pub fn symbol(&self) -> char {
        match self {
            Decision::Attack => 'A',
            Decision::Retreat => 'R',
        }
    }
    
    /// Parses a wire symbol.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'A' => Some(Decision::Attack),
            'R' => Some(Decision::Retreat),
            _ => None,
        }
    }
    
    /// Returns the other decision.
    pub fn opposite(&self) -> Self {
        match self {
            Decision::Attack => Decision::Retreat,
            Decision::Retreat => Decision::Attack,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Attack => write!(f, "Attack"),
            Decision::Retreat => write!(f, "Retreat"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "attack" | "a" => Ok(Decision::Attack),
            "retreat" | "r" => Ok(Decision::Retreat),
            _ => Err(format!("Unknown decision: {} (expected attack or retreat)", s)),
        }
    }
}

/// Ordered record of every general that relayed a message, commander first.
///
/// A path never holds the same id twice; `appended` refuses to create one
/// that would, and neither does deserializing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<AgentId>", into = "Vec<AgentId>")]
pub struct Path(Vec<AgentId>);

impl TryFrom<Vec<AgentId>> for Path {
    type Error = String;
    
    fn try_from(ids: Vec<AgentId>) -> Result<Self, Self::Error> {
        Path::from_ids(ids).map_err(|id| format!("agent {} appears twice on path", id))
    }
}

impl From<Path> for Vec<AgentId> {
    fn from(path: Path) -> Self {
        path.0
    }
}

impl Path {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self(Vec::new())
    }
    
    /// Creates the path of a commander's initial order.
    pub fn from_origin(commander: AgentId) -> Self {
        Self(vec![commander])
    }
    
    /// Builds a path from ids, returning the first repeated id on failure.
    pub fn from_ids(ids: Vec<AgentId>) -> Result<Self, AgentId> {
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(*id);
            }
        }
        Ok(Self(ids))
    }
    
    /// Returns a copy with `agent` appended, or `None` if it is already
    /// on the path.
    pub fn appended(&self, agent: AgentId) -> Option<Path> {
        if self.contains(agent) {
            return None;
        }
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(agent);
        Some(Self(ids))
    }
    
    pub fn len(&self) -> usize {
        self.0.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    
    pub fn contains(&self, agent: AgentId) -> bool {
        self.0.contains(&agent)
    }
    
    /// The commander that originated the message.
    pub fn origin(&self) -> Option<AgentId> {
        self.0.first().copied()
    }
    
    /// The most recent relay.
    pub fn last(&self) -> Option<AgentId> {
        self.0.last().copied()
    }
    
    /// True if `self` is `parent` extended by exactly one id.
    pub fn is_child_of(&self, parent: &Path) -> bool {
        self.0.len() == parent.0.len() + 1 && self.0.starts_with(&parent.0)
    }
    
    pub fn as_slice(&self) -> &[AgentId] {
        &self.0
    }
    
    pub fn iter(&self) -> impl Iterator<Item = &AgentId> {
        self.0.iter()
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", ids.join(" -> "))
    }
}

/// A decision value together with the path it travelled.
///
/// Messages are values: every relay hop builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    value: Decision,
    path: Path,
}

impl Message {
    pub fn new(value: Decision, path: Path) -> Self {
        Self { value, path }
    }
    
    /// The commander's initial order to a lieutenant.
    pub fn order(value: Decision, commander: AgentId) -> Self {
        Self::new(value, Path::from_origin(commander))
    }
    
    pub fn value(&self) -> Decision {
        self.value
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    /// The general that relayed this message last.
    pub fn sender(&self) -> Option<AgentId> {
        self.path.last()
    }
    
    /// Returns a copy carrying a different value on the same path.
    pub fn with_value(&self, value: Decision) -> Self {
        Self {
            value,
            path: self.path.clone(),
        }
    }
}

//! Wire codec for relayed messages.
//!
//! Format: `<symbol>:<id>.<id>...`, e.g. `A:3.1.2` is "Attack", relayed by
//! commander 3, then 1, then 2. Ids are decimal with no width limit up to
//! `u32::MAX`, so the format covers any round size.

use crate::error::GeneralsError;
use crate::message::{Decision, Message, Path};
use generals_env::{AgentId, WireMessage};
use thiserror::Error;

/// Separates the decision symbol from the path.
pub const VALUE_SEPARATOR: char = ':';

/// Separates ids inside the path.
pub const PATH_DELIMITER: char = '.';

/// Reasons a wire payload is not a well-formed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    
    #[error("missing ':' separator in {0:?}")]
    MissingSeparator(String),
    
    #[error("unknown decision symbol {0:?}")]
    UnknownSymbol(String),
    
    #[error("invalid agent id {0:?}")]
    InvalidAgentId(String),
    
    #[error("agent {0} appears twice in path")]
    DuplicateAgent(AgentId),
}

/// Encodes a message into its wire form.
pub fn encode(message: &Message) -> WireMessage {
    let mut text = String::with_capacity(2 + message.path().len() * 3);
    text.push(message.value().symbol());
    text.push(VALUE_SEPARATOR);
    
    for (i, id) in message.path().iter().enumerate() {
        if i > 0 {
            text.push(PATH_DELIMITER);
        }
        text.push_str(&id.to_string());
    }
    
    WireMessage::from(text)
}

/// Decodes a wire payload back into a message.
pub fn decode(wire: &WireMessage) -> Result<Message, CodecError> {
    let text = std::str::from_utf8(wire.as_bytes()).map_err(|_| CodecError::InvalidUtf8)?;
    
    let (symbol, path) = text
        .split_once(VALUE_SEPARATOR)
        .ok_or_else(|| CodecError::MissingSeparator(text.to_string()))?;
    
    let mut chars = symbol.chars();
    let value = match (chars.next(), chars.next()) {
        (Some(c), None) => Decision::from_symbol(c),
        _ => None,
    }
    .ok_or_else(|| CodecError::UnknownSymbol(symbol.to_string()))?;
    
    let mut ids = Vec::new();
    if !path.is_empty() {
        for segment in path.split(PATH_DELIMITER) {
            ids.push(parse_agent_id(segment)?);
        }
    }
    
    let path = Path::from_ids(ids).map_err(CodecError::DuplicateAgent)?;
    Ok(Message::new(value, path))
}

/// Returns a new message with `agent` appended to the path.
///
/// The source message is left untouched. Signing a message whose path
/// already holds `agent` would create a relay cycle and is refused.
pub fn append_signer(message: &Message, agent: AgentId) -> Result<Message, GeneralsError> {
    let path = message
        .path()
        .appended(agent)
        .ok_or_else(|| GeneralsError::RelayCycle {
            agent,
            path: message.path().clone(),
        })?;
    Ok(Message::new(message.value(), path))
}

fn parse_agent_id(segment: &str) -> Result<AgentId, CodecError> {
    // u32::from_str also accepts a leading '+', which would break round trips
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidAgentId(segment.to_string()));
    }
    segment
        .parse::<u32>()
        .map(AgentId)
        .map_err(|_| CodecError::InvalidAgentId(segment.to_string()))
}

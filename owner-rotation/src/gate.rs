//! Conversation gate in front of the pipeline.
//!
//! A keyword trigger over agent-authored turns. It is spoofable and is not a security
//! boundary; it only decides whether the pipeline may be invoked.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RotationError;

const TRIGGER: &str = "verified";

/// Author of a conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    /// The automated counterpart; `assistant` is accepted as an alias.
    Agent,
    System,
    Other(String),
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "agent" | "assistant" => Role::Agent,
            "system" => Role::System,
            _ => Role::Other(raw),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".into(),
            Role::Agent => "agent".into(),
            Role::System => "system".into(),
            Role::Other(raw) => raw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Authorized,
    Unauthorized,
}

/// Authorized iff some agent turn contains "verified", case-insensitively.
pub fn evaluate(transcript: &[Turn]) -> GateDecision {
    let hit = transcript
        .iter()
        .filter(|t| t.role == Role::Agent)
        .any(|t| t.text.to_lowercase().contains(TRIGGER));
    debug!(turns = transcript.len(), authorized = hit, "evaluated gate");
    if hit {
        GateDecision::Authorized
    } else {
        GateDecision::Unauthorized
    }
}

pub fn require_verified(transcript: &[Turn]) -> Result<(), RotationError> {
    match evaluate(transcript) {
        GateDecision::Authorized => Ok(()),
        GateDecision::Unauthorized => Err(RotationError::Unauthorized),
    }
}

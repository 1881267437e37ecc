use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of an action an agent may invoke mid-reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Unique name within one agent's registry, e.g. "search_concepts".
    pub name: String,
    /// Human-readable description for the oracle.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// A request from the oracle to invoke an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ActionCall {
    /// Create a call with a generated id (used by tests and fallbacks).
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            arguments,
        }
    }
}

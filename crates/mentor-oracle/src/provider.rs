use async_trait::async_trait;
use mentor_core::{ActionCall, ActionSpec, Result, Transcript};

/// A request to the reasoning oracle.
///
/// The oracle is stateless: each request carries the system prompt, the
/// task input, the transcript accumulated so far, and the actions the
/// agent is willing to dispatch.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// System / role prompt for this agent task.
    pub system: String,
    /// The task input (question, explanation to assess, …).
    pub input: String,
    /// Action requests and observations accumulated this cycle.
    pub transcript: Transcript,
    /// Actions the oracle may request.
    pub actions: Vec<ActionSpec>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// What the oracle decided: terminal text, or a request to act.
#[derive(Debug, Clone)]
pub enum OracleReply {
    Text(String),
    Action(ActionCall),
}

impl OracleReply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OracleReply::Text(t) => Some(t),
            OracleReply::Action(_) => None,
        }
    }
}

/// Trait implemented by each reasoning-oracle backend.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable name, e.g. "openai", "mock".
    fn name(&self) -> &str;

    /// Ask for the next step: terminal text or an action request.
    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply>;
}

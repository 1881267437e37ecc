use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use mentor_config::MentorConfig;
use mentor_core::{MentorError, Result, Transcript};
use mentor_oracle::{Oracle, OracleReply, OracleRequest};
use mentor_store::{ConceptSearch, SqliteStore};

/// Everything an action handler may need beyond its oracle-supplied
/// arguments: the collaborator handles and the caller-held values of the
/// current session. This is the dependency-injection seam - storage and
/// identifiers never leak into the oracle's reasoning.
#[derive(Clone)]
pub struct ActionContext {
    pub store: Arc<SqliteStore>,
    pub search: Arc<dyn ConceptSearch>,
    pub oracle: Arc<dyn Oracle>,
    pub config: MentorConfig,

    pub tenant_id: Uuid,
    pub learner_id: Uuid,
    pub goal_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub retry_count: u32,
    pub max_retries: u32,

    /// Caller-held values (question, explanation, learner response, …)
    /// used to complete arguments the oracle omitted.
    pub seed: serde_json::Map<String, Value>,
}

impl ActionContext {
    pub fn new(
        store: Arc<SqliteStore>,
        search: Arc<dyn ConceptSearch>,
        oracle: Arc<dyn Oracle>,
        config: MentorConfig,
        tenant_id: Uuid,
        learner_id: Uuid,
        goal_id: Uuid,
    ) -> Self {
        Self {
            store,
            search,
            oracle,
            config,
            tenant_id,
            learner_id,
            goal_id,
            topic_id: None,
            retry_count: 0,
            max_retries: 3,
            seed: serde_json::Map::new(),
        }
    }

    /// Add a caller-held value used to fill omitted arguments.
    pub fn with_seed(mut self, key: &str, value: Value) -> Self {
        self.seed.insert(key.to_string(), value);
        self
    }

    /// Read a string seed value, falling back to empty.
    pub fn seed_str(&self, key: &str) -> &str {
        self.seed.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Identifier arguments are always overwritten from the context -
    /// the oracle cannot know them and must not be trusted to echo them.
    pub fn identifier_args(&self) -> Vec<(&'static str, Value)> {
        let mut args = vec![
            ("tenant_id", Value::String(self.tenant_id.to_string())),
            ("learner_id", Value::String(self.learner_id.to_string())),
            ("goal_id", Value::String(self.goal_id.to_string())),
            ("retry_count", Value::from(self.retry_count)),
            ("max_retries", Value::from(self.max_retries)),
        ];
        if let Some(topic_id) = self.topic_id {
            args.push(("topic_id", Value::String(topic_id.to_string())));
        }
        args
    }

    /// One-shot generation through the oracle with no actions offered.
    /// Used by handlers whose work is itself a text-generation task.
    pub async fn generate(&self, system: &str, input: &str) -> Result<String> {
        let request = OracleRequest {
            system: system.to_string(),
            input: input.to_string(),
            transcript: Transcript::new(),
            actions: vec![],
            temperature: self.config.oracle.temperature,
            max_tokens: self.config.oracle.max_tokens,
        };
        match self.oracle.complete(&request).await? {
            OracleReply::Text(text) => Ok(text),
            OracleReply::Action(call) => Err(MentorError::Oracle(format!(
                "expected text, oracle requested action {}",
                call.name
            ))),
        }
    }
}

/// Read a string argument, falling back to empty.
pub fn arg_str<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Read a string-array argument, falling back to empty.
pub fn arg_str_vec(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Deserialize a typed argument, falling back to default.
pub fn arg_typed<T: serde::de::DeserializeOwned + Default>(args: &Value, key: &str) -> T {
    args.get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use mentor_core::{ActionCall, ActionSpec, MentorError, Observation, Result};

use crate::context::ActionContext;

/// A capability function an agent may invoke mid-reasoning.
///
/// Errors must stay representable as text: the cycle converts a failed
/// invocation into an `Observation::Error` rather than letting it cross
/// the boundary as a fault.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn spec(&self) -> ActionSpec;

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation>;
}

/// Per-agent mapping from action name to handler, with the argument
/// completion step applied before every dispatch.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(handler.spec().name, handler);
        self
    }

    /// Specs of every registered action, for the oracle.
    pub fn specs(&self) -> Vec<ActionSpec> {
        self.handlers.values().map(|h| h.spec()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Startup validation: every action an agent's prompts advertise must
    /// be registered. A miss here is a programmer error, not a runtime
    /// condition.
    pub fn assert_covers(&self, names: &[&str]) -> Result<()> {
        for name in names {
            if !self.handlers.contains_key(*name) {
                return Err(MentorError::UnknownAction((*name).to_string()));
            }
        }
        Ok(())
    }

    /// Complete the arguments and invoke the named action.
    ///
    /// Identifier keys are overwritten from the context; caller-held seed
    /// values fill in only when the oracle omitted them.
    pub async fn dispatch(&self, call: &ActionCall, ctx: &ActionContext) -> Result<Observation> {
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| MentorError::UnknownAction(call.name.clone()))?;

        let mut args = match &call.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(MentorError::ActionFailed {
                    action: call.name.clone(),
                    reason: format!("arguments must be an object, got {other}"),
                });
            }
        };

        for (key, value) in ctx.identifier_args() {
            args.insert(key.to_string(), value);
        }
        for (key, value) in &ctx.seed {
            args.entry(key.clone()).or_insert_with(|| value.clone());
        }

        debug!(action = %call.name, "dispatching action");

        handler
            .invoke(&Value::Object(args), ctx)
            .await
            .map_err(|e| MentorError::ActionFailed {
                action: call.name.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::arg_str;
    use mentor_config::MentorConfig;
    use mentor_oracle::MockOracle;
    use mentor_store::{SqliteConceptSearch, SqliteStore};
    use serde_json::json;
    use uuid::Uuid;

    struct EchoAction;

    #[async_trait]
    impl ActionHandler for EchoAction {
        fn spec(&self) -> ActionSpec {
            ActionSpec {
                name: "echo".into(),
                description: "Echo the question back".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "question": { "type": "string" } }
                }),
            }
        }

        async fn invoke(&self, args: &Value, _ctx: &ActionContext) -> Result<Observation> {
            Ok(Observation::Followup {
                strategy: "echo".into(),
                content: format!(
                    "{}|{}",
                    arg_str(args, "question"),
                    arg_str(args, "tenant_id")
                ),
            })
        }
    }

    fn ctx() -> ActionContext {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        ActionContext::new(
            Arc::clone(&store),
            Arc::new(SqliteConceptSearch::new(store, None)),
            Arc::new(MockOracle::new()),
            MentorConfig::default(),
            Uuid::nil(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_fills_missing_args_from_seed() {
        let registry = ActionRegistry::new().register(Arc::new(EchoAction));
        let ctx = ctx().with_seed("question", json!("what is vat"));

        let obs = registry
            .dispatch(&ActionCall::new("echo", json!({})), &ctx)
            .await
            .unwrap();
        match obs {
            Observation::Followup { content, .. } => {
                assert_eq!(
                    content,
                    format!("what is vat|{}", Uuid::nil())
                );
            }
            other => panic!("unexpected observation: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_dispatch_never_lets_oracle_override_identifiers() {
        let registry = ActionRegistry::new().register(Arc::new(EchoAction));
        let ctx = ctx();

        let obs = registry
            .dispatch(
                &ActionCall::new(
                    "echo",
                    json!({"question": "q", "tenant_id": "spoofed"}),
                ),
                &ctx,
            )
            .await
            .unwrap();
        match obs {
            Observation::Followup { content, .. } => {
                assert!(content.ends_with(&Uuid::nil().to_string()));
            }
            other => panic!("unexpected observation: {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_unknown_action_errors() {
        let registry = ActionRegistry::new().register(Arc::new(EchoAction));
        let err = registry
            .dispatch(&ActionCall::new("nope", json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, MentorError::UnknownAction(_)));
    }

    #[test]
    fn test_assert_covers() {
        let registry = ActionRegistry::new().register(Arc::new(EchoAction));
        assert!(registry.assert_covers(&["echo"]).is_ok());
        assert!(registry.assert_covers(&["echo", "missing"]).is_err());
    }
}

use tracing::{debug, warn};

use mentor_core::{MentorError, Observation, Result, Transcript};
use mentor_oracle::{Oracle, OracleReply, OracleRequest};

use crate::context::ActionContext;
use crate::registry::ActionRegistry;

/// Outcome of one reasoning-action cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// The oracle's terminal text.
    pub final_text: String,
    /// Every action request and observation, in order.
    pub transcript: Transcript,
    /// Actions dispatched.
    pub steps: u32,
}

/// The generic reasoning-action loop shared by all five agents.
///
/// Repeatedly asks the oracle for the next step until it emits no action
/// request. Action invocations go through the registry's argument
/// completion; a failed or unknown invocation is appended to the
/// transcript as an `Observation::Error` - never raised - so the oracle
/// can recover or the loop can terminate normally. `max_steps` bounds the
/// loop against an oracle that never stops requesting actions.
pub async fn run_cycle(
    oracle: &dyn Oracle,
    registry: &ActionRegistry,
    ctx: &ActionContext,
    system: &str,
    input: &str,
    max_steps: u32,
) -> Result<CycleOutcome> {
    let mut transcript = Transcript::new();
    let mut steps = 0u32;

    loop {
        let request = OracleRequest {
            system: system.to_string(),
            input: input.to_string(),
            transcript: transcript.clone(),
            actions: registry.specs(),
            temperature: ctx.config.oracle.temperature,
            max_tokens: ctx.config.oracle.max_tokens,
        };

        match oracle.complete(&request).await? {
            OracleReply::Text(final_text) => {
                debug!(steps, "cycle terminated");
                return Ok(CycleOutcome {
                    final_text,
                    transcript,
                    steps,
                });
            }
            OracleReply::Action(call) => {
                if steps >= max_steps {
                    return Err(MentorError::LoopBudgetExceeded { max_steps });
                }
                steps += 1;

                let observation = match registry.dispatch(&call, ctx).await {
                    Ok(obs) => obs,
                    Err(e) => {
                        warn!(action = %call.name, error = %e, "action invocation failed");
                        Observation::Error {
                            message: e.to_string(),
                        }
                    }
                };

                debug!(action = %call.name, kind = observation.kind(), "observation recorded");
                transcript.push(call, observation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActionHandler;
    use async_trait::async_trait;
    use mentor_config::MentorConfig;
    use mentor_core::ActionSpec;
    use mentor_oracle::MockOracle;
    use mentor_store::{SqliteConceptSearch, SqliteStore};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use uuid::Uuid;

    struct AlwaysFails;

    #[async_trait]
    impl ActionHandler for AlwaysFails {
        fn spec(&self) -> ActionSpec {
            ActionSpec {
                name: "broken".into(),
                description: "Always fails".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, _args: &Value, _ctx: &ActionContext) -> mentor_core::Result<Observation> {
            Err(MentorError::ActionFailed {
                action: "broken".into(),
                reason: "backend unavailable".into(),
            })
        }
    }

    fn ctx(oracle: Arc<MockOracle>) -> ActionContext {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        ActionContext::new(
            Arc::clone(&store),
            Arc::new(SqliteConceptSearch::new(store, None)),
            oracle,
            MentorConfig::default(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_cycle_terminates_on_text() {
        let oracle = Arc::new(MockOracle::new().with_text("all done"));
        let registry = ActionRegistry::new();
        let outcome = run_cycle(oracle.as_ref(), &registry, &ctx(oracle.clone()), "sys", "in", 8)
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "all done");
        assert_eq!(outcome.steps, 0);
        assert!(outcome.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_failing_action_still_yields_transcript_entry() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_action("broken", json!({}))
                .with_text("recovered"),
        );
        let registry = ActionRegistry::new().register(Arc::new(AlwaysFails));
        let outcome = run_cycle(oracle.as_ref(), &registry, &ctx(oracle.clone()), "sys", "in", 8)
            .await
            .unwrap();

        assert_eq!(outcome.final_text, "recovered");
        assert_eq!(outcome.transcript.len(), 1);
        assert!(outcome.transcript.entries()[0].observation.is_error());
    }

    #[tokio::test]
    async fn test_unknown_action_becomes_error_observation() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_action("hallucinated", json!({}))
                .with_text("ok"),
        );
        let registry = ActionRegistry::new();
        let outcome = run_cycle(oracle.as_ref(), &registry, &ctx(oracle.clone()), "sys", "in", 8)
            .await
            .unwrap();
        assert_eq!(outcome.transcript.len(), 1);
        assert!(outcome.transcript.entries()[0].observation.is_error());
    }

    #[tokio::test]
    async fn test_step_budget_bounds_runaway_oracle() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_action("broken", json!({}))
                .with_action("broken", json!({}))
                .with_action("broken", json!({})),
        );
        let registry = ActionRegistry::new().register(Arc::new(AlwaysFails));
        let err = run_cycle(oracle.as_ref(), &registry, &ctx(oracle.clone()), "sys", "in", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, MentorError::LoopBudgetExceeded { max_steps: 2 }));
    }
}

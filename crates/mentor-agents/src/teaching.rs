//! The teaching agent: baseline evaluation, knowledge retrieval,
//! explanation generation, comprehension checks, adaptive follow-up.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use mentor_core::{
    ActionSpec, BaselineLevel, ComprehensionQuestion, Observation, Result, RetrievedConcept,
    TeachingStyle,
};

use crate::context::{ActionContext, arg_str, arg_typed};
use crate::cycle::run_cycle;
use crate::extract::{extract_optional, extract_or_default};
use crate::registry::{ActionHandler, ActionRegistry};

const BASELINE_SYSTEM: &str = "You are an experienced educator assessing a learner's baseline. \
Use the evaluate_baseline action, then summarize the result in one sentence.";

const RETRIEVE_SYSTEM: &str = "You are a knowledge retrieval assistant. \
Use the search_concepts action to find concepts related to the learner's question, \
then summarize what was found.";

const EXPLAIN_SYSTEM: &str = "You are a tutor. \
Use the generate_explanation action to produce an explanation suited to the learner's \
baseline level, then confirm completion.";

const QUESTIONS_SYSTEM: &str = "You are an education assessment expert. \
Use the generate_questions action to produce open comprehension questions about the \
explanation, then confirm completion.";

const FOLLOWUP_SYSTEM: &str = "You are a tutor adapting to a learner's partial understanding. \
Use the generate_followup action to address the recorded misunderstandings, then confirm \
completion.";

// ── Action handlers ────────────────────────────────────────────

struct EvaluateBaselineAction;

#[async_trait]
impl ActionHandler for EvaluateBaselineAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "evaluate_baseline".into(),
            description: "Classify the learner's baseline level for the topic as beginner, \
                          intermediate, or advanced."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "initial_understanding": { "type": "string" }
                },
                "required": ["question"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let question = arg_str(args, "question");
        let understanding = arg_str(args, "initial_understanding");

        let prompt = format!(
            "Question: {question}\nStated prior understanding: {}\n\n\
             Classify the learner's baseline for this topic. Reply with JSON only:\n\
             {{\"level\": \"beginner|intermediate|advanced\", \"assessment\": \"one sentence\"}}",
            if understanding.is_empty() { "(none)" } else { understanding },
        );

        let reply = ctx
            .generate("You classify learner knowledge baselines.", &prompt)
            .await?;

        // Unparseable replies fall back to intermediate rather than failing
        // the whole stage.
        let (level, assessment) = match serde_json::from_str::<Value>(reply.trim()) {
            Ok(parsed) => {
                let level = match parsed["level"].as_str().unwrap_or("intermediate") {
                    "beginner" => BaselineLevel::Beginner,
                    "advanced" => BaselineLevel::Advanced,
                    _ => BaselineLevel::Intermediate,
                };
                let assessment = parsed["assessment"].as_str().unwrap_or("").to_string();
                (level, assessment)
            }
            Err(_) => (
                BaselineLevel::Intermediate,
                "defaulted to intermediate (unparseable baseline reply)".to_string(),
            ),
        };

        Ok(Observation::Baseline { level, assessment })
    }
}

struct SearchConceptsAction;

#[async_trait]
impl ActionHandler for SearchConceptsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "search_concepts".into(),
            description: "Retrieve concepts similar to the learner's question from the \
                          knowledge base."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" }
                },
                "required": ["question"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let query = arg_str(args, "question");
        let concepts = ctx
            .search
            .search_similar(
                query,
                ctx.tenant_id,
                ctx.config.search.top_k,
                ctx.config.search.similarity_threshold,
                ctx.topic_id,
            )
            .await?;
        Ok(Observation::Concepts { concepts })
    }
}

struct GenerateExplanationAction;

fn concepts_digest(concepts: &[RetrievedConcept]) -> String {
    let mut digest = String::new();
    for (i, concept) in concepts.iter().take(3).enumerate() {
        digest.push_str(&format!("{}. {}\n", i + 1, concept.name));
        if let Some(ref explanation) = concept.explanation {
            digest.push_str(&format!("   Explanation: {explanation}\n"));
        }
        if let Some(ref formulas) = concept.formulas {
            digest.push_str(&format!("   Formulas: {formulas}\n"));
        }
        if let Some(ref rules) = concept.rules {
            digest.push_str(&format!("   Rules: {rules}\n"));
        }
    }
    digest
}

#[async_trait]
impl ActionHandler for GenerateExplanationAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "generate_explanation".into(),
            description: "Generate an explanation of the concept suited to the learner's \
                          baseline level."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "baseline_level": { "type": "string" },
                    "retrieved_concepts": { "type": "array" }
                },
                "required": ["question"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let question = arg_str(args, "question");
        let baseline = arg_str(args, "baseline_level");
        let concepts: Vec<RetrievedConcept> = arg_typed(args, "retrieved_concepts");
        let style = ctx.config.teaching.style;

        let style_instructions = match style {
            TeachingStyle::Guided => format!(
                "Write a short, Socratic explanation (at most {} characters). \
                 Guide rather than lecture, and end with one guiding question.",
                ctx.config.teaching.explanation_max_chars
            ),
            TeachingStyle::Systematic => "Write a thorough, structured explanation: define the \
                 concept, walk through how it works step by step, and close with a short summary."
                .to_string(),
        };

        let prompt = format!(
            "Question: {question}\nBaseline level: {}\n\nRelevant concepts:\n{}\n{style_instructions}",
            if baseline.is_empty() { "intermediate" } else { baseline },
            concepts_digest(&concepts),
        );

        let text = ctx.generate("You are a patient tutor.", &prompt).await?;
        Ok(Observation::Explanation { text, style })
    }
}

struct GenerateQuestionsAction;

#[async_trait]
impl ActionHandler for GenerateQuestionsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "generate_questions".into(),
            description: "Generate open comprehension-check questions for the explanation, \
                          each with expected key points."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "explanation": { "type": "string" },
                    "baseline_level": { "type": "string" }
                },
                "required": ["explanation"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let topic = arg_str(args, "question");
        let explanation = arg_str(args, "explanation");
        let count = ctx.config.teaching.num_questions.clamp(1, 5);

        let prompt = format!(
            "Explanation:\n{explanation}\n\n\
             Produce {count} open comprehension questions a learner should be able to answer \
             after reading it. Reply with a JSON array only:\n\
             [{{\"text\": \"...\", \"expected_key_points\": [\"...\"]}}]"
        );

        let reply = ctx
            .generate("You write comprehension-check questions.", &prompt)
            .await?;

        let mut questions: Vec<ComprehensionQuestion> =
            serde_json::from_str(reply.trim()).unwrap_or_default();

        if questions.is_empty() {
            // Deterministic fallback probe when the reply is unparseable.
            questions.push(ComprehensionQuestion {
                text: format!("In your own words, explain: {topic}"),
                expected_key_points: vec![],
            });
        }
        questions.truncate(count);

        Ok(Observation::Questions { questions })
    }
}

struct GenerateFollowupAction;

#[async_trait]
impl ActionHandler for GenerateFollowupAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "generate_followup".into(),
            description: "Generate a follow-up explanation targeting the learner's recorded \
                          misunderstandings."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "previous_explanation": { "type": "string" },
                    "learner_response": { "type": "string" },
                    "misunderstandings": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["previous_explanation", "learner_response"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let question = arg_str(args, "question");
        let previous = arg_str(args, "previous_explanation");
        let response = arg_str(args, "learner_response");
        let misunderstandings = crate::context::arg_str_vec(args, "misunderstandings");

        let prompt = format!(
            "Original question: {question}\nPrevious explanation:\n{previous}\n\n\
             Learner's answer:\n{response}\n\nMisunderstandings to address:\n- {}\n\n\
             Write a short follow-up that corrects these misunderstandings without repeating \
             the full explanation.",
            misunderstandings.join("\n- "),
        );

        let content = ctx.generate("You are a patient tutor.", &prompt).await?;
        Ok(Observation::Followup {
            strategy: "address_misunderstandings".into(),
            content,
        })
    }
}

// ── Agent configuration ────────────────────────────────────────

/// The teaching agent: one registry + prompt set + extractor, run through
/// the shared reasoning-action cycle.
pub struct TeachingAgent {
    registry: ActionRegistry,
}

impl TeachingAgent {
    pub fn new() -> Result<Self> {
        let registry = ActionRegistry::new()
            .register(Arc::new(EvaluateBaselineAction))
            .register(Arc::new(SearchConceptsAction))
            .register(Arc::new(GenerateExplanationAction))
            .register(Arc::new(GenerateQuestionsAction))
            .register(Arc::new(GenerateFollowupAction));
        registry.assert_covers(&[
            "evaluate_baseline",
            "search_concepts",
            "generate_explanation",
            "generate_questions",
            "generate_followup",
        ])?;
        Ok(Self { registry })
    }

    async fn run(
        &self,
        ctx: &ActionContext,
        system: &str,
        input: String,
    ) -> Result<mentor_core::Transcript> {
        let outcome = run_cycle(
            ctx.oracle.as_ref(),
            &self.registry,
            ctx,
            system,
            &input,
            ctx.config.oracle.max_steps,
        )
        .await?;
        Ok(outcome.transcript)
    }

    /// Classify the learner's baseline from their question and stated
    /// prior understanding.
    pub async fn evaluate_baseline(
        &self,
        ctx: &ActionContext,
    ) -> Result<(BaselineLevel, String)> {
        let input = format!(
            "Task: evaluate_baseline\nQuestion: {}\nInitial understanding: {}",
            ctx.seed_str("question"),
            ctx.seed_str("initial_understanding"),
        );
        let transcript = self.run(ctx, BASELINE_SYSTEM, input).await?;

        match extract_optional(&transcript, |obs| match obs {
            Observation::Baseline { level, assessment } => {
                Some((*level, assessment.clone()))
            }
            _ => None,
        }) {
            Some(result) => Ok(result),
            None => {
                warn!(task = "evaluate_baseline", "extraction mismatch, defaulting to intermediate");
                Ok((BaselineLevel::Intermediate, String::new()))
            }
        }
    }

    /// Retrieve concepts related to the question.
    pub async fn retrieve_knowledge(&self, ctx: &ActionContext) -> Result<Vec<RetrievedConcept>> {
        let input = format!(
            "Task: retrieve_knowledge\nQuestion: {}",
            ctx.seed_str("question")
        );
        let transcript = self.run(ctx, RETRIEVE_SYSTEM, input).await?;
        Ok(extract_or_default(
            &transcript,
            "retrieve_knowledge",
            "concepts",
            |obs| match obs {
                Observation::Concepts { concepts } => Some(concepts.clone()),
                _ => None,
            },
        ))
    }

    /// Generate the main explanation.
    pub async fn generate_explanation(&self, ctx: &ActionContext) -> Result<String> {
        let input = format!(
            "Task: generate_explanation\nQuestion: {}\nBaseline level: {}",
            ctx.seed_str("question"),
            ctx.seed_str("baseline_level"),
        );
        let transcript = self.run(ctx, EXPLAIN_SYSTEM, input).await?;
        Ok(extract_or_default(
            &transcript,
            "generate_explanation",
            "explanation",
            |obs| match obs {
                Observation::Explanation { text, .. } => Some(text.clone()),
                _ => None,
            },
        ))
    }

    /// Generate comprehension-check questions for the explanation.
    pub async fn generate_questions(
        &self,
        ctx: &ActionContext,
    ) -> Result<Vec<ComprehensionQuestion>> {
        let input = format!(
            "Task: generate_questions\nQuestion: {}",
            ctx.seed_str("question")
        );
        let transcript = self.run(ctx, QUESTIONS_SYSTEM, input).await?;
        Ok(extract_or_default(
            &transcript,
            "generate_questions",
            "questions",
            |obs| match obs {
                Observation::Questions { questions } => Some(questions.clone()),
                _ => None,
            },
        ))
    }

    /// Generate a follow-up for a partially understood explanation.
    pub async fn adaptive_followup(&self, ctx: &ActionContext) -> Result<String> {
        let input = format!(
            "Task: adaptive_followup\nQuestion: {}\nLearner response: {}",
            ctx.seed_str("question"),
            ctx.seed_str("learner_response"),
        );
        let transcript = self.run(ctx, FOLLOWUP_SYSTEM, input).await?;
        Ok(extract_or_default(
            &transcript,
            "adaptive_followup",
            "followup",
            |obs| match obs {
                Observation::Followup { content, .. } => Some(content.clone()),
                _ => None,
            },
        ))
    }
}

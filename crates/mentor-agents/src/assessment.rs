//! The assessment agent: classifies the learner's response against the
//! expected key points and recommends the next routing step.
//!
//! Classification is fully deterministic - identical inputs always yield
//! the identical result. The oracle only decides which action to run.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use mentor_config::schema::AssessmentConfig;
use mentor_core::{
    ActionSpec, AssessmentResult, ConfidenceLevel, NextStep, Observation, Result,
};

use crate::context::{ActionContext, arg_str, arg_str_vec};
use crate::cycle::run_cycle;
use crate::extract::{extract_optional, extract_or_default};
use crate::registry::{ActionHandler, ActionRegistry};

const ASSESS_SYSTEM: &str = "You are an education assessment expert. \
Use the assess_understanding action to classify the learner's response against the expected \
key points, then summarize the verdict.";

const NEXT_STEP_SYSTEM: &str = "You decide how a tutoring session should proceed. \
Use the decide_next_step action, then confirm the decision.";

/// Typed output of one assessment pass.
#[derive(Debug, Clone)]
pub struct AssessmentOutput {
    pub result: AssessmentResult,
    pub confidence: ConfidenceLevel,
    pub details: String,
    pub key_points_understood: Vec<String>,
    pub misunderstandings: Vec<String>,
}

// ── Deterministic heuristics ───────────────────────────────────

/// Expected key points the response actually covers (case-insensitive
/// containment in either direction).
pub fn match_key_points(response: &str, expected: &[String]) -> Vec<String> {
    let response_lower = response.to_lowercase();
    expected
        .iter()
        .filter(|point| {
            let point_lower = point.to_lowercase();
            response_lower.contains(&point_lower) || point_lower.contains(response_lower.trim())
        })
        .cloned()
        .collect()
}

/// Rule-based misunderstanding detection: too-short answers and explicit
/// negative phrasing.
pub fn find_misunderstandings(response: &str, policy: &AssessmentConfig) -> Vec<String> {
    let mut found = Vec::new();
    if response.trim().len() < policy.min_response_chars {
        found.push("response too short to judge".to_string());
    }
    let response_lower = response.to_lowercase();
    if policy
        .negative_keywords
        .iter()
        .any(|kw| response_lower.contains(kw.as_str()))
    {
        found.push("learner explicitly says they do not understand".to_string());
    }
    found
}

/// Classify understanding from coverage and misunderstanding counts.
pub fn classify_understanding(
    response: &str,
    expected: &[String],
    understood: &[String],
    misunderstandings: &[String],
    policy: &AssessmentConfig,
) -> (AssessmentResult, String) {
    // Too short to judge
    if response.trim().len() < policy.min_response_chars {
        return (
            AssessmentResult::NotUnderstood,
            "response too short to judge understanding".into(),
        );
    }

    // Explicit negative phrasing
    let response_lower = response.to_lowercase();
    if policy
        .negative_keywords
        .iter()
        .any(|kw| response_lower.contains(kw.as_str()))
    {
        return (
            AssessmentResult::NotUnderstood,
            "learner explicitly says they do not understand".into(),
        );
    }

    let coverage = if expected.is_empty() {
        // Without expectations, fall back to how much substance was given.
        (understood.len() as f64 / 3.0).min(1.0).max(
            if response.trim().len() > 50 { policy.partial_coverage } else { 0.0 },
        )
    } else {
        understood.len() as f64 / expected.len() as f64
    };

    let serious = misunderstandings.len() >= policy.serious_misunderstanding_count;

    if coverage >= policy.full_coverage && !serious {
        (
            AssessmentResult::FullyUnderstood,
            format!("covered {:.0}% of the expected key points", coverage * 100.0),
        )
    } else if coverage >= policy.partial_coverage && !serious {
        (
            AssessmentResult::PartiallyUnderstood,
            format!(
                "covered {:.0}% of the expected key points, some gaps remain",
                coverage * 100.0
            ),
        )
    } else {
        (
            AssessmentResult::NotUnderstood,
            "core concepts not yet grasped".into(),
        )
    }
}

/// Confidence from result × retry count: first-try success scores high,
/// repeated retries degrade even an eventual success.
pub fn calibrate_confidence(result: AssessmentResult, retry_count: u32) -> ConfidenceLevel {
    match result {
        AssessmentResult::FullyUnderstood => match retry_count {
            0 => ConfidenceLevel::High,
            1 => ConfidenceLevel::MediumHigh,
            _ => ConfidenceLevel::Medium,
        },
        AssessmentResult::PartiallyUnderstood => {
            if retry_count <= 1 {
                ConfidenceLevel::Medium
            } else {
                ConfidenceLevel::Low
            }
        }
        AssessmentResult::NotUnderstood => {
            if retry_count >= 2 {
                ConfidenceLevel::Low
            } else {
                ConfidenceLevel::Medium
            }
        }
    }
}

/// Routing table: fully → continue, partially → follow-up, not → retry
/// until the ceiling, then record the gap.
pub fn decide_next_step(result: AssessmentResult, retry_count: u32, max_retries: u32) -> NextStep {
    match result {
        AssessmentResult::FullyUnderstood => NextStep::Continue,
        AssessmentResult::PartiallyUnderstood => NextStep::AdaptiveFollowup,
        AssessmentResult::NotUnderstood => {
            if retry_count < max_retries {
                NextStep::Retry
            } else {
                NextStep::RecordGap
            }
        }
    }
}

// ── Action handlers ────────────────────────────────────────────

struct ExtractKeyPointsAction;

#[async_trait]
impl ActionHandler for ExtractKeyPointsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "extract_key_points".into(),
            description: "List which expected key points the learner's response covers.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "learner_response": { "type": "string" },
                    "expected_key_points": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["learner_response"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, _ctx: &ActionContext) -> Result<Observation> {
        let response = arg_str(args, "learner_response");
        let expected = arg_str_vec(args, "expected_key_points");
        Ok(Observation::KeyPoints {
            points: match_key_points(response, &expected),
        })
    }
}

struct IdentifyMisunderstandingsAction;

#[async_trait]
impl ActionHandler for IdentifyMisunderstandingsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "identify_misunderstandings".into(),
            description: "Detect signals that the learner misunderstood the explanation.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "learner_response": { "type": "string" }
                },
                "required": ["learner_response"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let response = arg_str(args, "learner_response");
        Ok(Observation::Misunderstandings {
            items: find_misunderstandings(response, &ctx.config.assessment),
        })
    }
}

struct AssessUnderstandingAction;

#[async_trait]
impl ActionHandler for AssessUnderstandingAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "assess_understanding".into(),
            description: "Classify the learner's understanding as fully, partially, or not \
                          understood, with a calibrated confidence level."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "learner_response": { "type": "string" },
                    "expected_key_points": { "type": "array", "items": { "type": "string" } },
                    "key_points_understood": { "type": "array", "items": { "type": "string" } },
                    "misunderstandings": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["learner_response"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let response = arg_str(args, "learner_response");
        let expected = arg_str_vec(args, "expected_key_points");

        // Derive understood points and misunderstandings when the oracle
        // did not carry them over from earlier observations.
        let understood = if args.get("key_points_understood").is_some() {
            arg_str_vec(args, "key_points_understood")
        } else {
            match_key_points(response, &expected)
        };
        let misunderstandings = if args.get("misunderstandings").is_some() {
            arg_str_vec(args, "misunderstandings")
        } else {
            find_misunderstandings(response, &ctx.config.assessment)
        };

        let (result, details) = classify_understanding(
            response,
            &expected,
            &understood,
            &misunderstandings,
            &ctx.config.assessment,
        );
        let confidence = calibrate_confidence(result, ctx.retry_count);

        Ok(Observation::Assessment {
            result,
            confidence,
            details,
        })
    }
}

struct DecideNextStepAction;

#[async_trait]
impl ActionHandler for DecideNextStepAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "decide_next_step".into(),
            description: "Recommend how the session should proceed after an assessment.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "assessment_result": {
                        "type": "string",
                        "enum": ["fully_understood", "partially_understood", "not_understood"]
                    }
                },
                "required": ["assessment_result"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let result = match arg_str(args, "assessment_result") {
            "fully_understood" => AssessmentResult::FullyUnderstood,
            "partially_understood" => AssessmentResult::PartiallyUnderstood,
            _ => AssessmentResult::NotUnderstood,
        };
        Ok(Observation::NextStep {
            step: decide_next_step(result, ctx.retry_count, ctx.max_retries),
        })
    }
}

// ── Agent configuration ────────────────────────────────────────

pub struct AssessmentAgent {
    registry: ActionRegistry,
}

impl AssessmentAgent {
    pub fn new() -> Result<Self> {
        let registry = ActionRegistry::new()
            .register(Arc::new(ExtractKeyPointsAction))
            .register(Arc::new(IdentifyMisunderstandingsAction))
            .register(Arc::new(AssessUnderstandingAction))
            .register(Arc::new(DecideNextStepAction));
        registry.assert_covers(&[
            "extract_key_points",
            "identify_misunderstandings",
            "assess_understanding",
            "decide_next_step",
        ])?;
        Ok(Self { registry })
    }

    /// Classify the learner's response.
    pub async fn assess_understanding(&self, ctx: &ActionContext) -> Result<AssessmentOutput> {
        let input = format!(
            "Task: assess_understanding\nLearner response: {}\nExpected key points: {}",
            ctx.seed_str("learner_response"),
            ctx.seed
                .get("expected_key_points")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "[]".into()),
        );
        let outcome = run_cycle(
            ctx.oracle.as_ref(),
            &self.registry,
            ctx,
            ASSESS_SYSTEM,
            &input,
            ctx.config.oracle.max_steps,
        )
        .await?;
        let transcript = outcome.transcript;

        let assessment = extract_optional(&transcript, |obs| match obs {
            Observation::Assessment {
                result,
                confidence,
                details,
            } => Some((*result, *confidence, details.clone())),
            _ => None,
        });

        let (result, confidence, details) = match assessment {
            Some(found) => found,
            None => {
                warn!(task = "assess_understanding", "extraction mismatch, defaulting to not understood");
                (
                    AssessmentResult::NotUnderstood,
                    calibrate_confidence(AssessmentResult::NotUnderstood, ctx.retry_count),
                    "no assessment produced".into(),
                )
            }
        };

        Ok(AssessmentOutput {
            result,
            confidence,
            details,
            key_points_understood: extract_or_default(
                &transcript,
                "assess_understanding",
                "key_points",
                |obs| match obs {
                    Observation::KeyPoints { points } => Some(points.clone()),
                    _ => None,
                },
            ),
            misunderstandings: extract_or_default(
                &transcript,
                "assess_understanding",
                "misunderstandings",
                |obs| match obs {
                    Observation::Misunderstandings { items } => Some(items.clone()),
                    _ => None,
                },
            ),
        })
    }

    /// Recommend the next routing step for an already classified result.
    pub async fn recommend_next_step(
        &self,
        ctx: &ActionContext,
        result: AssessmentResult,
    ) -> Result<NextStep> {
        let result_tag = serde_json::to_value(result)?
            .as_str()
            .unwrap_or("not_understood")
            .to_string();
        let input = format!("Task: decide_next_step\nAssessment result: {result_tag}");
        let outcome = run_cycle(
            ctx.oracle.as_ref(),
            &self.registry,
            ctx,
            NEXT_STEP_SYSTEM,
            &input,
            ctx.config.oracle.max_steps,
        )
        .await?;

        match extract_optional(&outcome.transcript, |obs| match obs {
            Observation::NextStep { step } => Some(*step),
            _ => None,
        }) {
            Some(step) => Ok(step),
            None => {
                warn!(task = "decide_next_step", "extraction mismatch, using routing table");
                Ok(decide_next_step(result, ctx.retry_count, ctx.max_retries))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AssessmentConfig {
        AssessmentConfig::default()
    }

    // ── Coverage-threshold classification ──────────────────────

    fn classify_with_coverage(understood_count: usize, expected_count: usize) -> AssessmentResult {
        let expected: Vec<String> = (0..expected_count).map(|i| format!("point {i}")).collect();
        let understood: Vec<String> = expected.iter().take(understood_count).cloned().collect();
        let (result, _) = classify_understanding(
            "a substantive answer that covers several of the expected points",
            &expected,
            &understood,
            &[],
            &policy(),
        );
        result
    }

    #[test]
    fn test_coverage_four_of_five_is_full() {
        assert_eq!(classify_with_coverage(4, 5), AssessmentResult::FullyUnderstood);
    }

    #[test]
    fn test_coverage_two_of_four_is_partial() {
        assert_eq!(classify_with_coverage(2, 4), AssessmentResult::PartiallyUnderstood);
    }

    #[test]
    fn test_coverage_one_of_five_is_not_understood() {
        assert_eq!(classify_with_coverage(1, 5), AssessmentResult::NotUnderstood);
    }

    #[test]
    fn test_short_response_is_not_understood() {
        let (result, _) = classify_understanding("idk", &[], &[], &[], &policy());
        assert_eq!(result, AssessmentResult::NotUnderstood);
    }

    #[test]
    fn test_negative_keyword_is_not_understood() {
        let (result, _) = classify_understanding(
            "honestly I don't understand any of this",
            &["the consumer pays".into()],
            &[],
            &[],
            &policy(),
        );
        assert_eq!(result, AssessmentResult::NotUnderstood);
    }

    #[test]
    fn test_serious_misunderstandings_degrade_result() {
        let expected: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        let understood = expected.clone();
        let misunderstandings = vec!["wrong sign".into(), "inverted causality".into()];
        let (result, _) = classify_understanding(
            "a long and confident but partly wrong answer to the question",
            &expected,
            &understood,
            &misunderstandings,
            &policy(),
        );
        assert_ne!(result, AssessmentResult::FullyUnderstood);
    }

    // ── Idempotence ────────────────────────────────────────────

    #[test]
    fn test_classification_is_idempotent() {
        let expected = vec!["consumption tax".into(), "paid by the consumer".into()];
        let response = "VAT is a consumption tax that is ultimately paid by the consumer.";
        let understood = match_key_points(response, &expected);
        let misunderstandings = find_misunderstandings(response, &policy());

        let first = classify_understanding(response, &expected, &understood, &misunderstandings, &policy());
        for _ in 0..10 {
            let again = classify_understanding(
                response,
                &expected,
                &understood,
                &misunderstandings,
                &policy(),
            );
            assert_eq!(first.0, again.0);
        }
    }

    // ── Confidence calibration ─────────────────────────────────

    #[test]
    fn test_confidence_degrades_with_retries() {
        use AssessmentResult::*;
        assert_eq!(calibrate_confidence(FullyUnderstood, 0), ConfidenceLevel::High);
        assert_eq!(calibrate_confidence(FullyUnderstood, 1), ConfidenceLevel::MediumHigh);
        assert_eq!(calibrate_confidence(FullyUnderstood, 2), ConfidenceLevel::Medium);
        assert_eq!(calibrate_confidence(PartiallyUnderstood, 0), ConfidenceLevel::Medium);
        assert_eq!(calibrate_confidence(PartiallyUnderstood, 2), ConfidenceLevel::Low);
        assert_eq!(calibrate_confidence(NotUnderstood, 0), ConfidenceLevel::Medium);
        assert_eq!(calibrate_confidence(NotUnderstood, 2), ConfidenceLevel::Low);
    }

    // ── Next-step routing ──────────────────────────────────────

    #[test]
    fn test_next_step_table() {
        use AssessmentResult::*;
        assert_eq!(decide_next_step(FullyUnderstood, 0, 3), NextStep::Continue);
        assert_eq!(decide_next_step(PartiallyUnderstood, 0, 3), NextStep::AdaptiveFollowup);
        assert_eq!(decide_next_step(NotUnderstood, 0, 3), NextStep::Retry);
        assert_eq!(decide_next_step(NotUnderstood, 2, 3), NextStep::Retry);
        assert_eq!(decide_next_step(NotUnderstood, 3, 3), NextStep::RecordGap);
    }

    #[test]
    fn test_match_key_points_containment() {
        let expected = vec!["consumption tax".into(), "input credit".into()];
        let matched = match_key_points("VAT is a consumption tax on goods", &expected);
        assert_eq!(matched, vec!["consumption tax".to_string()]);
    }
}

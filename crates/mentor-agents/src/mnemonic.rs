//! The mnemonic agent: analyzes a concept's surface features, picks a
//! memory strategy, generates the device, and saves it.
//!
//! Every generator has a deterministic fallback so an unparseable oracle
//! reply still produces a usable device.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tracing::warn;

use mentor_config::schema::MnemonicConfig;
use mentor_core::{
    ActionSpec, ComparisonDimension, ConceptFeatures, MnemonicDevice, MnemonicStrategy,
    Observation, Result,
};

use crate::context::{ActionContext, arg_str, arg_str_vec};
use crate::cycle::run_cycle;
use crate::extract::extract_optional;
use crate::registry::{ActionHandler, ActionRegistry};

const MNEMONIC_SYSTEM: &str = "You are a memory-strategy expert. \
Use analyze_features and select_strategy to pick a strategy for the concept, generate the \
device with the matching generate_* action, save it with save_mnemonic, then summarize.";

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern"));

// ── Feature analysis & strategy selection ──────────────────────

/// Surface features of a concept explanation.
pub fn analyze_features(explanation: &str, policy: &MnemonicConfig) -> ConceptFeatures {
    let number_mentions = NUMBER_PATTERN.find_iter(explanation).count();
    let lower = explanation.to_lowercase();
    let has_comparison = policy
        .comparison_markers
        .iter()
        .any(|marker| lower.contains(marker.as_str()));
    ConceptFeatures {
        number_mentions,
        has_comparison,
        // No numbers, no comparison, and a long explanation reads as an
        // abstract concept.
        high_abstraction: number_mentions == 0
            && !has_comparison
            && explanation.len() > policy.explanation_length_trigger,
    }
}

/// Rule-based strategy selection, best candidate first.
pub fn select_strategies(
    features: &ConceptFeatures,
    policy: &MnemonicConfig,
) -> Vec<MnemonicStrategy> {
    let mut strategies = Vec::new();
    if features.number_mentions >= policy.acronym_min_numbers {
        strategies.push(MnemonicStrategy::Acronym);
    }
    if features.has_comparison {
        strategies.push(MnemonicStrategy::ComparisonTable);
    }
    if features.high_abstraction {
        strategies.push(MnemonicStrategy::Analogy);
    }
    if strategies.is_empty() {
        strategies.push(MnemonicStrategy::Acronym);
    }
    strategies
}

// ── Deterministic fallback generators ──────────────────────────

fn fallback_acronym(terms: &[String]) -> MnemonicDevice {
    let letters: String = terms
        .iter()
        .filter_map(|t| t.chars().next())
        .collect::<String>()
        .to_uppercase();
    MnemonicDevice::Acronym {
        memory_tip: format!("Remember {letters}; each letter stands for one term"),
        explanation: format!("{letters} stands for: {}", terms.join(", ")),
        acronym: letters,
        full_terms: terms.to_vec(),
    }
}

fn fallback_comparison(items: &[String]) -> MnemonicDevice {
    MnemonicDevice::ComparisonTable {
        title: if items.len() >= 2 {
            format!("{} vs {}", items[0], items[1])
        } else {
            "Concept comparison".into()
        },
        items: items.to_vec(),
        dimensions: vec![ComparisonDimension {
            name: "Key trait".into(),
            values: items.iter().map(|i| format!("what makes {i} distinct")).collect(),
        }],
        key_differences: vec![],
    }
}

fn fallback_analogy(concept: &str) -> MnemonicDevice {
    MnemonicDevice::Analogy {
        concept: concept.to_string(),
        analogy: "an everyday process with the same structure".into(),
        mapping: vec![],
        explanation: format!("{concept} works like a familiar everyday process"),
        limitations: "the analogy simplifies; the real mechanism has more moving parts".into(),
    }
}

fn fallback_visual(concept: &str) -> MnemonicDevice {
    MnemonicDevice::Visual {
        concept: concept.to_string(),
        visual_type: "flowchart".into(),
        description: format!("picture {concept} as a left-to-right flow of steps"),
        key_elements: vec![],
        diagram: Some(format!("graph LR\n    A[start] --> B[{concept}]\n    B --> C[result]")),
    }
}

fn fallback_number_pattern(explanation: &str) -> MnemonicDevice {
    let numbers: Vec<f64> = NUMBER_PATTERN
        .find_iter(explanation)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    MnemonicDevice::NumberPattern {
        memory_phrase: numbers
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" - "),
        pattern: "the key figures in order of appearance".into(),
        numbers,
    }
}

// ── Action handlers ────────────────────────────────────────────

struct AnalyzeFeaturesAction;

#[async_trait]
impl ActionHandler for AnalyzeFeaturesAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "analyze_features".into(),
            description: "Analyze a concept explanation's surface features (numbers, \
                          comparisons, abstraction)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "explanation": { "type": "string" }
                },
                "required": ["explanation"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        Ok(Observation::ConceptFeatures {
            features: analyze_features(arg_str(args, "explanation"), &ctx.config.mnemonic),
        })
    }
}

struct SelectStrategyAction;

#[async_trait]
impl ActionHandler for SelectStrategyAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "select_strategy".into(),
            description: "Pick mnemonic strategies for the analyzed features.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "explanation": { "type": "string" }
                },
                "required": ["explanation"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let features = analyze_features(arg_str(args, "explanation"), &ctx.config.mnemonic);
        Ok(Observation::StrategyChoice {
            strategies: select_strategies(&features, &ctx.config.mnemonic),
        })
    }
}

/// Shared shape of the five generate_* handlers: ask the oracle for a
/// JSON device, fall back deterministically on parse failure.
struct GenerateDeviceAction {
    strategy: MnemonicStrategy,
}

impl GenerateDeviceAction {
    fn action_name(&self) -> &'static str {
        match self.strategy {
            MnemonicStrategy::Acronym => "generate_acronym",
            MnemonicStrategy::ComparisonTable => "generate_comparison",
            MnemonicStrategy::Analogy => "generate_analogy",
            MnemonicStrategy::Visual => "generate_visual",
            MnemonicStrategy::NumberPattern => "generate_number_pattern",
        }
    }

    fn prompt(&self, concept: &str, explanation: &str, terms: &[String]) -> String {
        let shape = match self.strategy {
            MnemonicStrategy::Acronym => {
                r#"{"strategy": "acronym", "acronym": "...", "full_terms": ["..."], "memory_tip": "...", "explanation": "..."}"#
            }
            MnemonicStrategy::ComparisonTable => {
                r#"{"strategy": "comparison_table", "title": "...", "items": ["..."], "dimensions": [{"name": "...", "values": ["..."]}], "key_differences": ["..."]}"#
            }
            MnemonicStrategy::Analogy => {
                r#"{"strategy": "analogy", "concept": "...", "analogy": "...", "mapping": [["abstract", "concrete"]], "explanation": "...", "limitations": "..."}"#
            }
            MnemonicStrategy::Visual => {
                r#"{"strategy": "visual", "concept": "...", "visual_type": "...", "description": "...", "key_elements": ["..."], "diagram": "..."}"#
            }
            MnemonicStrategy::NumberPattern => {
                r#"{"strategy": "number_pattern", "numbers": [1.0], "pattern": "...", "memory_phrase": "..."}"#
            }
        };
        format!(
            "Concept: {concept}\nKey terms: {}\nExplanation:\n{explanation}\n\n\
             Create the memory aid. Reply with JSON only, exactly this shape:\n{shape}",
            terms.join(", "),
        )
    }

    fn fallback(&self, concept: &str, explanation: &str, terms: &[String]) -> MnemonicDevice {
        match self.strategy {
            MnemonicStrategy::Acronym => fallback_acronym(terms),
            MnemonicStrategy::ComparisonTable => fallback_comparison(terms),
            MnemonicStrategy::Analogy => fallback_analogy(concept),
            MnemonicStrategy::Visual => fallback_visual(concept),
            MnemonicStrategy::NumberPattern => fallback_number_pattern(explanation),
        }
    }
}

#[async_trait]
impl ActionHandler for GenerateDeviceAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: self.action_name().into(),
            description: format!(
                "Generate a {} memory aid for the concept.",
                match self.strategy {
                    MnemonicStrategy::Acronym => "acronym",
                    MnemonicStrategy::ComparisonTable => "comparison-table",
                    MnemonicStrategy::Analogy => "analogy",
                    MnemonicStrategy::Visual => "visual",
                    MnemonicStrategy::NumberPattern => "number-pattern",
                }
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "concept_name": { "type": "string" },
                    "explanation": { "type": "string" },
                    "terms": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["concept_name"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let concept = arg_str(args, "concept_name");
        let explanation = arg_str(args, "explanation");
        let mut terms = arg_str_vec(args, "terms");
        if terms.is_empty() {
            terms = concept.split_whitespace().map(String::from).collect();
        }

        let reply = ctx
            .generate(
                "You create memorable learning aids.",
                &self.prompt(concept, explanation, &terms),
            )
            .await?;

        let device: MnemonicDevice = serde_json::from_str(reply.trim())
            .unwrap_or_else(|_| self.fallback(concept, explanation, &terms));

        Ok(Observation::Mnemonic { device })
    }
}

struct SaveMnemonicAction;

#[async_trait]
impl ActionHandler for SaveMnemonicAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "save_mnemonic".into(),
            description: "Persist a generated memory aid.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "device": { "type": "object" }
                },
                "required": ["device"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let device: MnemonicDevice = serde_json::from_value(
            args.get("device").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| mentor_core::MentorError::ActionFailed {
            action: "save_mnemonic".into(),
            reason: format!("invalid device payload: {e}"),
        })?;
        let id = ctx.store.insert_mnemonic(ctx.tenant_id, ctx.topic_id, &device)?;
        Ok(Observation::Saved { id })
    }
}

// ── Agent configuration ────────────────────────────────────────

pub struct MnemonicAgent {
    registry: ActionRegistry,
}

impl MnemonicAgent {
    pub fn new() -> Result<Self> {
        let registry = ActionRegistry::new()
            .register(Arc::new(AnalyzeFeaturesAction))
            .register(Arc::new(SelectStrategyAction))
            .register(Arc::new(GenerateDeviceAction { strategy: MnemonicStrategy::Acronym }))
            .register(Arc::new(GenerateDeviceAction {
                strategy: MnemonicStrategy::ComparisonTable,
            }))
            .register(Arc::new(GenerateDeviceAction { strategy: MnemonicStrategy::Analogy }))
            .register(Arc::new(GenerateDeviceAction { strategy: MnemonicStrategy::Visual }))
            .register(Arc::new(GenerateDeviceAction {
                strategy: MnemonicStrategy::NumberPattern,
            }))
            .register(Arc::new(SaveMnemonicAction));
        registry.assert_covers(&[
            "analyze_features",
            "select_strategy",
            "generate_acronym",
            "generate_comparison",
            "generate_analogy",
            "generate_visual",
            "generate_number_pattern",
            "save_mnemonic",
        ])?;
        Ok(Self { registry })
    }

    /// Generate (and usually save) a memory aid for the concept held in
    /// the context seed. Returns the device when one was produced.
    pub async fn generate_mnemonic(&self, ctx: &ActionContext) -> Result<Option<MnemonicDevice>> {
        let input = format!(
            "Task: generate_mnemonic\nConcept: {}\nExplanation:\n{}",
            ctx.seed_str("concept_name"),
            ctx.seed_str("explanation"),
        );
        let outcome = run_cycle(
            ctx.oracle.as_ref(),
            &self.registry,
            ctx,
            MNEMONIC_SYSTEM,
            &input,
            ctx.config.oracle.max_steps,
        )
        .await?;

        let device = extract_optional(&outcome.transcript, |obs| match obs {
            Observation::Mnemonic { device } => Some(device.clone()),
            _ => None,
        });
        if device.is_none() {
            warn!(task = "generate_mnemonic", "no device produced");
        }
        Ok(device)
    }
}

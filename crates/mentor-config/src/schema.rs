use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use mentor_core::TeachingStyle;

/// Root configuration - maps to `mentor.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MentorConfig {
    pub oracle: OracleConfig,
    pub teaching: TeachingConfig,
    pub assessment: AssessmentConfig,
    pub validation: ValidationConfig,
    pub mnemonic: MnemonicConfig,
    pub review: ReviewConfig,
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

// ── Oracle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Model identifier sent to the provider, e.g. "gpt-4o-mini".
    pub model: String,
    /// Base URL for an OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key. Falls back to the OPENAI_API_KEY env var when unset.
    pub api_key: Option<String>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens per reply.
    pub max_tokens: u32,
    /// Maximum reasoning-action steps per agent invocation before the
    /// cycle fails with LoopBudgetExceeded.
    pub max_steps: u32,
    /// Per-call deadline in seconds. 0 disables the deadline.
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 1024,
            max_steps: 8,
            request_timeout_secs: 60,
        }
    }
}

// ── Teaching ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeachingConfig {
    /// Explanation shape: guided (short, Socratic) or systematic
    /// (long, structured).
    pub style: TeachingStyle,
    /// Soft character budget for a guided explanation.
    pub explanation_max_chars: usize,
    /// Comprehension probes per check (1-5).
    pub num_questions: usize,
    /// How many times a not-understood result may re-enter explanation
    /// before the session records a knowledge gap.
    pub max_retries: u32,
}

impl Default for TeachingConfig {
    fn default() -> Self {
        Self {
            style: TeachingStyle::Guided,
            explanation_max_chars: 800,
            num_questions: 2,
            max_retries: 3,
        }
    }
}

// ── Assessment ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Responses shorter than this are classified not-understood outright.
    pub min_response_chars: usize,
    /// Phrases that signal the learner explicitly does not understand.
    pub negative_keywords: Vec<String>,
    /// Coverage ratio at or above which understanding is full.
    pub full_coverage: f64,
    /// Coverage ratio at or above which understanding is partial.
    pub partial_coverage: f64,
    /// This many recorded misunderstandings degrade the result band.
    pub serious_misunderstanding_count: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            min_response_chars: 10,
            negative_keywords: vec![
                "don't understand".into(),
                "do not understand".into(),
                "don't know".into(),
                "no idea".into(),
                "i'm lost".into(),
                "makes no sense".into(),
                "not clear".into(),
            ],
            full_coverage: 0.8,
            partial_coverage: 0.5,
            serious_misunderstanding_count: 2,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Suppress content validation entirely.
    pub skip: bool,
    /// Keywords that mark an explanation as regulatory/factual.
    pub trigger_keywords: Vec<String>,
    /// Phrases in the opening segment that mark a pure conceptual
    /// explanation, exempt from validation when at most
    /// `conceptual_max_items` items were flagged.
    pub conceptual_openers: Vec<String>,
    pub conceptual_max_items: usize,
    /// Minimum trust score for authority sources used in verdicts.
    pub min_trust_score: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            skip: false,
            trigger_keywords: vec![
                "formula".into(),
                "law".into(),
                "tax".into(),
                "regulation".into(),
                "section".into(),
                "clause".into(),
                "threshold".into(),
                "limit".into(),
                "%".into(),
            ],
            conceptual_openers: vec![
                "concept".into(),
                "definition".into(),
                "understanding".into(),
                "analogy".into(),
                "example".into(),
                "measures".into(),
                "refers to".into(),
            ],
            conceptual_max_items: 1,
            min_trust_score: 0.6,
        }
    }
}

// ── Mnemonic ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MnemonicConfig {
    /// Suppress mnemonic generation entirely.
    pub skip: bool,
    /// Explanations longer than this trigger a mnemonic even when the
    /// learner has not yet failed a check.
    pub explanation_length_trigger: usize,
    /// Number mentions at or above this pick the acronym strategy.
    pub acronym_min_numbers: usize,
    /// Phrases that signal comparison language.
    pub comparison_markers: Vec<String>,
}

impl Default for MnemonicConfig {
    fn default() -> Self {
        Self {
            skip: false,
            explanation_length_trigger: 300,
            acronym_min_numbers: 3,
            comparison_markers: vec![
                "versus".into(),
                " vs ".into(),
                "compared to".into(),
                "difference between".into(),
                "in contrast".into(),
            ],
        }
    }
}

// ── Review ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Minimum days since last review before a topic is due, keyed by
    /// confidence level.
    pub interval_days_low: i64,
    pub interval_days_medium: i64,
    pub interval_days_medium_high: i64,
    pub interval_days_high: i64,
    /// Maximum reminders returned per request.
    pub max_reminders: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            interval_days_low: 1,
            interval_days_medium: 2,
            interval_days_medium_high: 3,
            interval_days_high: 7,
            max_reminders: 5,
        }
    }
}

impl ReviewConfig {
    pub fn interval_for(&self, confidence: mentor_core::ConfidenceLevel) -> i64 {
        use mentor_core::ConfidenceLevel::*;
        match confidence {
            Low => self.interval_days_low,
            Medium => self.interval_days_medium,
            MediumHigh => self.interval_days_medium_high,
            High => self.interval_days_high,
        }
    }
}

// ── Search ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Concepts returned per retrieval.
    pub top_k: usize,
    /// Minimum similarity for a concept to be returned.
    pub similarity_threshold: f32,
    /// Embedding model for vector search. Unset = keyword fallback only.
    pub embedding_model: Option<String>,
    pub embedding_dims: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.7,
            embedding_model: None,
            embedding_dims: 1536,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".mentor")
                .join("mentor.db"),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

impl MentorConfig {
    /// Validate the configuration. Returns non-fatal warnings on success,
    /// an error description for hard failures.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(format!(
                "oracle.temperature: must be in [0.0, 2.0], got {}",
                self.oracle.temperature
            ));
        }
        if self.oracle.max_steps == 0 {
            return Err("oracle.max_steps: must be at least 1".into());
        }
        if !(1..=5).contains(&self.teaching.num_questions) {
            return Err(format!(
                "teaching.num_questions: must be in 1..=5, got {}",
                self.teaching.num_questions
            ));
        }
        if self.teaching.max_retries == 0 {
            return Err("teaching.max_retries: must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.assessment.full_coverage)
            || !(0.0..=1.0).contains(&self.assessment.partial_coverage)
        {
            return Err("assessment coverage thresholds must be in [0.0, 1.0]".into());
        }
        if self.assessment.partial_coverage > self.assessment.full_coverage {
            return Err(format!(
                "assessment.partial_coverage ({}) exceeds full_coverage ({})",
                self.assessment.partial_coverage, self.assessment.full_coverage
            ));
        }
        if !(0.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err("search.similarity_threshold must be in [0.0, 1.0]".into());
        }

        if self.oracle.api_key.is_none() {
            warnings.push(
                "oracle.api_key not set and OPENAI_API_KEY absent - live oracle calls will fail"
                    .into(),
            );
        }
        if self.oracle.request_timeout_secs == 0 {
            warnings.push("oracle.request_timeout_secs = 0 - a hung oracle will block the session".into());
        }

        Ok(warnings)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse classification of what the learner's input is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Learn,
    Practice,
    Progress,
    Review,
    Other,
}

impl Intent {
    /// Parse an oracle reply into an intent. Anything unrecognized maps to
    /// `Learn` - the workflow's fallback path.
    pub fn parse_or_learn(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "learn" => Intent::Learn,
            "practice" => Intent::Practice,
            "progress" => Intent::Progress,
            "review" => Intent::Review,
            _ => Intent::Learn,
        }
    }
}

/// The learner's knowledge baseline for the current topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// How explanations are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingStyle {
    /// Short, Socratic, question-led.
    Guided,
    /// Longer, structured, step-by-step.
    Systematic,
}

/// Three-way outcome of assessing the learner's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentResult {
    FullyUnderstood,
    PartiallyUnderstood,
    NotUnderstood,
}

/// Calibrated confidence in the learner's grasp of the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    MediumHigh,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::MediumHigh => "medium_high",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn from_str_or_medium(raw: &str) -> Self {
        match raw {
            "low" => ConfidenceLevel::Low,
            "medium_high" => ConfidenceLevel::MediumHigh,
            "high" => ConfidenceLevel::High,
            _ => ConfidenceLevel::Medium,
        }
    }
}

/// Recommended routing after an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Continue,
    AdaptiveFollowup,
    Retry,
    RecordGap,
}

/// Where a session currently is in the workflow. A closed enum so that
/// transitions are exhaustively checkable, never free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialized,
    IntentDetected,
    BaselineEvaluated,
    KnowledgeRetrieved,
    ExplanationGenerated,
    ContentValidated,
    ValidationSkipped,
    MnemonicGenerated,
    MnemonicSkipped,
    CheckCreated,
    AwaitingResponse,
    UnderstandingAssessed,
    FollowupGenerated,
    ProgressUpdated,
    GapRecorded,
    ProgressOverview,
    ReviewRecommended,
    AssessmentCompleted,
    Finalized,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Initialized => "initialized",
            Stage::IntentDetected => "intent_detected",
            Stage::BaselineEvaluated => "baseline_evaluated",
            Stage::KnowledgeRetrieved => "knowledge_retrieved",
            Stage::ExplanationGenerated => "explanation_generated",
            Stage::ContentValidated => "content_validated",
            Stage::ValidationSkipped => "validation_skipped",
            Stage::MnemonicGenerated => "mnemonic_generated",
            Stage::MnemonicSkipped => "mnemonic_skipped",
            Stage::CheckCreated => "check_created",
            Stage::AwaitingResponse => "awaiting_response",
            Stage::UnderstandingAssessed => "understanding_assessed",
            Stage::FollowupGenerated => "followup_generated",
            Stage::ProgressUpdated => "progress_updated",
            Stage::GapRecorded => "gap_recorded",
            Stage::ProgressOverview => "progress_overview",
            Stage::ReviewRecommended => "review_recommended",
            Stage::AssessmentCompleted => "assessment_completed",
            Stage::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// A concept returned by the similarity search collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedConcept {
    pub concept_id: Uuid,
    pub name: String,
    pub explanation: Option<String>,
    pub formulas: Option<String>,
    pub rules: Option<String>,
    /// Similarity score in [0, 1].
    pub similarity: f32,
}

/// One comprehension probe generated after an explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensionQuestion {
    pub text: String,
    #[serde(default)]
    pub expected_key_points: Vec<String>,
}

/// A reference used to back a validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// A curated source of record for a knowledge domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoritySource {
    pub name: String,
    pub base_url: String,
    /// Trust score in [0, 1].
    pub trust_score: f64,
    #[serde(default)]
    pub domain_tags: Vec<String>,
}

/// Outcome of validating an explanation against sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub verified: bool,
    /// Confidence in the verdict, in [0, 1].
    pub confidence_score: f64,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// Which mnemonic strategy to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MnemonicStrategy {
    Acronym,
    ComparisonTable,
    Analogy,
    Visual,
    NumberPattern,
}

/// One column of a comparison-table mnemonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonDimension {
    pub name: String,
    pub values: Vec<String>,
}

/// A generated memory aid. Tagged by strategy so downstream code matches
/// on the discriminant instead of probing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MnemonicDevice {
    Acronym {
        acronym: String,
        full_terms: Vec<String>,
        memory_tip: String,
        explanation: String,
    },
    ComparisonTable {
        title: String,
        items: Vec<String>,
        dimensions: Vec<ComparisonDimension>,
        key_differences: Vec<String>,
    },
    Analogy {
        concept: String,
        analogy: String,
        mapping: Vec<(String, String)>,
        explanation: String,
        limitations: String,
    },
    Visual {
        concept: String,
        visual_type: String,
        description: String,
        key_elements: Vec<String>,
        diagram: Option<String>,
    },
    NumberPattern {
        numbers: Vec<f64>,
        pattern: String,
        memory_phrase: String,
    },
}

impl MnemonicDevice {
    pub fn strategy(&self) -> MnemonicStrategy {
        match self {
            MnemonicDevice::Acronym { .. } => MnemonicStrategy::Acronym,
            MnemonicDevice::ComparisonTable { .. } => MnemonicStrategy::ComparisonTable,
            MnemonicDevice::Analogy { .. } => MnemonicStrategy::Analogy,
            MnemonicDevice::Visual { .. } => MnemonicStrategy::Visual,
            MnemonicDevice::NumberPattern { .. } => MnemonicStrategy::NumberPattern,
        }
    }
}

/// Severity of a recorded knowledge gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
}

/// An unresolved misunderstanding recorded after retry exhaustion.
/// Value object - it has no durable identity until the store persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub topic_id: Option<Uuid>,
    pub description: String,
    pub severity: GapSeverity,
    pub retry_count: u32,
}

/// A learner's recorded mastery of one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub topic_id: Uuid,
    pub confidence: ConfidenceLevel,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

/// A topic due for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReminder {
    pub topic_id: Uuid,
    pub days_since_review: i64,
    pub urgency: f64,
}

/// A suggested next topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSuggestion {
    pub topic_id: Uuid,
    pub name: String,
    pub score: f64,
}

/// Aggregated learning-efficiency figures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub total_mastered: usize,
    pub open_gaps: usize,
    pub average_mastery_days: f64,
    pub pace: String,
}

/// Surface features of a concept, used to pick a mnemonic strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptFeatures {
    pub number_mentions: usize,
    pub has_comparison: bool,
    pub high_abstraction: bool,
}

/// The mutable record describing one tutoring interaction's progress.
///
/// Exclusively owned by a single orchestration run; mutated only by the
/// stage currently executing; never shared across concurrent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    // ── Identifiers ────────────────────────────────────────────
    pub session_id: Uuid,
    pub learner_id: Uuid,
    pub goal_id: Uuid,
    pub tenant_id: Uuid,
    pub topic_id: Option<Uuid>,

    // ── Interaction context ────────────────────────────────────
    pub question_text: String,
    pub initial_understanding: Option<String>,
    pub intent: Option<Intent>,

    // ── Baseline evaluation ────────────────────────────────────
    pub baseline_level: Option<BaselineLevel>,
    pub baseline_assessment: Option<String>,

    // ── Knowledge retrieval ────────────────────────────────────
    #[serde(default)]
    pub retrieved_concepts: Vec<RetrievedConcept>,
    /// Hint from retrieval: a concept carried formulas or rules.
    #[serde(default)]
    pub needs_validation: bool,

    // ── Teaching output ────────────────────────────────────────
    pub explanation: Option<String>,
    #[serde(default)]
    pub comprehension_questions: Vec<ComprehensionQuestion>,

    // ── Validation ─────────────────────────────────────────────
    #[serde(default)]
    pub skip_validation: bool,
    pub validation: Option<ValidationOutcome>,

    // ── Mnemonic ───────────────────────────────────────────────
    #[serde(default)]
    pub skip_mnemonic: bool,
    pub mnemonic_device: Option<MnemonicDevice>,

    // ── Assessment ─────────────────────────────────────────────
    pub learner_response: Option<String>,
    pub assessment_result: Option<AssessmentResult>,
    pub assessment_details: Option<String>,
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(default)]
    pub key_points_understood: Vec<String>,
    #[serde(default)]
    pub misunderstandings: Vec<String>,
    pub next_step: Option<NextStep>,

    // ── Flow control ───────────────────────────────────────────
    pub retry_count: u32,
    pub max_retries: u32,

    // ── Progress / review outputs ──────────────────────────────
    #[serde(default)]
    pub knowledge_gaps: Vec<KnowledgeGap>,
    #[serde(default)]
    pub review_reminders: Vec<ReviewReminder>,
    #[serde(default)]
    pub suggested_topics: Vec<TopicSuggestion>,
    pub efficiency: Option<EfficiencyMetrics>,

    // ── Metadata ───────────────────────────────────────────────
    pub stage: Stage,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// Create the initial state for a new tutoring session.
    pub fn new(
        learner_id: Uuid,
        goal_id: Uuid,
        tenant_id: Uuid,
        question_text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            learner_id,
            goal_id,
            tenant_id,
            topic_id: None,
            question_text: question_text.into(),
            initial_understanding: None,
            intent: None,
            baseline_level: None,
            baseline_assessment: None,
            retrieved_concepts: Vec::new(),
            needs_validation: false,
            explanation: None,
            comprehension_questions: Vec::new(),
            skip_validation: false,
            validation: None,
            skip_mnemonic: false,
            mnemonic_device: None,
            learner_response: None,
            assessment_result: None,
            assessment_details: None,
            confidence_level: None,
            key_points_understood: Vec::new(),
            misunderstandings: Vec::new(),
            next_step: None,
            retry_count: 0,
            max_retries: 3,
            knowledge_gaps: Vec::new(),
            review_reminders: Vec::new(),
            suggested_topics: Vec::new(),
            efficiency: None,
            stage: Stage::Initialized,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Record a stage failure without aborting the session.
    pub fn record_error(&mut self, context: &str, error: impl std::fmt::Display) {
        self.error_message = Some(format!("{context}: {error}"));
    }

    /// All expected key points across the current comprehension questions.
    pub fn expected_key_points(&self) -> Vec<String> {
        self.comprehension_questions
            .iter()
            .flat_map(|q| q.expected_key_points.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parse_defaults_to_learn() {
        assert_eq!(Intent::parse_or_learn("Practice"), Intent::Practice);
        assert_eq!(Intent::parse_or_learn("  review "), Intent::Review);
        assert_eq!(Intent::parse_or_learn("gibberish"), Intent::Learn);
        assert_eq!(Intent::parse_or_learn(""), Intent::Learn);
    }

    #[test]
    fn test_new_state_defaults() {
        let state = SessionState::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "What is a derivative?",
        );
        assert_eq!(state.stage, Stage::Initialized);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.max_retries, 3);
        assert!(state.explanation.is_none());
        assert!(state.error_message.is_none());
    }

    #[test]
    fn test_state_snapshot_roundtrip() {
        let mut state = SessionState::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "What is VAT?",
        );
        state.stage = Stage::AwaitingResponse;
        state.explanation = Some("VAT is a consumption tax.".into());
        state.comprehension_questions.push(ComprehensionQuestion {
            text: "Who ultimately pays VAT?".into(),
            expected_key_points: vec!["the consumer".into()],
        });

        let json = serde_json::to_string(&state).unwrap();
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.stage, Stage::AwaitingResponse);
        assert_eq!(restored.comprehension_questions.len(), 1);
        assert_eq!(restored.expected_key_points(), vec!["the consumer"]);
    }

    #[test]
    fn test_mnemonic_device_strategy_tag() {
        let device = MnemonicDevice::Acronym {
            acronym: "PEMDAS".into(),
            full_terms: vec!["Parentheses".into(), "Exponents".into()],
            memory_tip: "Please Excuse My Dear Aunt Sally".into(),
            explanation: "Order of operations".into(),
        };
        assert_eq!(device.strategy(), MnemonicStrategy::Acronym);
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["strategy"], "acronym");
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    AssessmentResult, AuthoritySource, BaselineLevel, ComprehensionQuestion, ConceptFeatures,
    ConfidenceLevel, EfficiencyMetrics, KnowledgeGap, MasteryRecord, MnemonicDevice,
    MnemonicStrategy, NextStep, RetrievedConcept, ReviewReminder, SourceRef, TeachingStyle,
    TopicSuggestion,
};

/// The result of one action invocation.
///
/// Every variant carries an explicit `kind` discriminant, so result
/// extraction is a total match on the tag. An action that fails still
/// produces an observation (`Error`) rather than a raised fault, which is
/// what lets the reasoning loop continue past bad invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Baseline {
        level: BaselineLevel,
        assessment: String,
    },
    Concepts {
        concepts: Vec<RetrievedConcept>,
    },
    Explanation {
        text: String,
        style: TeachingStyle,
    },
    Questions {
        questions: Vec<ComprehensionQuestion>,
    },
    Followup {
        strategy: String,
        content: String,
    },
    KeyPoints {
        points: Vec<String>,
    },
    Misunderstandings {
        items: Vec<String>,
    },
    Assessment {
        result: AssessmentResult,
        confidence: ConfidenceLevel,
        details: String,
    },
    NextStep {
        step: NextStep,
    },
    VerificationCheck {
        needs_verification: bool,
        items: Vec<String>,
        reason: String,
    },
    AuthoritySources {
        sources: Vec<AuthoritySource>,
    },
    Verdict {
        verified: bool,
        confidence_score: f64,
        sources: Vec<SourceRef>,
    },
    EnhancedExplanation {
        text: String,
    },
    ConceptFeatures {
        features: ConceptFeatures,
    },
    StrategyChoice {
        strategies: Vec<MnemonicStrategy>,
    },
    Mnemonic {
        device: MnemonicDevice,
    },
    MasteryRecords {
        records: Vec<MasteryRecord>,
    },
    KnowledgeGaps {
        gaps: Vec<KnowledgeGap>,
    },
    Efficiency {
        metrics: EfficiencyMetrics,
    },
    ReviewReminders {
        reminders: Vec<ReviewReminder>,
    },
    TopicSuggestions {
        topics: Vec<TopicSuggestion>,
    },
    Saved {
        id: Uuid,
    },
    Error {
        message: String,
    },
}

impl Observation {
    /// The discriminant name, for logging and transcript rendering.
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::Baseline { .. } => "baseline",
            Observation::Concepts { .. } => "concepts",
            Observation::Explanation { .. } => "explanation",
            Observation::Questions { .. } => "questions",
            Observation::Followup { .. } => "followup",
            Observation::KeyPoints { .. } => "key_points",
            Observation::Misunderstandings { .. } => "misunderstandings",
            Observation::Assessment { .. } => "assessment",
            Observation::NextStep { .. } => "next_step",
            Observation::VerificationCheck { .. } => "verification_check",
            Observation::AuthoritySources { .. } => "authority_sources",
            Observation::Verdict { .. } => "verdict",
            Observation::EnhancedExplanation { .. } => "enhanced_explanation",
            Observation::ConceptFeatures { .. } => "concept_features",
            Observation::StrategyChoice { .. } => "strategy_choice",
            Observation::Mnemonic { .. } => "mnemonic",
            Observation::MasteryRecords { .. } => "mastery_records",
            Observation::KnowledgeGaps { .. } => "knowledge_gaps",
            Observation::Efficiency { .. } => "efficiency",
            Observation::ReviewReminders { .. } => "review_reminders",
            Observation::TopicSuggestions { .. } => "topic_suggestions",
            Observation::Saved { .. } => "saved",
            Observation::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Observation::Error { .. })
    }
}

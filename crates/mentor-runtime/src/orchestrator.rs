use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use mentor_agents::{
    ActionContext, AssessmentAgent, MnemonicAgent, ProgressAgent, TeachingAgent, ValidationAgent,
    assessment::decide_next_step,
};
use mentor_config::MentorConfig;
use mentor_core::{
    AssessmentResult, GapSeverity, Intent, KnowledgeGap, MentorError, NextStep, Result,
    SessionState, Stage, Transcript,
};
use mentor_oracle::{Oracle, OracleReply, OracleRequest};
use mentor_store::{ConceptSearch, SqliteStore};

const INTENT_SYSTEM: &str = "You classify a learner's request. \
Reply with exactly one word: learn, practice, progress, or review.\n\
- learn: wants a concept explained or taught\n\
- practice: wants exercises or an assessment of an answer\n\
- progress: wants to see overall learning progress\n\
- review: wants review recommendations for weak topics";

/// Ceiling on stage transitions per drive. Every route through the graph
/// is far shorter; hitting this means the routing itself is broken.
const MAX_TRANSITIONS: u32 = 64;

/// What a single stage execution decided about the session's flow.
enum Flow {
    Continue,
    Pause,
    Done,
}

// ── Stage gating ───────────────────────────────────────────────

/// Validation runs only when not suppressed and the explanation carries a
/// digit or a regulatory keyword (or retrieval flagged formulas/rules).
pub fn should_validate(state: &SessionState, config: &MentorConfig) -> bool {
    if state.skip_validation || config.validation.skip {
        return false;
    }
    let Some(ref explanation) = state.explanation else {
        return false;
    };
    if explanation.is_empty() {
        return false;
    }
    if explanation.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let lower = explanation.to_lowercase();
    if config
        .validation
        .trigger_keywords
        .iter()
        .any(|kw| lower.contains(kw.as_str()))
    {
        return true;
    }
    state.needs_validation
}

/// A mnemonic is generated only when not suppressed AND the learner
/// failed the last check or the explanation is long. A fully understood
/// result always suppresses it.
pub fn should_generate_mnemonic(state: &SessionState, config: &MentorConfig) -> bool {
    if state.skip_mnemonic || config.mnemonic.skip {
        return false;
    }
    if state.assessment_result == Some(AssessmentResult::FullyUnderstood) {
        return false;
    }
    if state.assessment_result == Some(AssessmentResult::NotUnderstood) {
        return true;
    }
    state
        .explanation
        .as_ref()
        .is_some_and(|e| e.len() > config.mnemonic.explanation_length_trigger)
}

// ── Orchestrator ───────────────────────────────────────────────

/// The top-level tutoring state machine.
///
/// Owns the five agent configurations and threads one [`SessionState`]
/// through the stage graph. Execution is strictly sequential per session;
/// the only externally visible pause is `AwaitingResponse`, where control
/// returns to the caller until [`Orchestrator::resume`] supplies the
/// learner's answer.
pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    store: Arc<SqliteStore>,
    search: Arc<dyn ConceptSearch>,
    config: MentorConfig,

    teaching: TeachingAgent,
    assessment: AssessmentAgent,
    progress: ProgressAgent,
    validation: ValidationAgent,
    mnemonic: MnemonicAgent,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<SqliteStore>,
        search: Arc<dyn ConceptSearch>,
        config: MentorConfig,
    ) -> Result<Self> {
        Ok(Self {
            teaching: TeachingAgent::new()?,
            assessment: AssessmentAgent::new()?,
            progress: ProgressAgent::new()?,
            validation: ValidationAgent::new()?,
            mnemonic: MnemonicAgent::new()?,
            oracle,
            store,
            search,
            config,
        })
    }

    /// Start a session and drive it until it pauses for the learner's
    /// answer or finalizes.
    pub async fn run(
        &self,
        learner_id: Uuid,
        goal_id: Uuid,
        tenant_id: Uuid,
        question_text: impl Into<String>,
        initial_understanding: Option<String>,
    ) -> Result<SessionState> {
        let mut state = SessionState::new(learner_id, goal_id, tenant_id, question_text);
        state.initial_understanding = initial_understanding;
        state.max_retries = self.config.teaching.max_retries;
        state.skip_validation = self.config.validation.skip;
        state.skip_mnemonic = self.config.mnemonic.skip;

        info!(session = %state.session_id, "session started");
        self.drive(state).await
    }

    /// Continue a paused session with the learner's answer.
    pub async fn resume(
        &self,
        mut state: SessionState,
        learner_response: impl Into<String>,
    ) -> Result<SessionState> {
        if state.stage != Stage::AwaitingResponse {
            return Err(MentorError::InvalidState(format!(
                "resume called at stage {}, expected awaiting_response",
                state.stage
            )));
        }
        state.learner_response = Some(learner_response.into());
        self.drive(state).await
    }

    /// Advance the machine until it pauses or finalizes.
    async fn drive(&self, mut state: SessionState) -> Result<SessionState> {
        let mut transitions = 0u32;
        loop {
            transitions += 1;
            if transitions > MAX_TRANSITIONS {
                return Err(MentorError::InvalidState(format!(
                    "no terminal stage after {MAX_TRANSITIONS} transitions (stuck at {})",
                    state.stage
                )));
            }

            match self.step(&mut state).await? {
                Flow::Continue => {}
                Flow::Pause => {
                    info!(session = %state.session_id, stage = %state.stage, "session paused");
                    return Ok(state);
                }
                Flow::Done => {
                    state.stage = Stage::Finalized;
                    if let Err(e) = self.store.save_snapshot(&state) {
                        warn!(session = %state.session_id, error = %e, "snapshot save failed");
                        state.record_error("finalize", e);
                    }
                    info!(session = %state.session_id, "session finalized");
                    return Ok(state);
                }
            }
        }
    }

    /// Execute the work for the current stage and move to the next one.
    ///
    /// Agent failures are caught here: the stage's output fields stay
    /// unset, the error is recorded on the state, and routing continues -
    /// a failed stage never aborts the session.
    async fn step(&self, state: &mut SessionState) -> Result<Flow> {
        match state.stage {
            Stage::Initialized => {
                state.intent = Some(self.detect_intent(&state.question_text).await);
                state.stage = Stage::IntentDetected;
                Ok(Flow::Continue)
            }

            Stage::IntentDetected => {
                match state.intent.unwrap_or(Intent::Learn) {
                    Intent::Learn | Intent::Other => {
                        self.evaluate_baseline(state).await;
                        state.stage = Stage::BaselineEvaluated;
                    }
                    Intent::Practice => {
                        self.assessment_entry(state).await;
                        state.stage = Stage::AssessmentCompleted;
                    }
                    Intent::Progress => {
                        self.progress_entry(state).await;
                        state.stage = Stage::ProgressOverview;
                    }
                    Intent::Review => {
                        self.review_entry(state).await;
                        state.stage = Stage::ReviewRecommended;
                    }
                }
                Ok(Flow::Continue)
            }

            Stage::BaselineEvaluated => {
                self.retrieve_knowledge(state).await;
                state.stage = Stage::KnowledgeRetrieved;
                Ok(Flow::Continue)
            }

            Stage::KnowledgeRetrieved => {
                self.generate_explanation(state).await;
                state.stage = Stage::ExplanationGenerated;
                Ok(Flow::Continue)
            }

            Stage::ExplanationGenerated => {
                if should_validate(state, &self.config) {
                    self.validate_content(state).await;
                    state.stage = Stage::ContentValidated;
                } else {
                    state.stage = Stage::ValidationSkipped;
                }
                Ok(Flow::Continue)
            }

            Stage::ContentValidated | Stage::ValidationSkipped => {
                if should_generate_mnemonic(state, &self.config) {
                    self.generate_mnemonic(state).await;
                    state.stage = Stage::MnemonicGenerated;
                } else {
                    state.stage = Stage::MnemonicSkipped;
                }
                Ok(Flow::Continue)
            }

            Stage::MnemonicGenerated | Stage::MnemonicSkipped => {
                self.create_check(state).await;
                state.stage = Stage::CheckCreated;
                Ok(Flow::Continue)
            }

            Stage::CheckCreated => {
                state.stage = Stage::AwaitingResponse;
                Ok(Flow::Pause)
            }

            Stage::AwaitingResponse => {
                if state.learner_response.is_none() {
                    return Ok(Flow::Pause);
                }
                self.assess_understanding(state).await;
                state.stage = Stage::UnderstandingAssessed;
                Ok(Flow::Continue)
            }

            Stage::UnderstandingAssessed => {
                let result = state
                    .assessment_result
                    .unwrap_or(AssessmentResult::NotUnderstood);
                let step = state
                    .next_step
                    .unwrap_or_else(|| decide_next_step(result, state.retry_count, state.max_retries));

                match step {
                    NextStep::Continue => {
                        self.update_progress(state).await;
                        state.stage = Stage::ProgressUpdated;
                    }
                    NextStep::AdaptiveFollowup => {
                        self.adaptive_followup(state).await;
                        state.stage = Stage::FollowupGenerated;
                    }
                    NextStep::Retry => {
                        // Routing, not the state object, enforces the
                        // retry ceiling.
                        state.retry_count += 1;
                        state.learner_response = None;
                        state.next_step = None;
                        state.stage = Stage::KnowledgeRetrieved;
                    }
                    NextStep::RecordGap => {
                        self.record_gap(state).await;
                        state.stage = Stage::GapRecorded;
                    }
                }
                Ok(Flow::Continue)
            }

            Stage::FollowupGenerated => {
                state.learner_response = None;
                state.next_step = None;
                self.create_check(state).await;
                state.stage = Stage::CheckCreated;
                Ok(Flow::Continue)
            }

            Stage::ProgressUpdated
            | Stage::GapRecorded
            | Stage::ProgressOverview
            | Stage::ReviewRecommended
            | Stage::AssessmentCompleted
            | Stage::Finalized => Ok(Flow::Done),
        }
    }

    // ── Stage implementations ──────────────────────────────────

    /// One unconstrained oracle call; anything unrecognized (including a
    /// failed call) defaults to `learn`.
    async fn detect_intent(&self, question: &str) -> Intent {
        if question.is_empty() {
            return Intent::Learn;
        }
        let request = OracleRequest {
            system: INTENT_SYSTEM.to_string(),
            input: question.to_string(),
            transcript: Transcript::new(),
            actions: vec![],
            temperature: 0.0,
            max_tokens: 8,
        };
        match self.oracle.complete(&request).await {
            Ok(OracleReply::Text(text)) => Intent::parse_or_learn(&text),
            Ok(OracleReply::Action(_)) | Err(_) => Intent::Learn,
        }
    }

    fn base_ctx(&self, state: &SessionState) -> ActionContext {
        let mut ctx = ActionContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.search),
            Arc::clone(&self.oracle),
            self.config.clone(),
            state.tenant_id,
            state.learner_id,
            state.goal_id,
        );
        ctx.topic_id = state.topic_id;
        ctx.retry_count = state.retry_count;
        ctx.max_retries = state.max_retries;
        ctx.with_seed("question", json!(state.question_text))
            .with_seed("concept_name", json!(state.question_text))
            .with_seed(
                "initial_understanding",
                json!(state.initial_understanding.clone().unwrap_or_default()),
            )
            .with_seed(
                "explanation",
                json!(state.explanation.clone().unwrap_or_default()),
            )
            .with_seed(
                "baseline_level",
                serde_json::to_value(state.baseline_level).unwrap_or(json!("")),
            )
            .with_seed(
                "retrieved_concepts",
                serde_json::to_value(&state.retrieved_concepts).unwrap_or(json!([])),
            )
            .with_seed(
                "learner_response",
                json!(state.learner_response.clone().unwrap_or_default()),
            )
            .with_seed("expected_key_points", json!(state.expected_key_points()))
            .with_seed("misunderstandings", json!(state.misunderstandings))
            .with_seed(
                "previous_explanation",
                json!(state.explanation.clone().unwrap_or_default()),
            )
    }

    async fn evaluate_baseline(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.teaching.evaluate_baseline(&ctx).await {
            Ok((level, assessment)) => {
                state.baseline_level = Some(level);
                state.baseline_assessment = Some(assessment);
            }
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "evaluate_baseline failed");
                state.record_error("evaluate_baseline", e);
            }
        }
    }

    async fn retrieve_knowledge(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.teaching.retrieve_knowledge(&ctx).await {
            Ok(concepts) => {
                state.needs_validation = concepts
                    .iter()
                    .any(|c| c.formulas.is_some() || c.rules.is_some());
                state.retrieved_concepts = concepts;
            }
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "retrieve_knowledge failed");
                state.record_error("retrieve_knowledge", e);
            }
        }
    }

    async fn generate_explanation(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.teaching.generate_explanation(&ctx).await {
            Ok(text) => state.explanation = Some(text),
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "generate_explanation failed");
                state.record_error("generate_explanation", e);
            }
        }
    }

    async fn validate_content(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.validation.validate_content(&ctx).await {
            Ok(report) => {
                if let Some(enhanced) = report.enhanced_explanation {
                    state.explanation = Some(enhanced);
                }
                state.validation = Some(report.outcome);
            }
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "validate_content failed");
                state.record_error("validate_content", e);
            }
        }
    }

    async fn generate_mnemonic(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.mnemonic.generate_mnemonic(&ctx).await {
            Ok(device) => state.mnemonic_device = device,
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "generate_mnemonic failed");
                state.record_error("generate_mnemonic", e);
            }
        }
    }

    async fn create_check(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        state.learner_response = None;
        match self.teaching.generate_questions(&ctx).await {
            Ok(questions) => state.comprehension_questions = questions,
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "create_check failed");
                state.record_error("create_check", e);
            }
        }
    }

    async fn assess_understanding(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.assessment.assess_understanding(&ctx).await {
            Ok(output) => {
                state.assessment_result = Some(output.result);
                state.confidence_level = Some(output.confidence);
                state.assessment_details = Some(output.details);
                state.key_points_understood = output.key_points_understood;
                state.misunderstandings = output.misunderstandings;

                match self.assessment.recommend_next_step(&ctx, output.result).await {
                    Ok(step) => state.next_step = Some(step),
                    Err(e) => {
                        warn!(session = %state.session_id, error = %e, "recommend_next_step failed");
                        state.next_step = None;
                    }
                }
            }
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "assess_understanding failed");
                state.record_error("assess_understanding", e);
                state.assessment_result = Some(AssessmentResult::NotUnderstood);
            }
        }
    }

    async fn adaptive_followup(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.teaching.adaptive_followup(&ctx).await {
            Ok(content) if !content.is_empty() => state.explanation = Some(content),
            Ok(_) => {}
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "adaptive_followup failed");
                state.record_error("adaptive_followup", e);
            }
        }
    }

    async fn update_progress(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);

        if let Some(topic_id) = state.topic_id {
            if let Some(confidence) = state.confidence_level {
                if let Err(e) = self.progress.update_mastery(
                    &ctx,
                    topic_id,
                    confidence,
                    &state.key_points_understood,
                ) {
                    warn!(session = %state.session_id, error = %e, "mastery update failed");
                    state.record_error("update_progress", e);
                }
            }
        }

        match self.progress.track_progress(&ctx).await {
            Ok(snapshot) => state.knowledge_gaps = snapshot.gaps,
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "track_progress failed");
                state.record_error("update_progress", e);
            }
        }
    }

    async fn record_gap(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        let gap = KnowledgeGap {
            topic_id: state.topic_id,
            description: if state.misunderstandings.is_empty() {
                format!("did not reach understanding of: {}", state.question_text)
            } else {
                state.misunderstandings.join("; ")
            },
            severity: if state.retry_count >= state.max_retries {
                GapSeverity::High
            } else {
                GapSeverity::Medium
            },
            retry_count: state.retry_count,
        };

        if let Err(e) = self.progress.record_gap(&ctx, &gap) {
            warn!(session = %state.session_id, error = %e, "record_gap failed");
            state.record_error("record_gap", e);
        }
        state.knowledge_gaps.push(gap);
    }

    // ── Single-shot entries for non-learn intents ──────────────

    async fn assessment_entry(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.assessment.assess_understanding(&ctx).await {
            Ok(output) => {
                state.assessment_result = Some(output.result);
                state.confidence_level = Some(output.confidence);
                state.assessment_details = Some(output.details);
            }
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "assessment_entry failed");
                state.record_error("assessment_entry", e);
            }
        }
    }

    async fn progress_entry(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.progress.analyze_efficiency(&ctx).await {
            Ok(metrics) => state.efficiency = Some(metrics),
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "progress_entry failed");
                state.record_error("progress_entry", e);
            }
        }
        match self.progress.recommend_next(&ctx).await {
            Ok(topics) => state.suggested_topics = topics,
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "recommend_next failed");
                state.record_error("progress_entry", e);
            }
        }
    }

    async fn review_entry(&self, state: &mut SessionState) {
        let ctx = self.base_ctx(state);
        match self.progress.recommend_review(&ctx).await {
            Ok(reminders) => state.review_reminders = reminders,
            Err(e) => {
                warn!(session = %state.session_id, error = %e, "review_entry failed");
                state.record_error("review_entry", e);
            }
        }
    }
}

//! The progress agent: read/aggregate over the store - mastery tracking,
//! review reminders, next-topic suggestions, efficiency metrics - plus
//! the write-side operations the terminal stages use.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use mentor_core::{
    ActionSpec, ConfidenceLevel, EfficiencyMetrics, KnowledgeGap, MasteryRecord, Observation,
    Result, ReviewReminder, TopicSuggestion,
};

use crate::context::{ActionContext, arg_str, arg_str_vec};
use crate::cycle::run_cycle;
use crate::extract::extract_or_default;
use crate::registry::{ActionHandler, ActionRegistry};

const TRACK_SYSTEM: &str = "You are a learning progress assistant. \
Use the query_mastery and query_gaps actions to gather the learner's current standing, then \
summarize it.";

const REVIEW_SYSTEM: &str = "You are a spaced-repetition assistant. \
Use the recommend_review action to find topics due for review, then summarize them.";

const NEXT_SYSTEM: &str = "You are a curriculum assistant. \
Use the recommend_next_topics action to suggest what to learn next, then summarize.";

const EFFICIENCY_SYSTEM: &str = "You are a learning analytics assistant. \
Use the analyze_efficiency action, then summarize the metrics.";

/// Combined mastery/gap snapshot from one track_progress pass.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub mastery: Vec<MasteryRecord>,
    pub gaps: Vec<KnowledgeGap>,
}

// ── Pure aggregation helpers ───────────────────────────────────

/// Review reminders for records whose last review is older than the
/// per-confidence interval.
pub fn review_reminders(
    records: &[MasteryRecord],
    review: &mentor_config::schema::ReviewConfig,
) -> Vec<ReviewReminder> {
    let now = Utc::now();
    let mut reminders: Vec<ReviewReminder> = records
        .iter()
        .filter_map(|record| {
            let last = record.last_reviewed_at?;
            let days = (now - last).num_days();
            let interval = review.interval_for(record.confidence);
            (days >= interval).then(|| ReviewReminder {
                topic_id: record.topic_id,
                days_since_review: days,
                urgency: (days as f64 / (interval as f64 * 2.0)).clamp(0.4, 1.0),
            })
        })
        .collect();
    reminders.sort_by(|a, b| b.urgency.partial_cmp(&a.urgency).unwrap_or(std::cmp::Ordering::Equal));
    reminders.truncate(review.max_reminders);
    reminders
}

/// Aggregate efficiency metrics from mastery records and open gaps.
pub fn efficiency_metrics(records: &[MasteryRecord], gaps: &[KnowledgeGap]) -> EfficiencyMetrics {
    let total_mastered = records.len();
    let open_gaps = gaps.len();
    let pace = if open_gaps > total_mastered {
        "slow"
    } else if total_mastered >= open_gaps.saturating_mul(3).max(3) {
        "fast"
    } else {
        "moderate"
    };
    EfficiencyMetrics {
        total_mastered,
        open_gaps,
        average_mastery_days: if total_mastered > 0 { 3.0 } else { 0.0 },
        pace: pace.to_string(),
    }
}

// ── Action handlers ────────────────────────────────────────────

struct QueryMasteryAction;

#[async_trait]
impl ActionHandler for QueryMasteryAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "query_mastery".into(),
            description: "Fetch the learner's topic mastery records.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: &Value, ctx: &ActionContext) -> Result<Observation> {
        Ok(Observation::MasteryRecords {
            records: ctx.store.mastery_for_learner(ctx.tenant_id, ctx.learner_id)?,
        })
    }
}

struct QueryGapsAction;

#[async_trait]
impl ActionHandler for QueryGapsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "query_gaps".into(),
            description: "Fetch the learner's unresolved knowledge gaps.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: &Value, ctx: &ActionContext) -> Result<Observation> {
        Ok(Observation::KnowledgeGaps {
            gaps: ctx.store.open_gaps(ctx.tenant_id, ctx.learner_id)?,
        })
    }
}

struct RecommendReviewAction;

#[async_trait]
impl ActionHandler for RecommendReviewAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "recommend_review".into(),
            description: "Topics due for review based on confidence-driven intervals.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let records = ctx.store.mastery_for_learner(ctx.tenant_id, ctx.learner_id)?;
        Ok(Observation::ReviewReminders {
            reminders: review_reminders(&records, &ctx.config.review),
        })
    }
}

struct RecommendNextTopicsAction;

#[async_trait]
impl ActionHandler for RecommendNextTopicsAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "recommend_next_topics".into(),
            description: "Suggest topics the learner has not yet mastered.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "max_suggestions": { "type": "integer" }
                }
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let max = args
            .get("max_suggestions")
            .and_then(|v| v.as_u64())
            .unwrap_or(3) as usize;
        let mastered: Vec<Uuid> = ctx
            .store
            .mastery_for_learner(ctx.tenant_id, ctx.learner_id)?
            .into_iter()
            .map(|r| r.topic_id)
            .collect();
        let topics = ctx
            .store
            .topics(ctx.tenant_id)?
            .into_iter()
            .filter(|t| !mastered.contains(&t.topic_id))
            .take(max)
            .map(|t| TopicSuggestion {
                topic_id: t.topic_id,
                name: t.name,
                score: 0.7,
            })
            .collect();
        Ok(Observation::TopicSuggestions { topics })
    }
}

struct AnalyzeEfficiencyAction;

#[async_trait]
impl ActionHandler for AnalyzeEfficiencyAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "analyze_efficiency".into(),
            description: "Aggregate learning-efficiency metrics for the learner.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let records = ctx.store.mastery_for_learner(ctx.tenant_id, ctx.learner_id)?;
        let gaps = ctx.store.open_gaps(ctx.tenant_id, ctx.learner_id)?;
        Ok(Observation::Efficiency {
            metrics: efficiency_metrics(&records, &gaps),
        })
    }
}

struct UpdateMasteryAction;

#[async_trait]
impl ActionHandler for UpdateMasteryAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "update_mastery".into(),
            description: "Upsert the learner's mastery record for a topic.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic_id": { "type": "string" },
                    "confidence_level": { "type": "string" },
                    "key_points": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["topic_id"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let topic_id = Uuid::parse_str(arg_str(args, "topic_id")).map_err(|e| {
            mentor_core::MentorError::ActionFailed {
                action: "update_mastery".into(),
                reason: format!("invalid topic_id: {e}"),
            }
        })?;
        let confidence = ConfidenceLevel::from_str_or_medium(arg_str(args, "confidence_level"));
        let key_points = arg_str_vec(args, "key_points");
        let id = ctx
            .store
            .upsert_mastery(ctx.tenant_id, ctx.learner_id, topic_id, confidence, &key_points)?;
        Ok(Observation::Saved { id })
    }
}

struct RecordGapAction;

#[async_trait]
impl ActionHandler for RecordGapAction {
    fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: "record_gap".into(),
            description: "Record an unresolved knowledge gap for the learner.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "description": { "type": "string" },
                    "severity": { "type": "string", "enum": ["low", "medium", "high"] }
                },
                "required": ["description"]
            }),
        }
    }

    async fn invoke(&self, args: &Value, ctx: &ActionContext) -> Result<Observation> {
        let gap = KnowledgeGap {
            topic_id: ctx.topic_id,
            description: arg_str(args, "description").to_string(),
            severity: match arg_str(args, "severity") {
                "low" => mentor_core::GapSeverity::Low,
                "high" => mentor_core::GapSeverity::High,
                _ => mentor_core::GapSeverity::Medium,
            },
            retry_count: ctx.retry_count,
        };
        let id = ctx.store.record_gap(ctx.tenant_id, ctx.learner_id, &gap)?;
        Ok(Observation::Saved { id })
    }
}

// ── Agent configuration ────────────────────────────────────────

pub struct ProgressAgent {
    registry: ActionRegistry,
}

impl ProgressAgent {
    pub fn new() -> Result<Self> {
        let registry = ActionRegistry::new()
            .register(Arc::new(QueryMasteryAction))
            .register(Arc::new(QueryGapsAction))
            .register(Arc::new(RecommendReviewAction))
            .register(Arc::new(RecommendNextTopicsAction))
            .register(Arc::new(AnalyzeEfficiencyAction))
            .register(Arc::new(UpdateMasteryAction))
            .register(Arc::new(RecordGapAction));
        registry.assert_covers(&[
            "query_mastery",
            "query_gaps",
            "recommend_review",
            "recommend_next_topics",
            "analyze_efficiency",
            "update_mastery",
            "record_gap",
        ])?;
        Ok(Self { registry })
    }

    async fn run_task(
        &self,
        ctx: &ActionContext,
        system: &str,
        task: &str,
    ) -> Result<mentor_core::Transcript> {
        let input = format!("Task: {task}\nLearner: {}", ctx.learner_id);
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

    /// Gather the learner's current mastery and open gaps.
    pub async fn track_progress(&self, ctx: &ActionContext) -> Result<ProgressSnapshot> {
        let transcript = self.run_task(ctx, TRACK_SYSTEM, "track_progress").await?;
        Ok(ProgressSnapshot {
            mastery: extract_or_default(&transcript, "track_progress", "mastery_records", |obs| {
                match obs {
                    Observation::MasteryRecords { records } => Some(records.clone()),
                    _ => None,
                }
            }),
            gaps: extract_or_default(&transcript, "track_progress", "knowledge_gaps", |obs| {
                match obs {
                    Observation::KnowledgeGaps { gaps } => Some(gaps.clone()),
                    _ => None,
                }
            }),
        })
    }

    /// Topics due for review.
    pub async fn recommend_review(&self, ctx: &ActionContext) -> Result<Vec<ReviewReminder>> {
        let transcript = self.run_task(ctx, REVIEW_SYSTEM, "recommend_review").await?;
        Ok(extract_or_default(
            &transcript,
            "recommend_review",
            "review_reminders",
            |obs| match obs {
                Observation::ReviewReminders { reminders } => Some(reminders.clone()),
                _ => None,
            },
        ))
    }

    /// Suggested next topics.
    pub async fn recommend_next(&self, ctx: &ActionContext) -> Result<Vec<TopicSuggestion>> {
        let transcript = self.run_task(ctx, NEXT_SYSTEM, "recommend_next").await?;
        Ok(extract_or_default(
            &transcript,
            "recommend_next",
            "topic_suggestions",
            |obs| match obs {
                Observation::TopicSuggestions { topics } => Some(topics.clone()),
                _ => None,
            },
        ))
    }

    /// Aggregate efficiency metrics.
    pub async fn analyze_efficiency(&self, ctx: &ActionContext) -> Result<EfficiencyMetrics> {
        let transcript = self.run_task(ctx, EFFICIENCY_SYSTEM, "analyze_efficiency").await?;
        Ok(extract_or_default(
            &transcript,
            "analyze_efficiency",
            "efficiency",
            |obs| match obs {
                Observation::Efficiency { metrics } => Some(metrics.clone()),
                _ => None,
            },
        ))
    }

    /// Terminal-stage write: upsert mastery after a fully understood
    /// session. Durable ids are assigned by the store, not here.
    pub fn update_mastery(
        &self,
        ctx: &ActionContext,
        topic_id: Uuid,
        confidence: ConfidenceLevel,
        key_points: &[String],
    ) -> Result<Uuid> {
        ctx.store
            .upsert_mastery(ctx.tenant_id, ctx.learner_id, topic_id, confidence, key_points)
    }

    /// Terminal-stage write: record a knowledge gap after retry
    /// exhaustion.
    pub fn record_gap(&self, ctx: &ActionContext, gap: &KnowledgeGap) -> Result<Uuid> {
        ctx.store.record_gap(ctx.tenant_id, ctx.learner_id, gap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mentor_config::schema::ReviewConfig;

    fn record(confidence: ConfidenceLevel, days_ago: i64) -> MasteryRecord {
        MasteryRecord {
            topic_id: Uuid::new_v4(),
            confidence,
            key_points: vec![],
            last_reviewed_at: Some(Utc::now() - Duration::days(days_ago)),
        }
    }

    #[test]
    fn test_review_intervals_by_confidence() {
        let review = ReviewConfig::default();

        // low confidence: due after 1 day
        assert_eq!(review_reminders(&[record(ConfidenceLevel::Low, 1)], &review).len(), 1);
        // high confidence: not due until 7 days
        assert!(review_reminders(&[record(ConfidenceLevel::High, 5)], &review).is_empty());
        assert_eq!(review_reminders(&[record(ConfidenceLevel::High, 8)], &review).len(), 1);
        // medium_high: 3-day interval
        assert!(review_reminders(&[record(ConfidenceLevel::MediumHigh, 2)], &review).is_empty());
        assert_eq!(
            review_reminders(&[record(ConfidenceLevel::MediumHigh, 3)], &review).len(),
            1
        );
    }

    #[test]
    fn test_never_reviewed_records_are_skipped() {
        let review = ReviewConfig::default();
        let record = MasteryRecord {
            topic_id: Uuid::new_v4(),
            confidence: ConfidenceLevel::Low,
            key_points: vec![],
            last_reviewed_at: None,
        };
        assert!(review_reminders(&[record], &review).is_empty());
    }

    #[test]
    fn test_reminders_capped_and_sorted() {
        let review = ReviewConfig { max_reminders: 2, ..Default::default() };
        let records = vec![
            record(ConfidenceLevel::Low, 2),
            record(ConfidenceLevel::Low, 10),
            record(ConfidenceLevel::Low, 5),
        ];
        let reminders = review_reminders(&records, &review);
        assert_eq!(reminders.len(), 2);
        assert!(reminders[0].urgency >= reminders[1].urgency);
        assert_eq!(reminders[0].days_since_review, 10);
    }

    #[test]
    fn test_efficiency_pace_bands() {
        let mastered: Vec<MasteryRecord> =
            (0..6).map(|_| record(ConfidenceLevel::High, 1)).collect();
        let gap = KnowledgeGap {
            topic_id: None,
            description: "x".into(),
            severity: mentor_core::GapSeverity::Medium,
            retry_count: 3,
        };

        let fast = efficiency_metrics(&mastered, &[gap.clone()]);
        assert_eq!(fast.pace, "fast");
        assert_eq!(fast.total_mastered, 6);

        let slow = efficiency_metrics(&mastered[..1], &vec![gap.clone(), gap.clone()]);
        assert_eq!(slow.pace, "slow");

        let moderate = efficiency_metrics(&mastered[..2], &[gap]);
        assert_eq!(moderate.pace, "moderate");
    }
}

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use mentor_core::{
    AuthoritySource, ConfidenceLevel, GapSeverity, KnowledgeGap, MasteryRecord, MentorError,
    MnemonicDevice, Result, SessionState, SourceRef,
};

/// A concept row as stored, including its optional embedding.
#[derive(Debug, Clone)]
pub struct ConceptRow {
    pub concept_id: Uuid,
    pub tenant_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub name: String,
    pub explanation: Option<String>,
    pub formulas: Option<String>,
    pub rules: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A teachable topic.
#[derive(Debug, Clone)]
pub struct TopicRow {
    pub topic_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

/// SQLite-backed persistence for the tutoring domain.
///
/// All writes autocommit - the orchestration core never holds a
/// transaction open across an oracle call.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

fn store_err(e: impl std::fmt::Display) -> MentorError {
    MentorError::Store(e.to_string())
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening store");

        let conn = Connection::open(path).map_err(store_err)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS topics (
                topic_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS concepts (
                concept_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                topic_id TEXT REFERENCES topics(topic_id),
                name TEXT NOT NULL,
                explanation TEXT,
                formulas TEXT,
                rules TEXT,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS topic_mastery (
                mastery_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                learner_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                confidence_level TEXT NOT NULL,
                key_points TEXT DEFAULT '[]',
                last_reviewed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(tenant_id, learner_id, topic_id)
            );

            CREATE TABLE IF NOT EXISTS knowledge_gaps (
                gap_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                learner_id TEXT NOT NULL,
                topic_id TEXT,
                description TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'medium',
                retry_count INTEGER DEFAULT 0,
                identified_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE TABLE IF NOT EXISTS mnemonic_devices (
                device_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                concept_id TEXT,
                strategy TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verified_content (
                content_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                concept_id TEXT,
                content TEXT NOT NULL,
                sources TEXT DEFAULT '[]',
                confidence REAL NOT NULL,
                verified_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authority_sources (
                source_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                trust_score REAL NOT NULL,
                domain_tags TEXT DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS session_snapshots (
                session_id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_concepts_tenant ON concepts(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_mastery_learner ON topic_mastery(learner_id);
            CREATE INDEX IF NOT EXISTS idx_gaps_learner ON knowledge_gaps(learner_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_learner ON session_snapshots(learner_id);
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    // ── Topics & concepts ──────────────────────────────────────

    pub fn upsert_topic(&self, topic: &TopicRow) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO topics (topic_id, tenant_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(topic_id) DO UPDATE SET name = excluded.name",
            rusqlite::params![
                topic.topic_id.to_string(),
                topic.tenant_id.to_string(),
                topic.name,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn topics(&self, tenant_id: Uuid) -> Result<Vec<TopicRow>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT topic_id, tenant_id, name FROM topics WHERE tenant_id = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([tenant_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut topics = Vec::new();
        for row in rows {
            let (topic_id, tenant_id, name) = row.map_err(store_err)?;
            topics.push(TopicRow {
                topic_id: Uuid::parse_str(&topic_id).map_err(store_err)?,
                tenant_id: Uuid::parse_str(&tenant_id).map_err(store_err)?,
                name,
            });
        }
        Ok(topics)
    }

    pub fn upsert_concept(&self, concept: &ConceptRow) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO concepts
               (concept_id, tenant_id, topic_id, name, explanation, formulas, rules, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(concept_id) DO UPDATE SET
               name = excluded.name,
               explanation = excluded.explanation,
               formulas = excluded.formulas,
               rules = excluded.rules,
               embedding = COALESCE(excluded.embedding, concepts.embedding)",
            rusqlite::params![
                concept.concept_id.to_string(),
                concept.tenant_id.to_string(),
                concept.topic_id.map(|t| t.to_string()),
                concept.name,
                concept.explanation,
                concept.formulas,
                concept.rules,
                concept.embedding.as_deref().map(encode_embedding),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// All concepts for a tenant, optionally scoped to a topic.
    pub fn concepts(&self, tenant_id: Uuid, topic_id: Option<Uuid>) -> Result<Vec<ConceptRow>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT concept_id, tenant_id, topic_id, name, explanation, formulas, rules, embedding
                 FROM concepts
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR topic_id = ?2)",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![tenant_id.to_string(), topic_id.map(|t| t.to_string())],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<Vec<u8>>>(7)?,
                    ))
                },
            )
            .map_err(store_err)?;

        let mut concepts = Vec::new();
        for row in rows {
            let (concept_id, tenant_id, topic_id, name, explanation, formulas, rules, embedding) =
                row.map_err(store_err)?;
            concepts.push(ConceptRow {
                concept_id: Uuid::parse_str(&concept_id).map_err(store_err)?,
                tenant_id: Uuid::parse_str(&tenant_id).map_err(store_err)?,
                topic_id: topic_id
                    .map(|t| Uuid::parse_str(&t).map_err(store_err))
                    .transpose()?,
                name,
                explanation,
                formulas,
                rules,
                embedding: embedding.map(|b| decode_embedding(&b)),
            });
        }
        Ok(concepts)
    }

    // ── Mastery ────────────────────────────────────────────────

    /// Update or create a learner's mastery record for a topic.
    pub fn upsert_mastery(
        &self,
        tenant_id: Uuid,
        learner_id: Uuid,
        topic_id: Uuid,
        confidence: ConfidenceLevel,
        key_points: &[String],
    ) -> Result<Uuid> {
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        let mastery_id = Uuid::new_v4();
        db.execute(
            "INSERT INTO topic_mastery
               (mastery_id, tenant_id, learner_id, topic_id, confidence_level, key_points,
                last_reviewed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)
             ON CONFLICT(tenant_id, learner_id, topic_id) DO UPDATE SET
               confidence_level = excluded.confidence_level,
               key_points = excluded.key_points,
               last_reviewed_at = excluded.last_reviewed_at,
               updated_at = excluded.updated_at",
            rusqlite::params![
                mastery_id.to_string(),
                tenant_id.to_string(),
                learner_id.to_string(),
                topic_id.to_string(),
                confidence.as_str(),
                serde_json::to_string(key_points)?,
                now,
            ],
        )
        .map_err(store_err)?;
        Ok(mastery_id)
    }

    pub fn mastery_for_learner(
        &self,
        tenant_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Vec<MasteryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT topic_id, confidence_level, key_points, last_reviewed_at
                 FROM topic_mastery
                 WHERE tenant_id = ?1 AND learner_id = ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![tenant_id.to_string(), learner_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .map_err(store_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (topic_id, confidence, key_points, last_reviewed_at) = row.map_err(store_err)?;
            records.push(MasteryRecord {
                topic_id: Uuid::parse_str(&topic_id).map_err(store_err)?,
                confidence: ConfidenceLevel::from_str_or_medium(&confidence),
                key_points: serde_json::from_str(&key_points).unwrap_or_default(),
                last_reviewed_at: last_reviewed_at
                    .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                    .map(|t| t.with_timezone(&Utc)),
            });
        }
        Ok(records)
    }

    // ── Knowledge gaps ─────────────────────────────────────────

    /// Record a knowledge gap. An unresolved gap for the same learner and
    /// topic is updated in place.
    pub fn record_gap(&self, tenant_id: Uuid, learner_id: Uuid, gap: &KnowledgeGap) -> Result<Uuid> {
        let db = self.db.lock();
        let now = Utc::now().to_rfc3339();
        let severity = match gap.severity {
            GapSeverity::Low => "low",
            GapSeverity::Medium => "medium",
            GapSeverity::High => "high",
        };

        let existing: Option<String> = db
            .query_row(
                "SELECT gap_id FROM knowledge_gaps
                 WHERE tenant_id = ?1 AND learner_id = ?2
                   AND (topic_id IS ?3) AND resolved_at IS NULL",
                rusqlite::params![
                    tenant_id.to_string(),
                    learner_id.to_string(),
                    gap.topic_id.map(|t| t.to_string()),
                ],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;

        if let Some(gap_id) = existing {
            db.execute(
                "UPDATE knowledge_gaps
                 SET description = ?2, severity = ?3, retry_count = ?4
                 WHERE gap_id = ?1",
                rusqlite::params![gap_id, gap.description, severity, gap.retry_count],
            )
            .map_err(store_err)?;
            return Uuid::parse_str(&gap_id).map_err(store_err);
        }

        let gap_id = Uuid::new_v4();
        db.execute(
            "INSERT INTO knowledge_gaps
               (gap_id, tenant_id, learner_id, topic_id, description, severity, retry_count, identified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                gap_id.to_string(),
                tenant_id.to_string(),
                learner_id.to_string(),
                gap.topic_id.map(|t| t.to_string()),
                gap.description,
                severity,
                gap.retry_count,
                now,
            ],
        )
        .map_err(store_err)?;
        Ok(gap_id)
    }

    pub fn open_gaps(&self, tenant_id: Uuid, learner_id: Uuid) -> Result<Vec<KnowledgeGap>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT topic_id, description, severity, retry_count
                 FROM knowledge_gaps
                 WHERE tenant_id = ?1 AND learner_id = ?2 AND resolved_at IS NULL",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![tenant_id.to_string(), learner_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                },
            )
            .map_err(store_err)?;

        let mut gaps = Vec::new();
        for row in rows {
            let (topic_id, description, severity, retry_count) = row.map_err(store_err)?;
            gaps.push(KnowledgeGap {
                topic_id: topic_id
                    .map(|t| Uuid::parse_str(&t).map_err(store_err))
                    .transpose()?,
                description,
                severity: match severity.as_str() {
                    "low" => GapSeverity::Low,
                    "high" => GapSeverity::High,
                    _ => GapSeverity::Medium,
                },
                retry_count,
            });
        }
        Ok(gaps)
    }

    // ── Mnemonics & verified content ───────────────────────────

    pub fn insert_mnemonic(
        &self,
        tenant_id: Uuid,
        concept_id: Option<Uuid>,
        device: &MnemonicDevice,
    ) -> Result<Uuid> {
        let db = self.db.lock();
        let device_id = Uuid::new_v4();
        let strategy = serde_json::to_value(device.strategy())?
            .as_str()
            .unwrap_or("acronym")
            .to_string();
        db.execute(
            "INSERT INTO mnemonic_devices (device_id, tenant_id, concept_id, strategy, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                device_id.to_string(),
                tenant_id.to_string(),
                concept_id.map(|c| c.to_string()),
                strategy,
                serde_json::to_string(device)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(device_id)
    }

    pub fn insert_verified_content(
        &self,
        tenant_id: Uuid,
        concept_id: Option<Uuid>,
        content: &str,
        sources: &[SourceRef],
        confidence: f64,
    ) -> Result<Uuid> {
        let db = self.db.lock();
        let content_id = Uuid::new_v4();
        db.execute(
            "INSERT INTO verified_content (content_id, tenant_id, concept_id, content, sources, confidence, verified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                content_id.to_string(),
                tenant_id.to_string(),
                concept_id.map(|c| c.to_string()),
                content,
                serde_json::to_string(sources)?,
                confidence,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(content_id)
    }

    // ── Authority sources ──────────────────────────────────────

    pub fn insert_authority_source(&self, source: &AuthoritySource) -> Result<Uuid> {
        let db = self.db.lock();
        let source_id = Uuid::new_v4();
        db.execute(
            "INSERT INTO authority_sources (source_id, name, base_url, trust_score, domain_tags)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                source_id.to_string(),
                source.name,
                source.base_url,
                source.trust_score,
                serde_json::to_string(&source.domain_tags)?,
            ],
        )
        .map_err(store_err)?;
        Ok(source_id)
    }

    /// Sources matching any of the given domain tags with at least the
    /// given trust score, best-trusted first. Empty tags match everything.
    pub fn authority_sources(
        &self,
        domain_tags: &[String],
        min_trust_score: f64,
    ) -> Result<Vec<AuthoritySource>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT name, base_url, trust_score, domain_tags
                 FROM authority_sources
                 WHERE trust_score >= ?1
                 ORDER BY trust_score DESC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([min_trust_score], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(store_err)?;

        let mut sources = Vec::new();
        for row in rows {
            let (name, base_url, trust_score, tags_json) = row.map_err(store_err)?;
            let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
            let matches = domain_tags.is_empty() || tags.iter().any(|t| domain_tags.contains(t));
            if matches {
                sources.push(AuthoritySource {
                    name,
                    base_url,
                    trust_score,
                    domain_tags: tags,
                });
            }
        }
        Ok(sources)
    }

    // ── Session snapshots ──────────────────────────────────────

    pub fn save_snapshot(&self, state: &SessionState) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO session_snapshots (session_id, learner_id, stage, state, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
               stage = excluded.stage,
               state = excluded.state,
               updated_at = excluded.updated_at",
            rusqlite::params![
                state.session_id.to_string(),
                state.learner_id.to_string(),
                state.stage.to_string(),
                serde_json::to_string(state)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn load_snapshot(&self, session_id: Uuid) -> Result<Option<SessionState>> {
        let db = self.db.lock();
        let raw: Option<String> = db
            .query_row(
                "SELECT state FROM session_snapshots WHERE session_id = ?1",
                [session_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;

        raw.map(|s| serde_json::from_str(&s).map_err(MentorError::from))
            .transpose()
    }
}

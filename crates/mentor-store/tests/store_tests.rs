use mentor_core::{
    AuthoritySource, ComprehensionQuestion, ConfidenceLevel, GapSeverity, KnowledgeGap,
    MnemonicDevice, SessionState, SourceRef, Stage,
};
use mentor_store::{ConceptRow, SqliteStore, TopicRow};
use uuid::Uuid;

fn store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

#[test]
fn test_open_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mentor.db");
    let store = SqliteStore::open(&path).unwrap();
    drop(store);
    assert!(path.exists());
}

#[test]
fn test_concept_upsert_and_list() {
    let store = store();
    let tenant = Uuid::new_v4();
    let topic = Uuid::new_v4();
    store
        .upsert_topic(&TopicRow {
            topic_id: topic,
            tenant_id: tenant,
            name: "Taxation".into(),
        })
        .unwrap();

    let concept_id = Uuid::new_v4();
    store
        .upsert_concept(&ConceptRow {
            concept_id,
            tenant_id: tenant,
            topic_id: Some(topic),
            name: "VAT".into(),
            explanation: Some("Consumption tax".into()),
            formulas: Some("price * rate".into()),
            rules: None,
            embedding: Some(vec![0.1, 0.2, 0.3]),
        })
        .unwrap();

    // Update keeps the embedding when none is supplied
    store
        .upsert_concept(&ConceptRow {
            concept_id,
            tenant_id: tenant,
            topic_id: Some(topic),
            name: "Value added tax".into(),
            explanation: Some("Consumption tax".into()),
            formulas: Some("price * rate".into()),
            rules: None,
            embedding: None,
        })
        .unwrap();

    let concepts = store.concepts(tenant, Some(topic)).unwrap();
    assert_eq!(concepts.len(), 1);
    assert_eq!(concepts[0].name, "Value added tax");
    assert_eq!(concepts[0].embedding.as_deref(), Some(&[0.1f32, 0.2, 0.3][..]));

    // Scoped to a different topic - nothing
    assert!(store.concepts(tenant, Some(Uuid::new_v4())).unwrap().is_empty());
}

#[test]
fn test_mastery_upsert_is_idempotent_per_topic() {
    let store = store();
    let (tenant, learner, topic) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    store
        .upsert_mastery(tenant, learner, topic, ConfidenceLevel::Medium, &[])
        .unwrap();
    store
        .upsert_mastery(
            tenant,
            learner,
            topic,
            ConfidenceLevel::High,
            &["consumer pays".into()],
        )
        .unwrap();

    let records = store.mastery_for_learner(tenant, learner).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].confidence, ConfidenceLevel::High);
    assert_eq!(records[0].key_points, vec!["consumer pays"]);
    assert!(records[0].last_reviewed_at.is_some());
}

#[test]
fn test_gap_upsert_updates_unresolved() {
    let store = store();
    let (tenant, learner, topic) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let first = store
        .record_gap(
            tenant,
            learner,
            &KnowledgeGap {
                topic_id: Some(topic),
                description: "confused about rates".into(),
                severity: GapSeverity::Medium,
                retry_count: 2,
            },
        )
        .unwrap();
    let second = store
        .record_gap(
            tenant,
            learner,
            &KnowledgeGap {
                topic_id: Some(topic),
                description: "still confused".into(),
                severity: GapSeverity::High,
                retry_count: 3,
            },
        )
        .unwrap();

    assert_eq!(first, second);
    let gaps = store.open_gaps(tenant, learner).unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].description, "still confused");
    assert_eq!(gaps[0].severity, GapSeverity::High);
}

#[test]
fn test_mnemonic_and_verified_content_inserts() {
    let store = store();
    let tenant = Uuid::new_v4();

    store
        .insert_mnemonic(
            tenant,
            None,
            &MnemonicDevice::Acronym {
                acronym: "VAT".into(),
                full_terms: vec!["Value".into(), "Added".into(), "Tax".into()],
                memory_tip: "Value Added Tax".into(),
                explanation: "Each letter is a word".into(),
            },
        )
        .unwrap();

    store
        .insert_verified_content(
            tenant,
            None,
            "VAT reached 20% in 2011",
            &[SourceRef {
                title: "Revenue service".into(),
                url: "https://example.gov/vat".into(),
            }],
            0.9,
        )
        .unwrap();
}

#[test]
fn test_authority_sources_filter_by_tag_and_trust() {
    let store = store();
    store
        .insert_authority_source(&AuthoritySource {
            name: "Tax authority".into(),
            base_url: "https://tax.example.gov".into(),
            trust_score: 0.95,
            domain_tags: vec!["tax".into(), "law".into()],
        })
        .unwrap();
    store
        .insert_authority_source(&AuthoritySource {
            name: "Forum".into(),
            base_url: "https://forum.example.com".into(),
            trust_score: 0.3,
            domain_tags: vec!["tax".into()],
        })
        .unwrap();
    store
        .insert_authority_source(&AuthoritySource {
            name: "Physics journal".into(),
            base_url: "https://physics.example.org".into(),
            trust_score: 0.9,
            domain_tags: vec!["physics".into()],
        })
        .unwrap();

    let sources = store.authority_sources(&["tax".into()], 0.6).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "Tax authority");

    // Empty tags match everything above the trust bar
    let all = store.authority_sources(&[], 0.6).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].trust_score >= all[1].trust_score);
}

#[test]
fn test_session_snapshot_roundtrip() {
    let store = store();
    let mut state = SessionState::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "What is VAT?",
    );
    state.stage = Stage::AwaitingResponse;
    state.comprehension_questions.push(ComprehensionQuestion {
        text: "Who pays VAT?".into(),
        expected_key_points: vec!["the consumer".into()],
    });

    store.save_snapshot(&state).unwrap();

    let restored = store.load_snapshot(state.session_id).unwrap().unwrap();
    assert_eq!(restored.stage, Stage::AwaitingResponse);
    assert_eq!(restored.question_text, "What is VAT?");

    assert!(store.load_snapshot(Uuid::new_v4()).unwrap().is_none());
}

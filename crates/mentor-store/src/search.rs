use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use mentor_core::{Result, RetrievedConcept};
use mentor_oracle::EmbeddingProvider;

use crate::store::{ConceptRow, SqliteStore};

/// The similarity-search collaborator consumed by the teaching agent.
#[async_trait]
pub trait ConceptSearch: Send + Sync {
    /// Concepts most similar to the query, ordered best-first, filtered
    /// by the similarity threshold and optionally scoped to a topic.
    async fn search_similar(
        &self,
        query: &str,
        tenant_id: Uuid,
        top_k: usize,
        threshold: f32,
        topic_id: Option<Uuid>,
    ) -> Result<Vec<RetrievedConcept>>;
}

/// Similarity search over the concepts table.
///
/// Uses cosine similarity against stored embeddings when an embedding
/// provider is configured; otherwise falls back to word-overlap scoring,
/// so the system stays usable offline.
pub struct SqliteConceptSearch {
    store: Arc<SqliteStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SqliteConceptSearch {
    pub fn new(store: Arc<SqliteStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    fn concept_text(concept: &ConceptRow) -> String {
        let mut text = concept.name.clone();
        if let Some(ref e) = concept.explanation {
            text.push(' ');
            text.push_str(e);
        }
        text
    }

    /// Fraction of meaningful query words appearing in the concept text.
    fn keyword_score(query: &str, concept: &ConceptRow) -> f32 {
        let text = Self::concept_text(concept).to_lowercase();
        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower
            .split_whitespace()
            .filter(|w| w.len() >= 3)
            .collect();
        if words.is_empty() {
            return 0.0;
        }
        let hits = words.iter().filter(|w| text.contains(*w)).count();
        hits as f32 / words.len() as f32
    }

    fn into_retrieved(concept: ConceptRow, similarity: f32) -> RetrievedConcept {
        RetrievedConcept {
            concept_id: concept.concept_id,
            name: concept.name,
            explanation: concept.explanation,
            formulas: concept.formulas,
            rules: concept.rules,
            similarity,
        }
    }
}

#[async_trait]
impl ConceptSearch for SqliteConceptSearch {
    async fn search_similar(
        &self,
        query: &str,
        tenant_id: Uuid,
        top_k: usize,
        threshold: f32,
        topic_id: Option<Uuid>,
    ) -> Result<Vec<RetrievedConcept>> {
        let concepts = self.store.concepts(tenant_id, topic_id)?;

        let query_embedding = match &self.embedder {
            Some(embedder) => embedder.embed(&[query]).await?.into_iter().next(),
            None => None,
        };

        let mut scored: Vec<(ConceptRow, f32)> = concepts
            .into_iter()
            .map(|c| {
                let score = match (&query_embedding, &c.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => Self::keyword_score(query, &c),
                };
                (c, score)
            })
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(
            query,
            results = scored.len(),
            vector = query_embedding.is_some(),
            "concept search"
        );

        Ok(scored
            .into_iter()
            .map(|(c, score)| Self::into_retrieved(c, score))
            .collect())
    }
}

/// Compute cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_bounds() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_keyword_fallback_search() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = Uuid::new_v4();
        store
            .upsert_concept(&ConceptRow {
                concept_id: Uuid::new_v4(),
                tenant_id: tenant,
                topic_id: None,
                name: "Value added tax".into(),
                explanation: Some("A consumption tax levied at each stage.".into()),
                formulas: None,
                rules: None,
                embedding: None,
            })
            .unwrap();
        store
            .upsert_concept(&ConceptRow {
                concept_id: Uuid::new_v4(),
                tenant_id: tenant,
                topic_id: None,
                name: "Derivative".into(),
                explanation: Some("Measures the rate of change of a function.".into()),
                formulas: None,
                rules: None,
                embedding: None,
            })
            .unwrap();

        let search = SqliteConceptSearch::new(store, None);
        let results = search
            .search_similar("what is value added tax", tenant, 5, 0.3, None)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].name, "Value added tax");
    }

    #[tokio::test]
    async fn test_threshold_filters_unrelated_concepts() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = Uuid::new_v4();
        store
            .upsert_concept(&ConceptRow {
                concept_id: Uuid::new_v4(),
                tenant_id: tenant,
                topic_id: None,
                name: "Photosynthesis".into(),
                explanation: Some("How plants convert light into energy.".into()),
                formulas: None,
                rules: None,
                embedding: None,
            })
            .unwrap();

        let search = SqliteConceptSearch::new(store, None);
        let results = search
            .search_similar("compound interest calculation", tenant, 5, 0.5, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}

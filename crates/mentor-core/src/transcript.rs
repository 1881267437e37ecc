use serde::{Deserialize, Serialize};

use crate::action::ActionCall;
use crate::observation::Observation;

/// One request/observation pair within a reasoning cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub call: ActionCall,
    pub observation: Observation,
}

/// Append-only log of action requests and observations within one agent
/// invocation. Owned by a single cycle run and discarded after result
/// extraction - it is never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: ActionCall, observation: Observation) {
        self.entries.push(TranscriptEntry { call, observation });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest-first scan for the first observation the matcher accepts.
    pub fn find_latest<T>(&self, matcher: impl Fn(&Observation) -> Option<T>) -> Option<T> {
        self.entries
            .iter()
            .rev()
            .find_map(|e| matcher(&e.observation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_latest_prefers_newest() {
        let mut t = Transcript::new();
        t.push(
            ActionCall::new("generate_explanation", json!({})),
            Observation::Explanation {
                text: "first".into(),
                style: crate::state::TeachingStyle::Guided,
            },
        );
        t.push(
            ActionCall::new("generate_explanation", json!({})),
            Observation::Explanation {
                text: "second".into(),
                style: crate::state::TeachingStyle::Guided,
            },
        );

        let latest = t.find_latest(|obs| match obs {
            Observation::Explanation { text, .. } => Some(text.clone()),
            _ => None,
        });
        assert_eq!(latest.as_deref(), Some("second"));
    }

    #[test]
    fn test_error_entries_are_retained() {
        let mut t = Transcript::new();
        t.push(
            ActionCall::new("search_concepts", json!({"query": "vat"})),
            Observation::Error {
                message: "timeout".into(),
            },
        );
        assert_eq!(t.len(), 1);
        assert!(t.entries()[0].observation.is_error());
    }
}

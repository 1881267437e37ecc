use tracing::warn;

use mentor_core::Transcript;

/// Pull the latest observation a matcher accepts out of a transcript, or
/// fall back to the task's default.
///
/// A missing tag is the `ExtractionMismatch` condition: logged, never
/// fatal - the caller receives the default output and the session keeps
/// moving.
pub fn extract_or_default<T: Default>(
    transcript: &Transcript,
    task: &str,
    expected: &str,
    matcher: impl Fn(&mentor_core::Observation) -> Option<T>,
) -> T {
    match transcript.find_latest(matcher) {
        Some(value) => value,
        None => {
            warn!(task, expected, "extraction mismatch, using default");
            T::default()
        }
    }
}

/// Like [`extract_or_default`] but for optional outputs where absence is
/// an expected outcome rather than a mismatch.
pub fn extract_optional<T>(
    transcript: &Transcript,
    matcher: impl Fn(&mentor_core::Observation) -> Option<T>,
) -> Option<T> {
    transcript.find_latest(matcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::{ActionCall, Observation, TeachingStyle};
    use serde_json::json;

    #[test]
    fn test_extract_or_default_returns_default_on_mismatch() {
        let transcript = Transcript::new();
        let text = extract_or_default(&transcript, "generate_explanation", "explanation", |obs| {
            match obs {
                Observation::Explanation { text, .. } => Some(text.clone()),
                _ => None,
            }
        });
        assert_eq!(text, String::default());
    }

    #[test]
    fn test_extract_or_default_finds_tagged_observation() {
        let mut transcript = Transcript::new();
        transcript.push(
            ActionCall::new("generate_explanation", json!({})),
            Observation::Explanation {
                text: "VAT is a consumption tax.".into(),
                style: TeachingStyle::Guided,
            },
        );
        let text = extract_or_default(&transcript, "generate_explanation", "explanation", |obs| {
            match obs {
                Observation::Explanation { text, .. } => Some(text.clone()),
                _ => None,
            }
        });
        assert_eq!(text, "VAT is a consumption tax.");
    }
}

//! Mock oracle for deterministic testing.
//!
//! Returns pre-configured replies without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use mentor_core::{ActionCall, MentorError, Result};

use crate::provider::*;

/// A pre-configured reply from the mock oracle.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Action { name: String, arguments: serde_json::Value },
    Error(String),
}

/// A mock oracle that returns queued replies in order.
///
/// # Example
/// ```
/// use mentor_oracle::mock::MockOracle;
/// let oracle = MockOracle::new()
///     .with_action("search_concepts", serde_json::json!({"query": "vat"}))
///     .with_text("done");
/// ```
/// Clones share the same queues, so a test can keep a handle and queue
/// further replies after the oracle has been handed to the system under
/// test.
#[derive(Clone)]
pub struct MockOracle {
    replies: Arc<Mutex<Vec<MockReply>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<OracleRequest>>>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Queue a terminal text reply.
    pub fn with_text(self, text: &str) -> Self {
        self.replies.lock().push(MockReply::Text(text.to_string()));
        self
    }

    /// Queue an action request.
    pub fn with_action(self, name: &str, arguments: serde_json::Value) -> Self {
        self.replies.lock().push(MockReply::Action {
            name: name.to_string(),
            arguments,
        });
        self
    }

    /// Queue an error reply.
    pub fn with_error(self, message: &str) -> Self {
        self.replies.lock().push(MockReply::Error(message.to_string()));
        self
    }

    /// Queue a reply after construction (for mutable access patterns).
    pub fn queue(&self, reply: MockReply) {
        self.replies.lock().push(reply);
    }

    /// Queue a terminal text reply on a shared handle.
    pub fn push_text(&self, text: &str) {
        self.queue(MockReply::Text(text.to_string()));
    }

    /// Queue an action request on a shared handle.
    pub fn push_action(&self, name: &str, arguments: serde_json::Value) {
        self.queue(MockReply::Action {
            name: name.to_string(),
            arguments,
        });
    }

    /// All requests made so far.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<OracleRequest>>> {
        Arc::clone(&self.requests)
    }

    fn next_reply(&self) -> MockReply {
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            MockReply::Text("(mock: no more queued replies)".to_string())
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl Oracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.requests.lock().push(request.clone());

        match self.next_reply() {
            MockReply::Text(t) => Ok(OracleReply::Text(t)),
            MockReply::Action { name, arguments } => {
                Ok(OracleReply::Action(ActionCall::new(name, arguments)))
            }
            MockReply::Error(message) => Err(MentorError::Oracle(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::Transcript;

    fn request(input: &str) -> OracleRequest {
        OracleRequest {
            system: "test".into(),
            input: input.into(),
            transcript: Transcript::new(),
            actions: vec![],
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_mock_text_reply() {
        let oracle = MockOracle::new().with_text("hello");
        let reply = oracle.complete(&request("hi")).await.unwrap();
        assert_eq!(reply.as_text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_mock_action_reply() {
        let oracle =
            MockOracle::new().with_action("search_concepts", serde_json::json!({"query": "vat"}));
        let reply = oracle.complete(&request("explain vat")).await.unwrap();
        match reply {
            OracleReply::Action(call) => {
                assert_eq!(call.name, "search_concepts");
                assert_eq!(call.arguments["query"], "vat");
            }
            OracleReply::Text(_) => panic!("expected an action reply"),
        }
    }

    #[tokio::test]
    async fn test_mock_error_reply() {
        let oracle = MockOracle::new().with_error("HTTP 429: rate limited");
        assert!(oracle.complete(&request("hi")).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_replies_in_order_then_drained() {
        let oracle = MockOracle::new().with_text("first").with_text("second");
        let r1 = oracle.complete(&request("a")).await.unwrap();
        let r2 = oracle.complete(&request("b")).await.unwrap();
        let r3 = oracle.complete(&request("c")).await.unwrap();
        assert_eq!(r1.as_text(), Some("first"));
        assert_eq!(r2.as_text(), Some("second"));
        assert_eq!(r3.as_text(), Some("(mock: no more queued replies)"));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let oracle = MockOracle::new().with_text("ok");
        let _ = oracle.complete(&request("what is vat")).await;
        let recorded = oracle.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].input, "what is vat");
    }
}

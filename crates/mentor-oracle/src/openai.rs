use async_trait::async_trait;
use mentor_core::{ActionCall, MentorError, Result};
use std::time::Duration;
use tracing::debug;

use crate::provider::*;

/// OpenAI-compatible chat-completions oracle (works with OpenAI, Azure,
/// Together, vLLM, etc.)
pub struct OpenAiOracle {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Per-call deadline. None disables the deadline.
    request_timeout: Option<Duration>,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            model,
            request_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Use a custom base URL (for Azure, Together, vLLM, etc.)
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Set the per-call deadline. 0 disables it.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Render the request as a chat-completions message array. The
    /// transcript becomes assistant tool-call messages paired with tool
    /// results carrying the observation JSON.
    fn render_messages(&self, request: &OracleRequest) -> Vec<serde_json::Value> {
        let mut messages = vec![
            serde_json::json!({ "role": "system", "content": request.system }),
            serde_json::json!({ "role": "user", "content": request.input }),
        ];

        for entry in request.transcript.entries() {
            messages.push(serde_json::json!({
                "role": "assistant",
                "content": serde_json::Value::Null,
                "tool_calls": [{
                    "id": entry.call.id,
                    "type": "function",
                    "function": {
                        "name": entry.call.name,
                        "arguments": serde_json::to_string(&entry.call.arguments)
                            .unwrap_or_default(),
                    }
                }],
            }));
            messages.push(serde_json::json!({
                "role": "tool",
                "tool_call_id": entry.call.id,
                "content": serde_json::to_string(&entry.observation).unwrap_or_default(),
            }));
        }

        messages
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &OracleRequest) -> Result<OracleReply> {
        let messages = self.render_messages(request);

        let mut body = serde_json::json!({
            "model": &self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !request.actions.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .actions
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": a.name,
                            "description": a.description,
                            "parameters": a.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        debug!(model = %self.model, actions = request.actions.len(), "oracle request");

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send();

        let resp = match self.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, send).await.map_err(|_| {
                MentorError::OracleTimeout {
                    secs: deadline.as_secs(),
                }
            })?,
            None => send.await,
        }
        .map_err(|e| MentorError::Oracle(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MentorError::Oracle(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MentorError::Oracle(e.to_string()))?;

        let message = &data["choices"][0]["message"];

        // A requested action wins over any accompanying text.
        if let Some(calls) = message["tool_calls"].as_array() {
            if let Some(call) = calls.iter().find_map(|c| {
                Some(ActionCall {
                    id: c["id"].as_str()?.to_string(),
                    name: c["function"]["name"].as_str()?.to_string(),
                    arguments: serde_json::from_str(
                        c["function"]["arguments"].as_str().unwrap_or("{}"),
                    )
                    .unwrap_or_default(),
                })
            }) {
                return Ok(OracleReply::Action(call));
            }
        }

        Ok(OracleReply::Text(
            message["content"].as_str().unwrap_or("").to_string(),
        ))
    }
}

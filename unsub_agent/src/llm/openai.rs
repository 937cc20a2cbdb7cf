//! OpenAI-compatible LLM provider implementation.

use super::{check_status, sse_chunk_stream, ChunkStream, CompletionRequest, LLMProvider, LlmChunk, UsageMetadata};
use crate::error::AgentResult;
use async_trait::async_trait;

/// Default OpenAI API endpoint.
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model.
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible LLM provider.
///
/// Works with the OpenAI API and compatible endpoints (local models,
/// gateways) that implement streamed chat completions.
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            model: model.into(),
        }
    }

    /// Use a custom API endpoint (for compatible APIs).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Change the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": [{ "role": "user", "content": &request.prompt }],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(schema) = &request.response_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": schema, "strict": false },
            });
        }

        // `disable_thinking` has no portable equivalent across compatible endpoints
        body
    }
}

/// Parse one SSE payload into a chunk.
fn parse_event(data: &str) -> AgentResult<Option<LlmChunk>> {
    let json: serde_json::Value = serde_json::from_str(data)?;

    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let usage = json.get("usage").filter(|u| !u.is_null()).map(|u| {
        let count = |key: &str| u.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
        UsageMetadata {
            prompt_token_count: count("prompt_tokens"),
            candidates_token_count: count("completion_tokens"),
            total_token_count: count("total_tokens"),
        }
    });

    if text.is_none() && usage.is_none() {
        return Ok(None);
    }
    Ok(Some(LlmChunk { text, usage }))
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn stream(
        &self,
        request: &CompletionRequest,
        client: &reqwest::Client,
    ) -> AgentResult<ChunkStream> {
        let response = client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(sse_chunk_stream(response, parse_event))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

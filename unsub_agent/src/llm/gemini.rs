//! Google Gemini provider (streaming `generateContent`).

use super::{check_status, sse_chunk_stream, ChunkStream, CompletionRequest, LLMProvider, LlmChunk, UsageMetadata};
use crate::error::AgentResult;
use async_trait::async_trait;
use serde::Deserialize;

/// Default Gemini API base.
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini provider.
///
/// # Example
/// ```ignore
/// use unsub_agent::llm::{GeminiProvider, LlmClient};
///
/// let provider = GeminiProvider::new("key", "gemini-2.5-flash");
/// let llm = LlmClient::new(std::sync::Arc::new(provider), Default::default())?;
/// let response = llm.complete("demo", &llm.request("Say hi")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    model: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: model.into(),
        }
    }

    /// Use a custom API base (proxies, emulators).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut generation_config = serde_json::json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        });

        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = "application/json".into();
            generation_config["responseJsonSchema"] = schema.clone();
        }
        if request.disable_thinking {
            generation_config["thinkingConfig"] = serde_json::json!({ "thinkingBudget": 0 });
        }

        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": &request.prompt }] }],
            "generationConfig": generation_config,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Parse one SSE payload into a chunk.
fn parse_event(data: &str) -> AgentResult<Option<LlmChunk>> {
    let event: StreamEvent = serde_json::from_str(data)?;

    let text: String = event
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() && event.usage_metadata.is_none() {
        return Ok(None);
    }

    Ok(Some(LlmChunk {
        text: (!text.is_empty()).then_some(text),
        usage: event.usage_metadata,
    }))
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn stream(
        &self,
        request: &CompletionRequest,
        client: &reqwest::Client,
    ) -> AgentResult<ChunkStream> {
        let response = client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(request))
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(sse_chunk_stream(response, parse_event))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

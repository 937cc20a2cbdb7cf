//! LLM provider abstractions for unsub_agent.
//!
//! Providers stream; callers never see partial output. [`collect_stream`]
//! buffers every chunk before anything is parsed, and usage is read from the
//! last chunk that reports it.

mod gemini;
mod json;
mod openai;
mod sse;

pub use gemini::GeminiProvider;
pub use json::parse_json_response;
pub use openai::OpenAIProvider;
pub use sse::SseDecoder;

use crate::config::{AgentConfig, UsageStats};
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A stream of response chunks.
pub type ChunkStream = BoxStream<'static, AgentResult<LlmChunk>>;

/// LLM provider trait for abstracting different LLM APIs.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Start a streaming completion.
    async fn stream(
        &self,
        request: &CompletionRequest,
        client: &reqwest::Client,
    ) -> AgentResult<ChunkStream>;

    /// Provider name for logging/debugging.
    fn provider_name(&self) -> &'static str;

    /// Check if the provider is properly configured.
    fn is_configured(&self) -> bool;
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The prompt.
    pub prompt: String,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Max tokens to generate.
    pub max_tokens: u32,
    /// JSON schema the response must follow.
    pub response_schema: Option<serde_json::Value>,
    /// Ask the model to skip its reasoning phase.
    pub disable_thinking: bool,
}

impl CompletionRequest {
    /// A plain text request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 2048,
            response_schema: None,
            disable_thinking: false,
        }
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Constrain the response to a JSON schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Disable model reasoning.
    pub fn without_thinking(mut self) -> Self {
        self.disable_thinking = true;
        self
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_token_count: u64,
    /// Generated tokens.
    #[serde(default)]
    pub candidates_token_count: u64,
    /// Total tokens.
    #[serde(default)]
    pub total_token_count: u64,
}

/// One streamed piece of a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmChunk {
    /// Text delta.
    pub text: Option<String>,
    /// Usage, usually only on the final chunk.
    pub usage: Option<UsageMetadata>,
}

impl LlmChunk {
    /// A text chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            usage: None,
        }
    }

    /// A usage-only chunk.
    pub fn usage(usage: UsageMetadata) -> Self {
        Self {
            text: None,
            usage: Some(usage),
        }
    }
}

/// Fully buffered response.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// The generated text.
    pub content: String,
    /// Usage from the last chunk that carried it.
    pub usage: Option<UsageMetadata>,
}

/// Drain a stream into one response.
pub async fn collect_stream(mut stream: ChunkStream) -> AgentResult<CompletionResponse> {
    let mut response = CompletionResponse::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(text) = chunk.text {
            response.content.push_str(&text);
        }
        if chunk.usage.is_some() {
            response.usage = chunk.usage;
        }
    }

    Ok(response)
}

/// Map provider HTTP status codes onto agent errors.
pub(crate) async fn check_status(response: reqwest::Response) -> AgentResult<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AgentError::Llm("Authentication failed".to_string()));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::RateLimited);
    }
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(AgentError::Llm(format!("HTTP {}: {}", status, error_text)));
    }
    Ok(response)
}

/// Decode an SSE response body into chunks with a provider-specific parser.
pub(crate) fn sse_chunk_stream<F>(response: reqwest::Response, parse: F) -> ChunkStream
where
    F: Fn(&str) -> AgentResult<Option<LlmChunk>> + Send + 'static,
{
    decode_sse(response.bytes_stream(), parse)
}

/// Decode a raw SSE byte stream. An event still buffered when the bytes run
/// out is flushed as the last chunk.
pub(crate) fn decode_sse<S, B, F>(bytes: S, parse: F) -> ChunkStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    F: Fn(&str) -> AgentResult<Option<LlmChunk>> + Send + 'static,
{
    let state = Some((bytes.boxed(), SseDecoder::new()));

    futures::stream::unfold(state, |state| async move {
        let Some((mut bytes, mut decoder)) = state else {
            return None;
        };
        match bytes.next().await {
            Some(Ok(chunk)) => {
                let events = decoder.push(chunk.as_ref());
                Some((Ok(events), Some((bytes, decoder))))
            }
            Some(Err(e)) => Some((Err(AgentError::from(e)), None)),
            None => Some((Ok(decoder.finish().into_iter().collect()), None)),
        }
    })
    .flat_map(move |events: AgentResult<Vec<String>>| {
        let chunks: Vec<AgentResult<LlmChunk>> = match events {
            Ok(events) => events
                .iter()
                .filter_map(|data| parse(data).transpose())
                .collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(chunks)
    })
    .boxed()
}

/// Provider selection read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmSettings {
    /// Google Gemini.
    Gemini {
        /// API key.
        api_key: String,
        /// Model name.
        model: String,
    },
    /// OpenAI or a compatible endpoint.
    OpenAI {
        /// API key.
        api_key: String,
        /// Model name.
        model: String,
        /// Endpoint override.
        api_url: Option<String>,
    },
}

impl LlmSettings {
    /// Gemini when `GEMINI_API_KEY` is set, else OpenAI when `OPENAI_API_KEY`
    /// is set. `UNSUB_LLM_MODEL` overrides the model, `OPENAI_API_URL` the
    /// OpenAI endpoint.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let model = var("UNSUB_LLM_MODEL");

        if let Some(api_key) = var("GEMINI_API_KEY") {
            return Some(Self::Gemini {
                api_key,
                model: model.unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            });
        }

        var("OPENAI_API_KEY").map(|api_key| Self::OpenAI {
            api_key,
            model: model.unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
            api_url: var("OPENAI_API_URL"),
        })
    }

    /// Override the model.
    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Gemini { model, .. } | Self::OpenAI { model, .. } => *model = name.into(),
        }
        self
    }

    /// Build the provider.
    pub fn into_provider(self) -> Arc<dyn LLMProvider> {
        match self {
            Self::Gemini { api_key, model } => Arc::new(GeminiProvider::new(api_key, model)),
            Self::OpenAI {
                api_key,
                model,
                api_url,
            } => {
                let provider = OpenAIProvider::new(api_key, model);
                match api_url {
                    Some(url) => Arc::new(provider.with_api_url(url)),
                    None => Arc::new(provider),
                }
            }
        }
    }
}

/// Shared LLM access: one provider, one HTTP client, a concurrency ceiling,
/// a retry policy and usage counters.
///
/// Cheap to clone; clones share the semaphore and counters.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LLMProvider>,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    config: AgentConfig,
    usage: Arc<UsageStats>,
}

impl LlmClient {
    /// Create a client for a provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: AgentConfig) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AgentError::Http)?;

        Ok(Self {
            provider,
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_llm_calls)),
            config,
            usage: Arc::new(UsageStats::new()),
        })
    }

    /// Share usage counters with other components.
    pub fn with_usage(mut self, usage: Arc<UsageStats>) -> Self {
        self.usage = usage;
        self
    }

    /// Usage counters.
    pub fn usage(&self) -> &Arc<UsageStats> {
        &self.usage
    }

    /// Client configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Provider name.
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// A request pre-filled with the configured defaults.
    pub fn request(&self, prompt: impl Into<String>) -> CompletionRequest {
        CompletionRequest::new(prompt)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
    }

    /// Run a request to completion and return the buffered text.
    ///
    /// Transport and rate-limit failures are retried per [`RetryConfig`];
    /// an empty response is an error.
    ///
    /// [`RetryConfig`]: crate::config::RetryConfig
    pub async fn complete(
        &self,
        purpose: &'static str,
        request: &CompletionRequest,
    ) -> AgentResult<CompletionResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AgentError::Llm("Failed to acquire semaphore".to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.usage.increment_llm_calls(purpose);

            let result = match self.provider.stream(request, &self.client).await {
                Ok(stream) => collect_stream(stream).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(response) => {
                    if let Some(u) = response.usage {
                        self.usage.add_usage(
                            u.prompt_token_count,
                            u.candidates_token_count,
                            u.total_token_count,
                        );
                    }
                    if response.content.trim().is_empty() {
                        return Err(AgentError::EmptyResponse);
                    }
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_attempts => {
                    log::warn!(
                        "{} call via {} failed (attempt {}): {}",
                        purpose,
                        self.provider.provider_name(),
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.config.retry.delay_for(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a request and parse the buffered text as JSON.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        purpose: &'static str,
        request: &CompletionRequest,
    ) -> AgentResult<T> {
        let response = self.complete(purpose, request).await?;
        parse_json_response(&response.content)
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.provider_name())
            .field("config", &self.config)
            .finish()
    }
}

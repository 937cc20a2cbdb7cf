//! Core Agent implementation.

use crate::analyze::PageIntentAnalyzer;
use crate::browser::PageLauncher;
use crate::config::{AgentConfig, BatchConfig, ExtractionLimits, PageConfig, UsageSnapshot, UsageStats};
use crate::error::{AgentError, AgentResult};
use crate::extract::ElementExtractor;
use crate::ingest::IngestionPipeline;
use crate::llm::{GeminiProvider, LLMProvider, LlmClient, LlmSettings, OpenAIProvider};
use crate::mailbox::MailboxConnector;
use crate::orchestrator::UnsubscribeOrchestrator;
use crate::store::EmailStore;
use crate::verify::ResultVerifier;
use std::path::PathBuf;
use std::sync::Arc;
use unsub_agent_html::is_http_url;
use unsub_agent_types::{UnsubscribeOutcome, UnsubscribeTarget};

/// Most URLs a caller should hand to one batch. Enforced at the caller
/// boundary; the agent itself processes whatever it is given.
pub const MAX_URLS_PER_BATCH: usize = 10;

/// The unsubscribe agent.
///
/// Holds the optional LLM client, the page launcher and the orchestrator.
/// Safe to wrap in `Arc`; batches are sequential by design, so concurrent
/// callers each get their own sequential run.
///
/// # Example
/// ```rust,ignore
/// use unsub_agent::Agent;
///
/// let agent = Agent::builder()
///     .with_gemini("key", "gemini-2.5-flash")
///     .with_artifacts_dir("./artifacts")
///     .build()?;
///
/// let outcomes = agent
///     .run_unsubscribe_batch(&["https://news.example/unsub?u=1".to_string()], Some("me@example.com"))
///     .await;
/// ```
pub struct Agent {
    /// LLM access, shared by the analyzer and the verifier.
    llm: Option<LlmClient>,
    /// Analyze, act and verify loop.
    orchestrator: UnsubscribeOrchestrator,
    /// Usage statistics (atomic counters for lock-free updates).
    usage: Arc<UsageStats>,
}

impl Agent {
    /// Create a new agent builder.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Unsubscribe from each URL in order. Always returns one outcome per
    /// URL; URLs that are not absolute http(s) fail without a browser.
    pub async fn run_unsubscribe_batch(
        &self,
        urls: &[String],
        owner_email: Option<&str>,
    ) -> Vec<UnsubscribeOutcome> {
        if urls.len() > MAX_URLS_PER_BATCH {
            log::warn!(
                "batch of {} URLs is above the {} URL limit",
                urls.len(),
                MAX_URLS_PER_BATCH
            );
        }

        let mut outcomes: Vec<Option<UnsubscribeOutcome>> = Vec::with_capacity(urls.len());
        let mut targets = Vec::new();

        for url in urls {
            let url = url.trim();
            if is_http_url(url) {
                targets.push(UnsubscribeTarget::new(url).with_owner_email(owner_email));
                outcomes.push(None);
            } else {
                log::warn!("rejecting non-http unsubscribe target {:?}", url);
                outcomes.push(Some(UnsubscribeOutcome::failure(url, "not an http(s) URL")));
            }
        }

        let mut ran = self.orchestrator.run_batch(&targets).await.into_iter();
        outcomes
            .into_iter()
            .map(|slot| {
                slot.or_else(|| ran.next())
                    .unwrap_or_else(|| UnsubscribeOutcome::failure("", "missing outcome"))
            })
            .collect()
    }

    /// Unsubscribe from a single target.
    pub async fn unsubscribe(&self, target: &UnsubscribeTarget) -> UnsubscribeOutcome {
        self.orchestrator.unsubscribe(target).await
    }

    /// An ingestion pipeline that shares this agent's LLM client.
    pub fn ingestion(
        &self,
        connector: Arc<dyn MailboxConnector>,
        store: Arc<dyn EmailStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(connector, store, self.llm.clone())
    }

    /// The LLM client, if one is configured.
    pub fn llm(&self) -> Option<&LlmClient> {
        self.llm.as_ref()
    }

    /// Get usage statistics.
    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Get the raw usage stats (for advanced use).
    pub fn usage_stats(&self) -> &Arc<UsageStats> {
        &self.usage
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("llm", &self.llm)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// Agent builder for configuring and creating agents.
pub struct AgentBuilder {
    config: AgentConfig,
    page_config: PageConfig,
    batch_config: BatchConfig,
    extraction_limits: ExtractionLimits,
    provider: Option<Arc<dyn LLMProvider>>,
    launcher: Option<Arc<dyn PageLauncher>>,
}

impl AgentBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            page_config: PageConfig::default(),
            batch_config: BatchConfig::default(),
            extraction_limits: ExtractionLimits::default(),
            provider: None,
            launcher: None,
        }
    }

    /// Set the LLM configuration.
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the browser configuration.
    pub fn with_page_config(mut self, config: PageConfig) -> Self {
        self.page_config = config;
        self
    }

    /// Set the batch configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = config;
        self
    }

    /// Set the element extraction caps.
    pub fn with_extraction_limits(mut self, limits: ExtractionLimits) -> Self {
        self.extraction_limits = limits;
        self
    }

    /// Write screenshots and the audit log under `dir`.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.batch_config.artifacts_dir = Some(dir.into());
        self
    }

    /// Use a custom LLM provider.
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Configure with the Gemini provider.
    pub fn with_gemini(mut self, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(Arc::new(GeminiProvider::new(api_key, model)));
        self
    }

    /// Configure with the OpenAI provider.
    pub fn with_openai(mut self, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(Arc::new(OpenAIProvider::new(api_key, model)));
        self
    }

    /// Configure with an OpenAI-compatible provider.
    pub fn with_openai_compatible(
        mut self,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.provider = Some(Arc::new(
            OpenAIProvider::new(api_key, model).with_api_url(api_url),
        ));
        self
    }

    /// Configure from settings, typically [`LlmSettings::from_env`].
    pub fn with_llm_settings(mut self, settings: LlmSettings) -> Self {
        self.provider = Some(settings.into_provider());
        self
    }

    /// Use a custom page launcher instead of Chrome.
    pub fn with_launcher(mut self, launcher: Arc<dyn PageLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Build the agent.
    pub fn build(self) -> AgentResult<Agent> {
        let usage = Arc::new(UsageStats::new());

        let llm = match self.provider {
            Some(provider) => {
                if !provider.is_configured() {
                    return Err(AgentError::NotConfigured("LLM provider api key"));
                }
                Some(LlmClient::new(provider, self.config)?.with_usage(usage.clone()))
            }
            None => {
                log::info!("no LLM provider configured, running on heuristics only");
                None
            }
        };

        let launcher = match self.launcher {
            Some(launcher) => launcher,
            None => default_launcher(&self.page_config)?,
        };

        let orchestrator = UnsubscribeOrchestrator::new(
            launcher,
            ElementExtractor::new(self.extraction_limits),
            PageIntentAnalyzer::new(llm.clone()),
            ResultVerifier::new(llm.clone()),
            self.page_config,
            self.batch_config,
            usage.clone(),
        );

        Ok(Agent {
            llm,
            orchestrator,
            usage,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "chrome")]
fn default_launcher(config: &PageConfig) -> AgentResult<Arc<dyn PageLauncher>> {
    Ok(Arc::new(crate::browser::ChromeLauncher::new(config.clone())))
}

#[cfg(not(feature = "chrome"))]
fn default_launcher(_config: &PageConfig) -> AgentResult<Arc<dyn PageLauncher>> {
    Err(AgentError::NotConfigured(
        "page launcher (enable the `chrome` feature or call with_launcher)",
    ))
}

//! # Unsub Agent
//!
//! An autonomous unsubscribe agent plus the email ingestion pipeline that
//! feeds it links.
//!
//! ## Features
//!
//! - **One browser per URL**: every unsubscribe attempt runs in a fresh,
//!   isolated browsing context that is always torn down
//! - **Heuristics first**: the LLM is consulted only when cheap checks are
//!   inconclusive, and every LLM failure degrades to a safe default
//! - **Multiple LLM providers**: Gemini, OpenAI and OpenAI-compatible APIs
//! - **Browser automation**: Chrome support via chromiumoxide (`chrome` feature)
//! - **Ingestion**: idempotent, rate-limited mailbox import with
//!   confidence-gated categorization
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use unsub_agent::{Agent, LlmSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut builder = Agent::builder().with_artifacts_dir("./artifacts");
//!     if let Some(settings) = LlmSettings::from_env() {
//!         builder = builder.with_llm_settings(settings);
//!     }
//!     let agent = builder.build()?;
//!
//!     let urls = vec!["https://news.example/unsubscribe?u=42".to_string()];
//!     for outcome in agent.run_unsubscribe_batch(&urls, Some("me@example.com")).await {
//!         println!("{}: {} ({})", outcome.url, outcome.succeeded, outcome.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Ingestion
//!
//! ```rust,ignore
//! use unsub_agent::{FanOut, MemoryStore};
//! use unsub_agent_types::SyncOptions;
//! use std::sync::Arc;
//!
//! let pipeline = agent.ingestion(connector, Arc::new(MemoryStore::new()));
//! let results = pipeline
//!     .run_ingestion_and_classification(&account_ids, &SyncOptions::default(), FanOut::Parallel)
//!     .await;
//! ```
//!
//! ## Feature Flags
//!
//! - `chrome` - Browser automation via chromiumoxide

#![warn(missing_docs)]

mod agent;
mod analyze;
mod artifacts;
pub mod browser;
mod classify;
mod config;
mod error;
mod executor;
mod extract;
mod ingest;
pub mod llm;
pub mod mailbox;
mod message;
mod orchestrator;
pub mod prompts;
mod rate_limit;
mod store;
mod verify;

#[cfg(test)]
mod test_support;

// Re-exports
pub use agent::{Agent, AgentBuilder, MAX_URLS_PER_BATCH};
pub use analyze::{PageIntentAnalyzer, MIN_SIGNAL_CHARS};
pub use artifacts::{ArtifactStore, Phase, AUDIT_FILE};
pub use browser::{PageDriver, PageLauncher, TextScope};
pub use classify::{accept_category, CategoryDecision, Classifier};
pub use config::{
    AgentConfig, BatchConfig, ClassifierConfig, ExtractionLimits, PageConfig, RateLimitConfig,
    RetryConfig, UsageSnapshot, UsageStats, DEFAULT_USER_AGENT,
};
pub use error::{AgentError, AgentResult};
pub use executor::{ActionExecutor, Attempt, ExecutionReport};
pub use extract::{extraction_script, mentions_keyword, ElementExtractor, RawPageElements};
pub use ingest::{FanOut, IngestionPipeline};
pub use llm::{CompletionRequest, CompletionResponse, LLMProvider, LlmClient, LlmSettings};
pub use mailbox::{MailboxApi, MailboxConnector, MailboxError, MailboxSession, RateLimitedMailbox};
pub use message::{accept_llm_link, parse_message};
pub use orchestrator::UnsubscribeOrchestrator;
pub use rate_limit::{RateLimiter, RatePermit};
pub use store::{ClassificationUpdate, EmailStore, MemoryStore};
pub use verify::{heuristic_verdict, ResultVerifier};

// The data types travel with the agent.
pub use unsub_agent_types;

//! Configuration types for unsub_agent.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Fixed desktop user agent presented by every browsing context.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// LLM client configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Max concurrent LLM calls.
    pub max_concurrent_llm_calls: usize,

    /// Default LLM temperature (0.0 - 2.0).
    pub temperature: f32,

    /// Max tokens for LLM response.
    pub max_tokens: u32,

    /// Request timeout.
    pub timeout: Duration,

    /// Retry configuration.
    pub retry: RetryConfig,

    /// Max raw HTML bytes sent to the analyzer when extraction finds nothing.
    pub html_max_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_llm_calls: 5,
            temperature: 0.1,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            html_max_bytes: 24_000,
        }
    }
}

impl AgentConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max concurrent LLM calls.
    pub fn with_max_concurrent_llm_calls(mut self, n: usize) -> Self {
        self.max_concurrent_llm_calls = n.max(1);
        self
    }

    /// Set LLM temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp.clamp(0.0, 2.0);
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry config.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set HTML max bytes.
    pub fn with_html_max_bytes(mut self, bytes: usize) -> Self {
        self.html_max_bytes = bytes;
        self
    }
}

/// Retry configuration.
///
/// Only transport and rate-limit failures are retried. A response that does
/// not parse is handed to the caller's fallback instead.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Max attempts, including the first.
    pub max_attempts: usize,
    /// Backoff delay between attempts; doubles each retry.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts.
    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set backoff delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: usize) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(6);
        self.backoff.saturating_mul(factor)
    }
}

/// Browsing context configuration.
#[derive(Debug, Clone)]
pub struct PageConfig {
    /// User agent for every page.
    pub user_agent: String,
    /// Bound on a single navigation.
    pub navigation_timeout: Duration,
    /// Bound on any other single page operation.
    pub step_timeout: Duration,
    /// How long to wait for a navigation after a click or submit.
    pub post_action_wait: Duration,
    /// Fixed delay after the navigation wait.
    pub settle_delay: Duration,
    /// Run without a visible window.
    pub headless: bool,
    /// Pass `--no-sandbox` (containers).
    pub no_sandbox: bool,
    /// Chrome executable; `CHROME_BIN` when unset.
    pub chrome_executable: Option<PathBuf>,
    /// Viewport width and height.
    pub viewport: (u32, u32),
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(10),
            post_action_wait: Duration::from_secs(5),
            settle_delay: Duration::from_millis(1500),
            headless: true,
            no_sandbox: false,
            chrome_executable: std::env::var_os("CHROME_BIN").map(PathBuf::from),
            viewport: (1366, 900),
        }
    }
}

impl PageConfig {
    /// Create a new page config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Set the navigation timeout.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the per-step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the post-action navigation wait.
    pub fn with_post_action_wait(mut self, wait: Duration) -> Self {
        self.post_action_wait = wait;
        self
    }

    /// Set the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Toggle headless mode.
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Toggle `--no-sandbox`.
    pub fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    /// Set the Chrome executable.
    pub fn with_chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }
}

/// Unsubscribe batch configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Delay between consecutive URLs.
    pub inter_request_delay: Duration,
    /// Where screenshots and the audit log go; inline only when unset.
    pub artifacts_dir: Option<PathBuf>,
    /// Append each outcome to `outcomes.jsonl` in the artifacts dir.
    pub audit_log: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_request_delay: Duration::from_secs(1),
            artifacts_dir: None,
            audit_log: true,
        }
    }
}

impl BatchConfig {
    /// Create a new batch config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inter-request delay.
    pub fn with_inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    /// Set the artifacts directory.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Toggle the audit log.
    pub fn with_audit_log(mut self, enabled: bool) -> Self {
        self.audit_log = enabled;
        self
    }
}

/// Bounds on the page snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionLimits {
    /// Max forms kept.
    pub max_forms: usize,
    /// Max elements kept per form.
    pub max_form_elements: usize,
    /// Max buttons kept.
    pub max_buttons: usize,
    /// Max links kept.
    pub max_links: usize,
    /// Max relevant sections kept.
    pub max_sections: usize,
    /// Max bytes of a single section.
    pub max_section_bytes: usize,
    /// Total byte budget for the snapshot.
    pub max_total_bytes: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_forms: 10,
            max_form_elements: 40,
            max_buttons: 50,
            max_links: 50,
            max_sections: 20,
            max_section_bytes: 8 * 1024,
            max_total_bytes: 256 * 1024,
        }
    }
}

/// Classification stage configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Minimum confidence for a category assignment.
    pub confidence_threshold: f32,
    /// Delay between per-email LLM calls.
    pub call_spacing: Duration,
    /// Re-run every stored email instead of only the incomplete ones.
    pub reclassify: bool,
    /// Max characters of email body put in a prompt.
    pub max_body_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            call_spacing: Duration::from_millis(250),
            reclassify: false,
            max_body_chars: 6_000,
        }
    }
}

impl ClassifierConfig {
    /// Create a new classifier config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the per-call spacing.
    pub fn with_call_spacing(mut self, spacing: Duration) -> Self {
        self.call_spacing = spacing;
        self
    }

    /// Toggle the backfill mode.
    pub fn with_reclassify(mut self, reclassify: bool) -> Self {
        self.reclassify = reclassify;
        self
    }
}

/// Mailbox provider rate limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Max in-flight calls.
    pub max_concurrent: usize,
    /// Minimum gap between the start of two calls.
    pub min_spacing: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_spacing: Duration::from_millis(100),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit config.
    pub fn new(max_concurrent: usize, min_spacing: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            min_spacing,
        }
    }
}

/// Usage statistics for tracking agent operations.
///
/// Uses atomic counters for lock-free concurrent updates.
#[derive(Debug, Default)]
pub struct UsageStats {
    /// Total LLM prompt tokens used.
    pub prompt_tokens: AtomicU64,
    /// Total LLM candidate tokens used.
    pub candidate_tokens: AtomicU64,
    /// Total tokens as reported by the provider.
    pub total_tokens: AtomicU64,
    /// Total LLM calls made.
    pub llm_calls: AtomicU64,
    /// Browser sessions launched.
    pub browser_sessions: AtomicU64,
    /// LLM calls by purpose (lock-free via DashMap).
    pub calls_by_purpose: DashMap<&'static str, AtomicU64>,
}

impl UsageStats {
    /// Create new usage stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the usage reported by a finished stream.
    pub fn add_usage(&self, prompt: u64, candidates: u64, total: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.candidate_tokens.fetch_add(candidates, Ordering::Relaxed);
        self.total_tokens.fetch_add(total, Ordering::Relaxed);
    }

    /// Increment LLM call count.
    pub fn increment_llm_calls(&self, purpose: &'static str) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        self.calls_by_purpose
            .entry(purpose)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment browser session count.
    pub fn increment_browser_sessions(&self) {
        self.browser_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// LLM calls made for one purpose.
    pub fn calls_for(&self, purpose: &str) -> u64 {
        self.calls_by_purpose
            .get(purpose)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get a snapshot of all stats.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            candidate_tokens: self.candidate_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            browser_sessions: self.browser_sessions.load(Ordering::Relaxed),
            calls_by_purpose: self
                .calls_by_purpose
                .iter()
                .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Snapshot of usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Total LLM prompt tokens.
    pub prompt_tokens: u64,
    /// Total LLM candidate tokens.
    pub candidate_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Total LLM calls.
    pub llm_calls: u64,
    /// Browser sessions launched.
    pub browser_sessions: u64,
    /// LLM calls by purpose.
    pub calls_by_purpose: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::new()
            .with_temperature(5.0)
            .with_max_concurrent_llm_calls(0)
            .with_retry(RetryConfig::new().with_max_attempts(0));

        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.max_concurrent_llm_calls, 1);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let retry = RetryConfig::new().with_backoff(Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_page_defaults() {
        let page = PageConfig::default();
        assert_eq!(page.navigation_timeout, Duration::from_secs(30));
        assert_eq!(page.user_agent, DEFAULT_USER_AGENT);
        assert!(page.headless);
    }

    #[test]
    fn test_classifier_threshold_default() {
        assert_eq!(ClassifierConfig::default().confidence_threshold, 0.5);
        assert_eq!(BatchConfig::default().inter_request_delay, Duration::from_secs(1));
        assert_eq!(ExtractionLimits::default().max_total_bytes, 256 * 1024);
    }

    #[test]
    fn test_usage_stats_tracking() {
        let stats = UsageStats::new();

        stats.increment_llm_calls("analyze");
        stats.increment_llm_calls("analyze");
        stats.increment_llm_calls("verify");
        stats.increment_browser_sessions();
        stats.add_usage(100, 50, 160);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.llm_calls, 3);
        assert_eq!(snapshot.browser_sessions, 1);
        assert_eq!(snapshot.prompt_tokens, 100);
        assert_eq!(snapshot.candidate_tokens, 50);
        assert_eq!(snapshot.total_tokens, 160);
        assert_eq!(stats.calls_for("analyze"), 2);
        assert_eq!(snapshot.calls_by_purpose.get("verify"), Some(&1));
    }
}

//! Page Intent Analyzer: snapshot in, action plan out.

use crate::llm::LlmClient;
use crate::prompts::{action_plan_schema, render, ANALYZE_PAGE_PROMPT};
use unsub_agent_html::{clean_html_for_analysis, truncate_html};
use unsub_agent_types::{ActionPlan, PageSnapshot};

/// Below this many characters of extracted signal the raw page HTML is sent instead.
pub const MIN_SIGNAL_CHARS: usize = 100;

/// Turns a page snapshot into an [`ActionPlan`] with one LLM call.
#[derive(Debug, Clone)]
pub struct PageIntentAnalyzer {
    llm: Option<LlmClient>,
    html_max_bytes: usize,
}

impl PageIntentAnalyzer {
    /// Create an analyzer. Without an LLM every page gets the fallback plan.
    pub fn new(llm: Option<LlmClient>) -> Self {
        let html_max_bytes = llm
            .as_ref()
            .map(|l| l.config().html_max_bytes)
            .unwrap_or(24_000);
        Self { llm, html_max_bytes }
    }

    /// Prompt content for a page: the snapshot, or cleaned raw HTML when the
    /// snapshot carries too little signal.
    pub fn page_content(&self, snapshot: &PageSnapshot, raw_html: &str) -> (&'static str, String) {
        if snapshot.signal_len() >= MIN_SIGNAL_CHARS {
            return ("extracted elements, JSON", snapshot.to_prompt_json());
        }
        let cleaned = clean_html_for_analysis(raw_html);
        ("cleaned HTML", truncate_html(&cleaned, self.html_max_bytes).to_string())
    }

    /// Ask the model for a plan. Any failure yields [`ActionPlan::fallback`].
    pub async fn analyze_page(&self, url: &str, snapshot: &PageSnapshot, raw_html: &str) -> ActionPlan {
        let Some(llm) = &self.llm else {
            log::debug!("no llm configured, using fallback plan for {}", url);
            return ActionPlan::fallback();
        };

        let (kind, content) = self.page_content(snapshot, raw_html);
        if content.trim().is_empty() {
            log::debug!("nothing to analyze on {}, using fallback plan", url);
            return ActionPlan::fallback();
        }

        let prompt = render(
            ANALYZE_PAGE_PROMPT,
            &[("URL", url), ("KIND", kind), ("CONTENT", &content)],
        );
        let request = llm
            .request(prompt)
            .with_temperature(0.0)
            .with_schema(action_plan_schema())
            .without_thinking();

        match llm.complete_json::<ActionPlan>("analyze_page", &request).await {
            Ok(plan) => {
                let plan = plan.normalized();
                log::debug!("plan for {}: {}", url, plan.next_action);
                plan
            }
            Err(e) => {
                log::warn!("page analysis failed for {}, using fallback plan: {}", url, e);
                ActionPlan::fallback()
            }
        }
    }
}

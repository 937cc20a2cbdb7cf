//! Classification stage: summaries and confidence-gated categories.

use crate::config::ClassifierConfig;
use crate::error::{AgentError, AgentResult};
use crate::llm::LlmClient;
use crate::prompts::{
    category_schema, render, truncate_chars, CATEGORIZE_EMAIL_PROMPT, SUMMARIZE_EMAIL_PROMPT,
};
use crate::store::{ClassificationUpdate, EmailStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use unsub_agent_html::html_to_text;
use unsub_agent_types::{CategoryDefinition, EmailRecord, SyncResult};

/// Summaries longer than this are cut.
const MAX_SUMMARY_CHARS: usize = 500;

/// Model answer for categorization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDecision {
    /// Proposed category id, `None` for no match.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Model confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
    /// Short justification.
    #[serde(default)]
    pub reasoning: String,
}

/// Gate a decision: the id must be one of `categories` and the confidence
/// must reach `threshold`.
pub fn accept_category(
    decision: &CategoryDecision,
    categories: &[CategoryDefinition],
    threshold: f32,
) -> Option<(String, f32)> {
    let id = decision.category_id.as_deref()?.trim();
    if !categories.iter().any(|c| c.id == id) {
        log::debug!("rejecting unknown category id {:?}", id);
        return None;
    }
    if !decision.confidence.is_finite() || decision.confidence < threshold {
        return None;
    }
    Some((id.to_string(), decision.confidence.min(1.0)))
}

#[derive(Serialize)]
struct PromptCategory<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
}

/// Runs summarization and categorization over an account's stored emails.
pub struct Classifier {
    store: Arc<dyn EmailStore>,
    llm: Option<LlmClient>,
    config: ClassifierConfig,
}

impl Classifier {
    /// Create a classifier.
    pub fn new(store: Arc<dyn EmailStore>, llm: Option<LlmClient>, config: ClassifierConfig) -> Self {
        Self { store, llm, config }
    }

    /// Classify every email of the account that still needs it (or all of
    /// them in backfill mode). Counts and errors go into `result`.
    pub async fn classify_account(&self, account_id: &str, result: &mut SyncResult) {
        let Some(llm) = &self.llm else {
            log::debug!("no llm configured, skipping classification for {}", account_id);
            return;
        };

        let categories = match self.store.categories().await {
            Ok(categories) => categories,
            Err(e) => {
                result.push_error(e);
                return;
            }
        };
        let emails = match self.store.emails_for_account(account_id).await {
            Ok(emails) => emails,
            Err(e) => {
                result.push_error(e);
                return;
            }
        };

        let has_categories = !categories.is_empty();
        let reclassify = self.config.reclassify;
        let mut pending_calls = false;

        for email in emails
            .iter()
            .filter(|e| reclassify || e.needs_classification(has_categories))
        {
            let mut update = ClassificationUpdate::default();

            if reclassify || email.summary.is_none() {
                self.pace(&mut pending_calls).await;
                match self.summarize(llm, email).await {
                    Ok(summary) => {
                        update.summary = Some(summary);
                        result.summarized += 1;
                    }
                    Err(e) => {
                        log::warn!("summary failed for {}: {}", email.provider_message_id, e);
                        result.push_error(format!("summarize {}: {}", email.provider_message_id, e));
                    }
                }
            }

            if has_categories && (reclassify || email.category_id.is_none()) {
                self.pace(&mut pending_calls).await;
                match self.categorize(llm, email, &categories).await {
                    Ok(Some((id, confidence))) => {
                        update.category_id = Some(id);
                        update.ai_confidence = Some(confidence);
                        result.ai_categorized += 1;
                    }
                    Ok(None) => {
                        log::debug!("{} left uncategorized", email.provider_message_id);
                    }
                    Err(e) => {
                        log::warn!("categorization failed for {}: {}", email.provider_message_id, e);
                        result.push_error(format!("categorize {}: {}", email.provider_message_id, e));
                    }
                }
            }

            if update.is_empty() {
                continue;
            }
            if let Err(e) = self
                .store
                .apply_classification(account_id, &email.provider_message_id, update)
                .await
            {
                result.push_error(e);
            }
        }
    }

    /// Fixed gap between consecutive LLM calls.
    async fn pace(&self, pending: &mut bool) {
        if *pending && !self.config.call_spacing.is_zero() {
            tokio::time::sleep(self.config.call_spacing).await;
        }
        *pending = true;
    }

    fn prompt_body(&self, email: &EmailRecord) -> String {
        let body = match email.body_text.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(text) => text.to_string(),
            None => email.body_html.as_deref().map(html_to_text).unwrap_or_default(),
        };
        truncate_chars(body.trim(), self.config.max_body_chars).to_string()
    }

    async fn summarize(&self, llm: &LlmClient, email: &EmailRecord) -> AgentResult<String> {
        let body = self.prompt_body(email);
        let prompt = render(
            SUMMARIZE_EMAIL_PROMPT,
            &[("SUBJECT", &email.subject), ("FROM", &email.from), ("BODY", &body)],
        );
        let response = llm.complete("summarize_email", &llm.request(prompt)).await?;
        Ok(truncate_chars(response.content.trim(), MAX_SUMMARY_CHARS).to_string())
    }

    async fn categorize(
        &self,
        llm: &LlmClient,
        email: &EmailRecord,
        categories: &[CategoryDefinition],
    ) -> AgentResult<Option<(String, f32)>> {
        let listed: Vec<PromptCategory> = categories
            .iter()
            .map(|c| PromptCategory {
                id: &c.id,
                name: &c.name,
                description: &c.description,
            })
            .collect();
        let listed = serde_json::to_string_pretty(&listed).map_err(AgentError::from)?;
        let body = self.prompt_body(email);

        let prompt = render(
            CATEGORIZE_EMAIL_PROMPT,
            &[
                ("CATEGORIES", &listed),
                ("SUBJECT", &email.subject),
                ("FROM", &email.from),
                ("BODY", &body),
            ],
        );
        let request = llm
            .request(prompt)
            .with_temperature(0.0)
            .with_schema(category_schema())
            .without_thinking();

        let decision: CategoryDecision = llm.complete_json("categorize_email", &request).await?;
        Ok(accept_category(&decision, categories, self.config.confidence_threshold))
    }
}

//! Ingestion pipeline: list, dedupe, fetch, parse, store, archive, classify.

use crate::classify::Classifier;
use crate::config::{ClassifierConfig, RateLimitConfig};
use crate::error::AgentResult;
use crate::llm::LlmClient;
use crate::mailbox::{
    MailboxApi, MailboxConnector, MailboxError, MessageFormat, RateLimitedMailbox, INBOX_LABEL,
};
use crate::message::{accept_llm_link, parse_message};
use crate::prompts::{render, truncate_chars, EXTRACT_UNSUBSCRIBE_PROMPT};
use crate::store::EmailStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use unsub_agent_types::{EmailRecord, SyncOptions, SyncResult};

/// Largest page requested from the provider.
const LIST_PAGE_SIZE: usize = 100;

/// Max characters of body handed to the link extraction prompt.
const LINK_PROMPT_CHARS: usize = 12_000;

/// Body wording that makes a model pass for a missing link worthwhile.
const LINK_HINTS: [&str; 4] = ["unsubscribe", "opt out", "opt-out", "preferences"];

/// How accounts are processed relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOut {
    /// All accounts at once.
    #[default]
    Parallel,
    /// One account after another.
    Sequential,
}

/// Imports new messages for a set of accounts and classifies them.
pub struct IngestionPipeline {
    connector: Arc<dyn MailboxConnector>,
    store: Arc<dyn EmailStore>,
    llm: Option<LlmClient>,
    rate_limit: RateLimitConfig,
    classifier: Classifier,
}

impl IngestionPipeline {
    /// Create a pipeline. Without an LLM, link extraction is heuristic only
    /// and classification is skipped.
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        store: Arc<dyn EmailStore>,
        llm: Option<LlmClient>,
    ) -> Self {
        let classifier = Classifier::new(store.clone(), llm.clone(), ClassifierConfig::default());
        Self {
            connector,
            store,
            llm,
            rate_limit: RateLimitConfig::default(),
            classifier,
        }
    }

    /// Set the mailbox rate limits.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Set the classification options.
    pub fn with_classifier_config(mut self, config: ClassifierConfig) -> Self {
        self.classifier = Classifier::new(self.store.clone(), self.llm.clone(), config);
        self
    }

    /// Sync every account, then classify what is stored. Failures are
    /// reported per account and never abort the others.
    pub async fn run_ingestion_and_classification(
        &self,
        account_ids: &[String],
        options: &SyncOptions,
        fan_out: FanOut,
    ) -> Vec<SyncResult> {
        match fan_out {
            FanOut::Parallel => {
                futures::future::join_all(account_ids.iter().map(|id| self.sync_account(id, options)))
                    .await
            }
            FanOut::Sequential => {
                let mut results = Vec::with_capacity(account_ids.len());
                for id in account_ids {
                    results.push(self.sync_account(id, options).await);
                }
                results
            }
        }
    }

    /// Sync and classify one account.
    pub async fn sync_account(&self, account_id: &str, options: &SyncOptions) -> SyncResult {
        let mut result = SyncResult::new(account_id);

        let session = match self.connector.connect(account_id).await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("skipping account {}: {}", account_id, e);
                result.push_error(e);
                return result;
            }
        };

        let api: Arc<dyn MailboxApi> = Arc::new(RateLimitedMailbox::new(session.api, &self.rate_limit));

        if let Err(e) = self.ingest(&api, account_id, options, &mut result).await {
            log::warn!("ingestion for {} stopped: {}", account_id, e);
            result.push_error(e);
        }

        self.classifier.classify_account(account_id, &mut result).await;

        log::info!(
            "account {}: fetched {}, stored {}, skipped {}, archived {}, summarized {}, categorized {}, errors {}",
            account_id,
            result.fetched,
            result.stored,
            result.skipped,
            result.archived,
            result.summarized,
            result.ai_categorized,
            result.errors.len()
        );

        result
    }

    async fn ingest(
        &self,
        api: &Arc<dyn MailboxApi>,
        account_id: &str,
        options: &SyncOptions,
        result: &mut SyncResult,
    ) -> AgentResult<()> {
        let ids = list_ids(api.as_ref(), options).await?;
        let existing = self.store.existing_ids(account_id, &ids).await?;

        let listed = ids.len();
        let new_ids: Vec<String> = ids.into_iter().filter(|id| !existing.contains(id)).collect();
        result.skipped = listed - new_ids.len();

        if new_ids.is_empty() {
            log::debug!("account {}: nothing new among {} listed", account_id, listed);
            return Ok(());
        }

        let fetched: Vec<(String, Result<_, MailboxError>)> = stream::iter(new_ids)
            .map(|id| {
                let api = api.clone();
                async move {
                    let raw = api.get(&id, MessageFormat::Full).await;
                    (id, raw)
                }
            })
            .buffer_unordered(self.rate_limit.max_concurrent.max(1))
            .collect()
            .await;

        let mut records = Vec::with_capacity(fetched.len());
        for (id, raw) in fetched {
            match raw {
                Ok(raw) => {
                    result.fetched += 1;
                    let mut record = parse_message(account_id, &raw);
                    if record.unsubscribe_link.is_none() {
                        record.unsubscribe_link = self.extract_link_with_llm(&record).await;
                    }
                    records.push(record);
                }
                Err(e) => {
                    log::warn!("could not fetch {}: {}", id, e);
                    result.push_error(format!("fetch {}: {}", id, e));
                }
            }
        }

        let imported: Vec<String> = records.iter().map(|r| r.provider_message_id.clone()).collect();
        result.stored = self.store.insert_new(records).await?;

        if options.archive_after_import {
            for id in &imported {
                match api.modify(id, &[INBOX_LABEL]).await {
                    Ok(()) => result.archived += 1,
                    Err(e) => {
                        log::warn!("could not archive {}: {}", id, e);
                        result.push_error(format!("archive {}: {}", id, e));
                    }
                }
            }
        }

        Ok(())
    }

    /// Ask the model for a link the heuristics missed. The answer must occur
    /// in the body verbatim.
    async fn extract_link_with_llm(&self, record: &EmailRecord) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let body = record.content_for_prompt();
        let lower = body.to_ascii_lowercase();
        if !LINK_HINTS.iter().any(|hint| lower.contains(hint)) {
            return None;
        }

        let prompt = render(
            EXTRACT_UNSUBSCRIBE_PROMPT,
            &[("BODY", truncate_chars(body, LINK_PROMPT_CHARS))],
        );
        let request = llm.request(prompt).with_temperature(0.0).without_thinking();

        match llm.complete("extract_unsubscribe_link", &request).await {
            Ok(response) => {
                let link = accept_llm_link(&response.content, record);
                if link.is_none() {
                    log::debug!(
                        "discarded model link for {}: {:?}",
                        record.provider_message_id,
                        response.content.trim()
                    );
                }
                link
            }
            Err(e) => {
                log::warn!("link extraction failed for {}: {}", record.provider_message_id, e);
                None
            }
        }
    }
}

/// Page through the provider listing until `max_messages` ids are collected.
async fn list_ids(api: &dyn MailboxApi, options: &SyncOptions) -> Result<Vec<String>, MailboxError> {
    let mut ids: Vec<String> = Vec::new();
    let mut page_token: Option<String> = None;

    while ids.len() < options.max_messages {
        let want = (options.max_messages - ids.len()).min(LIST_PAGE_SIZE);
        let page = api.list(&options.query, page_token.as_deref(), want).await?;

        for id in page.ids {
            if ids.len() == options.max_messages {
                break;
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(ids)
}

//! Email persistence boundary.

use crate::error::AgentResult;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use unsub_agent_types::{CategoryDefinition, EmailRecord};

/// Classification results to write back onto a record. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationUpdate {
    /// New summary.
    pub summary: Option<String>,
    /// Accepted category.
    pub category_id: Option<String>,
    /// Confidence of the accepted category.
    pub ai_confidence: Option<f32>,
}

impl ClassificationUpdate {
    /// True when there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.category_id.is_none()
    }
}

/// Storage used by ingestion and classification.
///
/// Rows are keyed by account and provider message id. Inserts skip existing
/// rows; that is the only concurrency guard the pipeline relies on.
#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Which of `ids` are already stored for the account.
    async fn existing_ids(&self, account_id: &str, ids: &[String]) -> AgentResult<HashSet<String>>;

    /// Insert records, skipping ids that exist. Returns how many were inserted.
    async fn insert_new(&self, records: Vec<EmailRecord>) -> AgentResult<usize>;

    /// Every stored record of an account.
    async fn emails_for_account(&self, account_id: &str) -> AgentResult<Vec<EmailRecord>>;

    /// Write classification results onto one record of an account.
    async fn apply_classification(
        &self,
        account_id: &str,
        provider_message_id: &str,
        update: ClassificationUpdate,
    ) -> AgentResult<()>;

    /// The user's categories.
    async fn categories(&self) -> AgentResult<Vec<CategoryDefinition>>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    emails: DashMap<(String, String), EmailRecord>,
    categories: RwLock<Vec<CategoryDefinition>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the category list.
    pub fn with_categories(self, categories: Vec<CategoryDefinition>) -> Self {
        *self.categories.write() = categories;
        self
    }

    /// Look up one record.
    pub fn get(&self, account_id: &str, provider_message_id: &str) -> Option<EmailRecord> {
        self.emails
            .get(&key(account_id, provider_message_id))
            .map(|r| r.value().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn existing_ids(&self, account_id: &str, ids: &[String]) -> AgentResult<HashSet<String>> {
        Ok(ids
            .iter()
            .filter(|id| self.emails.contains_key(&key(account_id, id)))
            .cloned()
            .collect())
    }

    async fn insert_new(&self, records: Vec<EmailRecord>) -> AgentResult<usize> {
        let mut inserted = 0;
        for record in records {
            let id = key(&record.account_id, &record.provider_message_id);
            if let Entry::Vacant(slot) = self.emails.entry(id) {
                slot.insert(record);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn emails_for_account(&self, account_id: &str) -> AgentResult<Vec<EmailRecord>> {
        let mut records: Vec<EmailRecord> = self
            .emails
            .iter()
            .filter(|r| r.account_id == account_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.provider_message_id.cmp(&b.provider_message_id));
        Ok(records)
    }

    async fn apply_classification(
        &self,
        account_id: &str,
        provider_message_id: &str,
        update: ClassificationUpdate,
    ) -> AgentResult<()> {
        let Some(mut record) = self.emails.get_mut(&key(account_id, provider_message_id)) else {
            return Err(crate::error::AgentError::Store(format!(
                "no email {} for {}",
                provider_message_id, account_id
            )));
        };
        if let Some(summary) = update.summary {
            record.summary = Some(summary);
        }
        if let Some(category_id) = update.category_id {
            record.category_id = Some(category_id);
            record.ai_confidence = update.ai_confidence;
        }
        Ok(())
    }

    async fn categories(&self) -> AgentResult<Vec<CategoryDefinition>> {
        Ok(self.categories.read().clone())
    }
}

fn key(account_id: &str, provider_message_id: &str) -> (String, String) {
    (account_id.to_string(), provider_message_id.to_string())
}

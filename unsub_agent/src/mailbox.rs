//! Provider-neutral mailbox API.
//!
//! The wire protocol lives behind [`MailboxApi`]; token storage and refresh
//! live behind [`MailboxConnector`].

use crate::config::RateLimitConfig;
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Label removed from a message to archive it.
pub const INBOX_LABEL: &str = "INBOX";

/// Mailbox provider failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// The account has no token that can be used or refreshed.
    #[error("no usable access token for account {0}")]
    NoAccessToken(String),
    /// The provider rejected the call for quota reasons.
    #[error("mailbox quota exceeded")]
    QuotaExceeded,
    /// The message does not exist.
    #[error("message {0} not found")]
    NotFound(String),
    /// Any other provider failure.
    #[error("mailbox request failed: {0}")]
    Request(String),
}

/// One page of message ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Message ids, newest first.
    #[serde(default)]
    pub ids: Vec<String>,
    /// Token for the following page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// How much of a message to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Headers and every body part.
    Full,
    /// Headers only.
    Metadata,
}

/// A message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Body of a MIME part, base64url encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartBody {
    /// Encoded data.
    #[serde(default)]
    pub data: Option<String>,
    /// Decoded size in bytes.
    #[serde(default)]
    pub size: usize,
}

/// A MIME part; multipart parts nest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    /// MIME type, e.g. `text/plain` or `multipart/alternative`.
    #[serde(default)]
    pub mime_type: String,
    /// Part headers; the top-level part carries the message headers.
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Part body.
    #[serde(default)]
    pub body: Option<PartBody>,
    /// Child parts.
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Provider message id.
    pub id: String,
    /// Provider thread id.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Labels currently on the message.
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Receive time in epoch milliseconds.
    #[serde(default)]
    pub internal_date: Option<i64>,
    /// Root MIME part.
    #[serde(default)]
    pub payload: MessagePart,
}

/// The three calls the pipeline needs from a mail provider.
///
/// `modify` must be idempotent: removing a label that is not there succeeds.
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// List message ids matching a provider query.
    async fn list(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessagePage, MailboxError>;

    /// Fetch one message.
    async fn get(&self, id: &str, format: MessageFormat) -> Result<RawMessage, MailboxError>;

    /// Remove labels from a message.
    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<(), MailboxError>;
}

/// An authenticated mailbox for one account.
#[derive(Clone)]
pub struct MailboxSession {
    /// Account id.
    pub account_id: String,
    /// Provider API bound to the account's token.
    pub api: Arc<dyn MailboxApi>,
}

impl std::fmt::Debug for MailboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSession")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Resolves account ids to sessions. Token refresh happens here.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Open a session; [`MailboxError::NoAccessToken`] when the account cannot be used.
    async fn connect(&self, account_id: &str) -> Result<MailboxSession, MailboxError>;
}

/// Routes every call through a [`RateLimiter`].
pub struct RateLimitedMailbox {
    inner: Arc<dyn MailboxApi>,
    limiter: RateLimiter,
}

impl RateLimitedMailbox {
    /// Wrap a mailbox.
    pub fn new(inner: Arc<dyn MailboxApi>, config: &RateLimitConfig) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(config),
        }
    }
}

#[async_trait]
impl MailboxApi for RateLimitedMailbox {
    async fn list(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessagePage, MailboxError> {
        self.limiter
            .run(self.inner.list(query, page_token, max_results))
            .await
    }

    async fn get(&self, id: &str, format: MessageFormat) -> Result<RawMessage, MailboxError> {
        self.limiter.run(self.inner.get(id, format)).await
    }

    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<(), MailboxError> {
        self.limiter.run(self.inner.modify(id, remove_labels)).await
    }
}

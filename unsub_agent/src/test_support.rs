//! In-memory doubles for the LLM, the page controller and the mailbox.

use crate::browser::{PageDriver, PageLauncher, TextScope};
use crate::config::{AgentConfig, RetryConfig};
use crate::error::{AgentError, AgentResult};
use crate::extract::RawPageElements;
use crate::llm::{ChunkStream, CompletionRequest, LLMProvider, LlmChunk, LlmClient, UsageMetadata};
use crate::mailbox::{
    Header, MailboxApi, MailboxConnector, MailboxError, MailboxSession, MessageFormat, MessagePage,
    MessagePart, PartBody, RawMessage, INBOX_LABEL,
};
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> ScriptedReply + Send + Sync>;

/// One canned provider answer.
pub(crate) struct ScriptedReply {
    result: AgentResult<String>,
    usage: Option<(u64, u64)>,
}

impl ScriptedReply {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
            usage: None,
        }
    }

    pub(crate) fn error(err: AgentError) -> Self {
        Self {
            result: Err(err),
            usage: None,
        }
    }

    pub(crate) fn with_usage(mut self, prompt: u64, candidates: u64) -> Self {
        self.usage = Some((prompt, candidates));
        self
    }
}

/// Provider that replays a queue of replies, or asks a responder per prompt.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn responding<F>(responder: F) -> Self
    where
        F: Fn(&str) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Number of stream calls made.
    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Every prompt seen, oldest first.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn stream(
        &self,
        request: &CompletionRequest,
        _client: &reqwest::Client,
    ) -> AgentResult<ChunkStream> {
        self.prompts.lock().push(request.prompt.clone());

        let reply = match &self.responder {
            Some(responder) => responder(&request.prompt),
            None => self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| ScriptedReply::error(AgentError::Llm("script exhausted".into()))),
        };

        let text = reply.result?;
        let mid = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
        let (head, tail) = text.split_at(mid);

        let mut chunks = vec![Ok(LlmChunk::text(head)), Ok(LlmChunk::text(tail))];
        if let Some((prompt, candidates)) = reply.usage {
            chunks.push(Ok(LlmChunk::usage(UsageMetadata {
                prompt_token_count: prompt,
                candidates_token_count: candidates,
                total_token_count: prompt + candidates,
            })));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn fast_config() -> AgentConfig {
    AgentConfig::new().with_retry(
        RetryConfig::new()
            .with_max_attempts(2)
            .with_backoff(Duration::from_millis(1)),
    )
}

fn client_for(provider: Arc<ScriptedProvider>) -> LlmClient {
    LlmClient::new(provider, fast_config()).expect("test client")
}

/// A client over a queue of replies.
pub(crate) fn scripted_llm(replies: Vec<ScriptedReply>) -> (LlmClient, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(replies));
    (client_for(provider.clone()), provider)
}

/// A client that answers each prompt with `responder`.
pub(crate) fn responder_llm<F>(responder: F) -> (LlmClient, Arc<ScriptedProvider>)
where
    F: Fn(&str) -> ScriptedReply + Send + Sync + 'static,
{
    let provider = Arc::new(ScriptedProvider::responding(responder));
    (client_for(provider.clone()), provider)
}

#[derive(Debug, Default)]
struct PageState {
    clickable: Vec<String>,
    labels: Vec<String>,
    fields: Vec<String>,
    hanging: Vec<String>,
    fail_navigation: bool,
    hang_navigation: bool,
    text_before: String,
    text_after: Option<String>,
    acted: bool,
    closed: bool,
    actions: Vec<String>,
}

/// Scripted page. Clones share state, so a test can keep a handle to a page
/// it gave to a launcher.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockPage {
    state: Arc<Mutex<PageState>>,
}

impl MockPage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// An element that a selector click lands on.
    pub(crate) fn with_clickable(self, selector: &str) -> Self {
        self.state.lock().clickable.push(selector.to_string());
        self
    }

    /// A button whose visible text a text search can match.
    pub(crate) fn with_label(self, text: &str) -> Self {
        self.state.lock().labels.push(text.to_string());
        self
    }

    /// A form control that accepts fill, check and select.
    pub(crate) fn with_field(self, selector: &str) -> Self {
        self.state.lock().fields.push(selector.to_string());
        self
    }

    /// Any interaction with `selector` never completes.
    pub(crate) fn hanging_on(self, selector: &str) -> Self {
        self.state.lock().hanging.push(selector.to_string());
        self
    }

    pub(crate) fn failing_navigation(self) -> Self {
        self.state.lock().fail_navigation = true;
        self
    }

    pub(crate) fn hanging_on_navigation(self) -> Self {
        self.state.lock().hang_navigation = true;
        self
    }

    pub(crate) fn with_visible_text(self, text: &str) -> Self {
        self.state.lock().text_before = text.to_string();
        self
    }

    /// Visible text once a click has landed.
    pub(crate) fn with_text_after_action(self, text: &str) -> Self {
        self.state.lock().text_after = Some(text.to_string());
        self
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Successful interactions, in order.
    pub(crate) fn actions(&self) -> Vec<String> {
        self.state.lock().actions.clone()
    }

    async fn stall_if_hanging(&self, selector: &str) {
        let hangs = self.state.lock().hanging.iter().any(|s| s == selector);
        if hangs {
            std::future::pending::<()>().await;
        }
    }

    fn record_on_field(&self, selector: &str, action: String) -> bool {
        let mut state = self.state.lock();
        let found = state.fields.iter().any(|s| s == selector);
        if found {
            state.actions.push(action);
        }
        found
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, _url: &str) -> AgentResult<bool> {
        let (hang, fail) = {
            let state = self.state.lock();
            (state.hang_navigation, state.fail_navigation)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(!fail)
    }

    async fn html(&self) -> AgentResult<String> {
        Ok(format!("<html><body><p>{}</p></body></html>", self.state.lock().text_before))
    }

    async fn visible_text(&self) -> AgentResult<String> {
        let state = self.state.lock();
        Ok(match (&state.text_after, state.acted) {
            (Some(after), true) => after.clone(),
            _ => state.text_before.clone(),
        })
    }

    async fn extract_elements(&self) -> AgentResult<RawPageElements> {
        Ok(RawPageElements::default())
    }

    async fn click(&self, selector: &str) -> AgentResult<bool> {
        self.stall_if_hanging(selector).await;
        let mut state = self.state.lock();
        let found = state.clickable.iter().any(|s| s == selector);
        if found {
            state.acted = true;
            state.actions.push(format!("click {}", selector));
        }
        Ok(found)
    }

    async fn click_by_text(&self, labels: &[&str], _scope: TextScope) -> AgentResult<Option<String>> {
        let mut state = self.state.lock();
        for label in labels {
            let wanted = label.to_lowercase();
            let hit = state
                .labels
                .iter()
                .find(|text| text.to_lowercase().contains(&wanted))
                .cloned();
            if let Some(text) = hit {
                state.acted = true;
                state.actions.push(format!("click {:?}", text));
                return Ok(Some(label.to_string()));
            }
        }
        Ok(None)
    }

    async fn fill(&self, selector: &str, value: &str) -> AgentResult<bool> {
        self.stall_if_hanging(selector).await;
        Ok(self.record_on_field(selector, format!("fill {}={}", selector, value)))
    }

    async fn check(&self, selector: &str) -> AgentResult<bool> {
        self.stall_if_hanging(selector).await;
        Ok(self.record_on_field(selector, format!("check {}", selector)))
    }

    async fn select_option(&self, selector: &str, value: &str) -> AgentResult<bool> {
        self.stall_if_hanging(selector).await;
        Ok(self.record_on_field(selector, format!("select {}={}", selector, value)))
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> AgentResult<bool> {
        Ok(false)
    }

    async fn screenshot(&self) -> AgentResult<Vec<u8>> {
        Ok(b"png".to_vec())
    }

    async fn close(&mut self) -> AgentResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Hands out queued pages; fails once the queue is empty.
pub(crate) struct MockLauncher {
    pages: Mutex<VecDeque<MockPage>>,
}

impl MockLauncher {
    pub(crate) fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

#[async_trait]
impl PageLauncher for MockLauncher {
    async fn launch(&self) -> AgentResult<Box<dyn PageDriver>> {
        match self.pages.lock().pop_front() {
            Some(page) => Ok(Box::new(page)),
            None => Err(AgentError::Browser("no browser available".into())),
        }
    }
}

fn encode(body: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body)
}

fn header(name: &str, value: &str) -> Header {
    Header {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn raw_message(id: &str, headers: Vec<Header>, mime: &str, body: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        thread_id: Some(format!("t-{}", id)),
        label_ids: vec![INBOX_LABEL.to_string(), "UNREAD".to_string()],
        internal_date: Some(1_700_000_000_000),
        payload: MessagePart {
            mime_type: "multipart/alternative".to_string(),
            headers,
            body: None,
            parts: vec![MessagePart {
                mime_type: mime.to_string(),
                body: Some(PartBody {
                    data: Some(encode(body)),
                    size: body.len(),
                }),
                ..Default::default()
            }],
        },
    }
}

/// Mailbox over an in-memory message list. List page tokens are offsets.
#[derive(Default)]
pub(crate) struct FakeMailbox {
    messages: Mutex<Vec<RawMessage>>,
    page_size: usize,
    get_calls: AtomicUsize,
    failing_gets: Mutex<HashSet<String>>,
    failing_modifies: Mutex<HashSet<String>>,
    archived: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Plain text newsletters that carry a `List-Unsubscribe` header.
    pub(crate) fn with_messages(ids: &[&str]) -> Self {
        let mailbox = Self::new();
        for id in ids {
            let headers = vec![
                header("Subject", &format!("Issue {}", id)),
                header("From", "News <news@list.test>"),
                header("To", "me@example.com"),
                header(
                    "List-Unsubscribe",
                    &format!("<https://list.test/unsubscribe?m={}>", id),
                ),
            ];
            mailbox
                .messages
                .lock()
                .push(raw_message(id, headers, "text/plain", &format!("Hello from {}", id)));
        }
        mailbox
    }

    pub(crate) fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Add an HTML-only message without unsubscribe headers.
    pub(crate) fn add_html(&self, id: &str, html: &str) {
        let headers = vec![
            header("Subject", &format!("Note {}", id)),
            header("From", "sender@mail.test"),
        ];
        self.messages.lock().push(raw_message(id, headers, "text/html", html));
    }

    pub(crate) fn fail_get(&self, id: &str) {
        self.failing_gets.lock().insert(id.to_string());
    }

    pub(crate) fn fail_modify(&self, id: &str) {
        self.failing_modifies.lock().insert(id.to_string());
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Ids whose inbox label was removed, in order.
    pub(crate) fn archived(&self) -> Vec<String> {
        self.archived.lock().clone()
    }
}

#[async_trait]
impl MailboxApi for FakeMailbox {
    async fn list(
        &self,
        _query: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<MessagePage, MailboxError> {
        let inbox: Vec<String> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.label_ids.iter().any(|l| l == INBOX_LABEL))
            .map(|m| m.id.clone())
            .collect();

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| MailboxError::Request(format!("bad page token {}", token)))?,
            None => 0,
        };
        let take = match self.page_size {
            0 => max_results,
            size => size.min(max_results),
        };
        let end = (start + take).min(inbox.len());

        Ok(MessagePage {
            ids: inbox.get(start..end).map(<[String]>::to_vec).unwrap_or_default(),
            next_page_token: (end < inbox.len()).then(|| end.to_string()),
        })
    }

    async fn get(&self, id: &str, _format: MessageFormat) -> Result<RawMessage, MailboxError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.lock().contains(id) {
            return Err(MailboxError::Request(format!("fetching {} failed", id)));
        }
        self.messages
            .lock()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailboxError::NotFound(id.to_string()))
    }

    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<(), MailboxError> {
        if self.failing_modifies.lock().contains(id) {
            return Err(MailboxError::Request(format!("modifying {} failed", id)));
        }
        let mut messages = self.messages.lock();
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MailboxError::NotFound(id.to_string()))?;
        message.label_ids.retain(|l| !remove_labels.contains(&l.as_str()));
        self.archived.lock().push(id.to_string());
        Ok(())
    }
}

/// Connector over a fixed set of accounts.
#[derive(Default)]
pub(crate) struct FakeConnector {
    accounts: HashMap<String, Arc<dyn MailboxApi>>,
    revoked: HashSet<String>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_account(mut self, account_id: &str, mailbox: Arc<FakeMailbox>) -> Self {
        self.accounts.insert(account_id.to_string(), mailbox);
        self
    }

    /// An account whose token can no longer be refreshed.
    pub(crate) fn with_revoked_account(mut self, account_id: &str) -> Self {
        self.revoked.insert(account_id.to_string());
        self
    }
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self, account_id: &str) -> Result<MailboxSession, MailboxError> {
        if self.revoked.contains(account_id) {
            return Err(MailboxError::NoAccessToken(account_id.to_string()));
        }
        self.accounts
            .get(account_id)
            .map(|api| MailboxSession {
                account_id: account_id.to_string(),
                api: api.clone(),
            })
            .ok_or_else(|| MailboxError::NoAccessToken(account_id.to_string()))
    }
}

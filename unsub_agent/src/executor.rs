//! Action Executor: a pure interpreter over [`PageIntent`].
//!
//! Each fallback chain is an ordered list of [`Attempt`]s evaluated with
//! early exit. Every driver call is bounded by the step timeout, so a stuck
//! page costs one failed attempt instead of the whole batch.

use crate::browser::{PageDriver, TextScope};
use crate::config::PageConfig;
use crate::error::AgentResult;
use std::future::Future;
use unsub_agent_types::{ActionPlan, FieldKind, FieldToFill, PageIntent, EMAIL_PLACEHOLDER};

/// Labels searched when selectors fail, in priority order.
pub const SUBMIT_LABELS: &[&str] = &["unsubscribe", "confirm", "yes", "opt out", "remove", "submit"];

/// Common unsubscribe control patterns tried after the plan's own selector.
pub const GENERIC_UNSUBSCRIBE_SELECTORS: &[&str] = &[
    "#unsubscribe",
    "#unsubscribe-button",
    "#unsubscribeButton",
    "#unsubscribe_button",
    "#unsub",
    ".unsubscribe-button",
    ".unsubscribe-btn",
    ".unsubscribe",
    "[data-action='unsubscribe']",
    "[data-testid*='unsubscribe']",
    "button[name='unsubscribe']",
    "input[name='unsubscribe']",
    "input[type='submit'][value*='nsubscribe']",
    "button[id*='unsubscribe']",
    "button[class*='unsubscribe']",
    "a[id*='unsubscribe']",
    "a[class*='unsubscribe']",
];

/// One step of a fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt<'a> {
    /// Click the first element matching a CSS selector.
    Selector(&'a str),
    /// Click the first element in scope whose text contains a label.
    Text {
        /// Labels in priority order.
        labels: &'a [&'a str],
        /// Which elements qualify.
        scope: TextScope,
    },
}

impl Attempt<'_> {
    /// Text search over [`SUBMIT_LABELS`].
    pub fn submit_text(scope: TextScope) -> Self {
        Attempt::Text {
            labels: SUBMIT_LABELS,
            scope,
        }
    }
}

impl std::fmt::Display for Attempt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attempt::Selector(selector) => write!(f, "selector {}", selector),
            Attempt::Text { .. } => write!(f, "text search"),
        }
    }
}

/// What the executor did on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// A click or submit landed.
    pub acted: bool,
    /// The plan said the page was already done; nothing was touched.
    pub already_done: bool,
    /// Human-readable summary.
    pub detail: String,
    /// The attempt that succeeded.
    pub attempt: Option<String>,
}

impl ExecutionReport {
    fn already_done() -> Self {
        Self {
            already_done: true,
            detail: "page already reports the address as unsubscribed".into(),
            ..Default::default()
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Default::default()
        }
    }

    fn acted(detail: impl Into<String>, attempt: String) -> Self {
        Self {
            acted: true,
            already_done: false,
            detail: detail.into(),
            attempt: Some(attempt),
        }
    }
}

/// Interprets action plans against a page.
#[derive(Debug, Clone, Default)]
pub struct ActionExecutor {
    config: PageConfig,
}

impl ActionExecutor {
    /// Create an executor.
    pub fn new(config: PageConfig) -> Self {
        Self { config }
    }

    /// Carry out a plan. `email` replaces the `{{EMAIL}}` placeholder.
    pub async fn execute(
        &self,
        page: &dyn PageDriver,
        plan: &ActionPlan,
        email: Option<&str>,
    ) -> ExecutionReport {
        match plan.intent() {
            PageIntent::AlreadyDone => ExecutionReport::already_done(),
            PageIntent::FillForm {
                fields,
                submit_selector,
                button_selector,
            } => {
                let filled = self.fill_fields(page, fields, email).await;
                log::debug!("filled {}/{} fields", filled, fields.len());

                let chain: Vec<Attempt> = [submit_selector, button_selector]
                    .into_iter()
                    .flatten()
                    .map(Attempt::Selector)
                    .chain([Attempt::submit_text(TextScope::Submit)])
                    .collect();

                match self.run_chain(page, &chain).await {
                    Some(attempt) => {
                        self.settle(page).await;
                        ExecutionReport::acted(format!("submitted form via {}", attempt), attempt)
                    }
                    None => ExecutionReport::failed("could not submit form"),
                }
            }
            PageIntent::ClickButton { selector } => {
                let chain: Vec<Attempt> = selector
                    .into_iter()
                    .chain(GENERIC_UNSUBSCRIBE_SELECTORS.iter().copied())
                    .map(Attempt::Selector)
                    .chain([Attempt::submit_text(TextScope::Clickable)])
                    .collect();

                match self.run_chain(page, &chain).await {
                    Some(attempt) => {
                        self.settle(page).await;
                        ExecutionReport::acted(format!("clicked {}", attempt), attempt)
                    }
                    None => ExecutionReport::failed("could not find an unsubscribe button"),
                }
            }
            PageIntent::Unknown => {
                let chain = [Attempt::submit_text(TextScope::Clickable)];
                match self.run_chain(page, &chain).await {
                    Some(attempt) => {
                        self.settle(page).await;
                        ExecutionReport::acted(format!("attempted: clicked {}", attempt), attempt)
                    }
                    None => ExecutionReport::failed("could not determine how to unsubscribe"),
                }
            }
        }
    }

    /// Evaluate attempts in order; the first that lands wins.
    pub async fn run_chain(&self, page: &dyn PageDriver, chain: &[Attempt<'_>]) -> Option<String> {
        for attempt in chain {
            match attempt {
                Attempt::Selector(selector) => {
                    if self.bounded(page.click(selector)).await == Some(true) {
                        return Some(attempt.to_string());
                    }
                }
                Attempt::Text { labels, scope } => {
                    if let Some(Some(label)) = self.bounded(page.click_by_text(labels, *scope)).await {
                        return Some(format!("text \"{}\"", label));
                    }
                }
            }
            log::debug!("{} did not land", attempt);
        }
        None
    }

    /// Fill every field it can; returns how many were set.
    async fn fill_fields(&self, page: &dyn PageDriver, fields: &[FieldToFill], email: Option<&str>) -> usize {
        let mut filled = 0;

        for field in fields {
            let value = match email {
                Some(email) => field.resolved_value(email),
                None if field.value.contains(EMAIL_PLACEHOLDER) => {
                    log::warn!("no owner email for {}, leaving it empty", field.selector);
                    continue;
                }
                None => field.value.clone(),
            };

            let done = match field.kind {
                FieldKind::Checkbox | FieldKind::Radio => {
                    if !wants_checked(&value) {
                        continue;
                    }
                    self.bounded(page.check(&field.selector)).await
                }
                FieldKind::Select => self.bounded(page.select_option(&field.selector, &value)).await,
                FieldKind::Text | FieldKind::Email | FieldKind::Textarea => {
                    self.bounded(page.fill(&field.selector, &value)).await
                }
            };

            if done == Some(true) {
                filled += 1;
            } else {
                log::debug!("could not set {} ({:?})", field.selector, field.kind);
            }
        }

        filled
    }

    /// Wait for a navigation that may never come, then let the page settle.
    async fn settle(&self, page: &dyn PageDriver) {
        let wait = self.config.post_action_wait;
        let navigated = self
            .bounded_for(wait + self.config.step_timeout, page.wait_for_navigation(wait))
            .await
            .unwrap_or(false);
        log::debug!("post-action navigation: {}", navigated);
        tokio::time::sleep(self.config.settle_delay).await;
    }

    async fn bounded<T>(&self, fut: impl Future<Output = AgentResult<T>>) -> Option<T> {
        self.bounded_for(self.config.step_timeout, fut).await
    }

    async fn bounded_for<T>(
        &self,
        limit: std::time::Duration,
        fut: impl Future<Output = AgentResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::debug!("page step failed: {}", e);
                None
            }
            Err(_) => {
                log::warn!("page step timed out after {:?}", limit);
                None
            }
        }
    }
}

/// Whether a checkbox value asks for the box to be ticked.
fn wants_checked(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "no" | "0" | "off" | "unchecked"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockPage;
    use unsub_agent_types::GENERIC_EMAIL_SELECTOR;

    fn executor() -> ActionExecutor {
        ActionExecutor::new(PageConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_done_touches_nothing() {
        let page = MockPage::new().with_clickable("#unsubscribe");
        let report = executor().execute(&page, &ActionPlan::already_done(), None).await;
        assert!(report.already_done);
        assert!(!report.acted);
        assert!(page.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_falls_back_to_generic_selector() {
        let page = MockPage::new().with_clickable(".unsubscribe-btn");
        let report = executor()
            .execute(&page, &ActionPlan::click("#does-not-exist"), None)
            .await;
        assert!(report.acted);
        assert_eq!(report.attempt.as_deref(), Some("selector .unsubscribe-btn"));
        assert_eq!(page.actions(), vec!["click .unsubscribe-btn"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_falls_back_to_text() {
        let page = MockPage::new().with_label("Opt out of all emails");
        let report = executor().execute(&page, &ActionPlan::fallback(), None).await;
        assert!(report.acted);
        assert_eq!(report.attempt.as_deref(), Some("text \"opt out\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_reports_failure() {
        let page = MockPage::new();
        let report = executor().execute(&page, &ActionPlan::fallback(), None).await;
        assert!(!report.acted);
        assert_eq!(report.detail, "could not find an unsubscribe button");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_form_substitutes_email_and_dispatches_by_kind() {
        let page = MockPage::new()
            .with_field("#email")
            .with_field("#all")
            .with_field("#keep")
            .with_field("#reason")
            .with_clickable("#submit");

        let plan = ActionPlan::fill(
            vec![
                FieldToFill::new("#email", FieldKind::Email, EMAIL_PLACEHOLDER),
                FieldToFill::new("#all", FieldKind::Checkbox, "true"),
                FieldToFill::new("#keep", FieldKind::Checkbox, "false"),
                FieldToFill::new("#reason", FieldKind::Select, "Too many emails"),
            ],
            Some("#submit".into()),
        );

        let report = executor().execute(&page, &plan, Some("me@example.com")).await;
        assert!(report.acted);
        assert_eq!(
            page.actions(),
            vec![
                "fill #email=me@example.com",
                "check #all",
                "select #reason=Too many emails",
                "click #submit",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_form_without_fields_fills_generic_email() {
        let page = MockPage::new()
            .with_field(GENERIC_EMAIL_SELECTOR)
            .with_label("Confirm");
        let mut plan = ActionPlan::fill(Vec::new(), None);
        plan.requires_email_input = true;
        let plan = plan.normalized();

        let report = executor().execute(&page, &plan, Some("me@example.com")).await;
        assert!(report.acted);
        assert_eq!(page.actions()[0], format!("fill {}=me@example.com", GENERIC_EMAIL_SELECTOR));
        assert_eq!(report.attempt.as_deref(), Some("text \"confirm\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_form_that_cannot_submit() {
        let page = MockPage::new().with_field("#email");
        let plan = ActionPlan::fill(
            vec![FieldToFill::new("#email", FieldKind::Email, EMAIL_PLACEHOLDER)],
            Some("#missing".into()),
        );
        let report = executor().execute(&page, &plan, Some("me@example.com")).await;
        assert!(!report.acted);
        assert_eq!(report.detail, "could not submit form");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_plan_reports_attempted_or_not() {
        let mut plan = ActionPlan::fallback();
        plan.next_action = unsub_agent_types::NextAction::Unknown;

        let page = MockPage::new().with_label("Unsubscribe");
        let report = executor().execute(&page, &plan, None).await;
        assert!(report.acted);
        assert!(report.detail.starts_with("attempted"));

        let page = MockPage::new();
        let report = executor().execute(&page, &plan, None).await;
        assert!(!report.acted);
        assert_eq!(report.detail, "could not determine how to unsubscribe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_step_is_a_failed_attempt() {
        let page = MockPage::new()
            .hanging_on("#stuck")
            .with_clickable("#unsubscribe");
        let report = executor().execute(&page, &ActionPlan::click("#stuck"), None).await;
        assert!(report.acted);
        assert_eq!(report.attempt.as_deref(), Some("selector #unsubscribe"));
    }

    #[test]
    fn test_wants_checked() {
        assert!(wants_checked("true"));
        assert!(wants_checked("on"));
        assert!(!wants_checked(" False "));
        assert!(!wants_checked("0"));
    }
}

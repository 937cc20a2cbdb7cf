//! Page controller abstraction.
//!
//! A [`PageDriver`] is one isolated browsing context. The orchestrator gets a
//! fresh one from a [`PageLauncher`] for every URL and always closes it.

#[cfg(feature = "chrome")]
mod chrome;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeLauncher, ChromePage};

use crate::error::AgentResult;
use crate::extract::RawPageElements;
use async_trait::async_trait;
use std::time::Duration;

/// Which elements a text search may click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextScope {
    /// Buttons, submit inputs, links and `role=button` elements.
    Clickable,
    /// Buttons and submit inputs only.
    Submit,
}

impl TextScope {
    /// CSS selector for the candidates in scope.
    pub fn selector(self) -> &'static str {
        match self {
            Self::Clickable => {
                "button, input[type=submit], input[type=button], a, [role=button]"
            }
            Self::Submit => "button, input[type=submit], input[type=button]",
        }
    }
}

/// The page controller contract.
///
/// `navigate` reports HTTP-level failure as `Ok(false)`; errors are reserved
/// for a controller that is not running or a broken browser connection.
/// Interaction methods return `Ok(false)` when the target is missing.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load a URL. `Ok(false)` when unreachable or the response is not OK.
    async fn navigate(&self, url: &str) -> AgentResult<bool>;

    /// Current document HTML.
    async fn html(&self) -> AgentResult<String>;

    /// Text of visible, content-bearing elements only.
    async fn visible_text(&self) -> AgentResult<String>;

    /// Collect candidate forms, buttons, links and sections.
    async fn extract_elements(&self) -> AgentResult<RawPageElements>;

    /// Click the first element matching a selector.
    async fn click(&self, selector: &str) -> AgentResult<bool>;

    /// Click the first element in scope whose text contains one of the labels,
    /// trying labels in order. Returns the label that matched.
    async fn click_by_text(&self, labels: &[&str], scope: TextScope) -> AgentResult<Option<String>>;

    /// Type a value into a text-like control.
    async fn fill(&self, selector: &str, value: &str) -> AgentResult<bool>;

    /// Check a checkbox or radio.
    async fn check(&self, selector: &str) -> AgentResult<bool>;

    /// Choose an option by value or label.
    async fn select_option(&self, selector: &str, value: &str) -> AgentResult<bool>;

    /// Wait up to `timeout` for a navigation. `Ok(false)` when none happened.
    async fn wait_for_navigation(&self, timeout: Duration) -> AgentResult<bool>;

    /// Full-page PNG.
    async fn screenshot(&self) -> AgentResult<Vec<u8>>;

    /// Release the browsing context. Safe to call more than once.
    async fn close(&mut self) -> AgentResult<()>;
}

/// Produces fresh, isolated page controllers.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    /// Acquire a new browsing context.
    async fn launch(&self) -> AgentResult<Box<dyn PageDriver>>;
}

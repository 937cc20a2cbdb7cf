//! Chrome-backed page controller built on chromey.

use super::{PageDriver, PageLauncher, TextScope};
use crate::config::PageConfig;
use crate::error::{AgentError, AgentResult};
use crate::extract::{extraction_script, RawPageElements};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// HTTP status of the current document, or `null` when unavailable.
const NAVIGATION_STATUS_JS: &str = r#"
(() => {
  const entry = performance.getEntriesByType('navigation')[0];
  return entry && typeof entry.responseStatus === 'number' && entry.responseStatus > 0
    ? entry.responseStatus
    : null;
})()
"#;

/// Text of rendered, content-bearing nodes. Form controls, labels and
/// anything hidden by computed style or zero size are skipped.
const VISIBLE_TEXT_JS: &str = r#"
(() => {
  if (!document.body) return '';
  const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'LABEL', 'INPUT', 'BUTTON',
    'SELECT', 'OPTION', 'TEXTAREA', 'SVG', 'IFRAME', 'HEAD']);
  const cache = new Map();
  const hidden = (el) => {
    if (!el || el.nodeType !== 1) return false;
    if (cache.has(el)) return cache.get(el);
    let result = SKIP.has(el.tagName.toUpperCase());
    if (!result) {
      const s = getComputedStyle(el);
      result = s.display === 'none' || s.visibility === 'hidden' || s.visibility === 'collapse'
        || parseFloat(s.opacity) === 0;
    }
    if (!result) result = hidden(el.parentElement);
    cache.set(el, result);
    return result;
  };
  const out = [];
  const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
  while (walker.nextNode()) {
    const node = walker.currentNode;
    const text = node.textContent.replace(/\s+/g, ' ').trim();
    if (!text) continue;
    const parent = node.parentElement;
    if (!parent || hidden(parent)) continue;
    const r = parent.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    out.push(text);
  }
  return out.join('\n');
})()
"#;

/// Scroll to and click the first match, bypassing pointer interception.
const FORCE_CLICK_JS: &str = r#"
((sel) => {
  try {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
  } catch (e) {
    return false;
  }
})(__ARGS__)
"#;

const CLICK_BY_TEXT_JS: &str = r#"
((labels, scope) => {
  const visible = (el) => {
    const s = getComputedStyle(el);
    const r = el.getBoundingClientRect();
    return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0;
  };
  const nodes = Array.from(document.querySelectorAll(scope)).filter(visible);
  const text = (el) => String(el.innerText || el.value || el.getAttribute('aria-label') || '').toLowerCase();
  for (const label of labels) {
    const needle = label.toLowerCase();
    const el = nodes.find((n) => text(n).includes(needle));
    if (el) {
      el.scrollIntoView({ block: 'center' });
      el.click();
      return label;
    }
  }
  return null;
})(__ARGS__)
"#;

const CLEAR_VALUE_JS: &str = r#"
((sel) => {
  const el = document.querySelector(sel);
  if (!el) return false;
  el.value = '';
  el.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
})(__ARGS__)
"#;

const SET_VALUE_JS: &str = r#"
((sel, value) => {
  const el = document.querySelector(sel);
  if (!el) return false;
  el.value = value;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
})(__ARGS__)
"#;

const CHECK_JS: &str = r#"
((sel) => {
  try {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    if (!el.checked) el.click();
    if (!el.checked) {
      el.checked = true;
      el.dispatchEvent(new Event('change', { bubbles: true }));
    }
    return true;
  } catch (e) {
    return false;
  }
})(__ARGS__)
"#;

const SELECT_OPTION_JS: &str = r#"
((sel, wanted) => {
  try {
    const el = document.querySelector(sel);
    if (!el || !el.options) return false;
    const w = String(wanted).trim().toLowerCase();
    const options = Array.from(el.options);
    const opt = options.find((o) => o.value === wanted)
      || options.find((o) => o.text.trim().toLowerCase() === w)
      || options.find((o) => o.text.trim().toLowerCase().includes(w));
    if (!opt) return false;
    el.value = opt.value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
  } catch (e) {
    return false;
  }
})(__ARGS__)
"#;

/// Substitute JSON-encoded arguments into a script template.
fn with_args(template: &str, args: &[&str]) -> String {
    let encoded: Vec<String> = args
        .iter()
        .map(|a| serde_json::to_string(a).unwrap_or_else(|_| "\"\"".into()))
        .collect();
    template.replace("__ARGS__", &encoded.join(", "))
}

/// Launches one headless Chrome per attempt, each with a throwaway profile.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: PageConfig,
}

impl ChromeLauncher {
    /// Create a launcher.
    pub fn new(config: PageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageLauncher for ChromeLauncher {
    async fn launch(&self) -> AgentResult<Box<dyn PageDriver>> {
        Ok(Box::new(ChromePage::launch(self.config.clone()).await?))
    }
}

struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    _profile: tempfile::TempDir,
}

/// One browser process with a single tab.
pub struct ChromePage {
    session: Option<Session>,
    config: PageConfig,
}

impl ChromePage {
    /// Start Chrome with a fresh profile and open a blank tab.
    pub async fn launch(config: PageConfig) -> AgentResult<Self> {
        let profile = tempfile::Builder::new().prefix("unsub-profile-").tempdir()?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .arg(format!("--user-agent={}", config.user_agent))
            .request_timeout(config.navigation_timeout)
            .viewport(Viewport {
                width: config.viewport.0,
                height: config.viewport.1,
                ..Default::default()
            });

        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(AgentError::Browser)?;
        let (browser, mut handler) = Browser::launch(browser_config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    match e {
                        CdpError::Ws(_)
                        | CdpError::LaunchExit(_, _)
                        | CdpError::LaunchTimeout(_)
                        | CdpError::LaunchIo(_, _) => break,
                        _ => continue,
                    }
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e.into());
            }
        };

        log::debug!("chrome launched with profile {}", profile.path().display());

        Ok(Self {
            session: Some(Session {
                browser,
                page,
                handler,
                _profile: profile,
            }),
            config,
        })
    }

    fn page(&self) -> AgentResult<&Page> {
        self.session
            .as_ref()
            .map(|s| &s.page)
            .ok_or(AgentError::NotLaunched)
    }

    /// Bound a CDP call by the step timeout.
    async fn step<T, F>(&self, fut: F) -> AgentResult<T>
    where
        F: Future<Output = Result<T, CdpError>>,
    {
        Ok(tokio::time::timeout(self.config.step_timeout, fut).await??)
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> AgentResult<T> {
        let page = self.page()?;
        self.step(page.evaluate(script))
            .await?
            .into_value()
            .map_err(|e| AgentError::Browser(format!("JSON conversion error: {}", e)))
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> AgentResult<bool> {
        let page = self.page()?;

        match tokio::time::timeout(self.config.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                log::warn!("navigation to {} failed: {}", url, e);
                return Ok(false);
            }
            Err(_) => {
                log::warn!("navigation to {} timed out", url);
                return Ok(false);
            }
        }

        let status: Option<u16> = self
            .eval(NAVIGATION_STATUS_JS.to_string())
            .await
            .unwrap_or(None);

        match status {
            Some(code) if code >= 400 => {
                log::warn!("navigation to {} returned HTTP {}", url, code);
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    async fn html(&self) -> AgentResult<String> {
        let page = self.page()?;
        self.step(page.content()).await
    }

    async fn visible_text(&self) -> AgentResult<String> {
        self.eval(VISIBLE_TEXT_JS.to_string()).await
    }

    async fn extract_elements(&self) -> AgentResult<RawPageElements> {
        self.eval(extraction_script()).await
    }

    async fn click(&self, selector: &str) -> AgentResult<bool> {
        let page = self.page()?;

        let element = match self.step(page.find_element(selector)).await {
            Ok(element) => element,
            Err(e) => {
                log::debug!("no element for {}: {}", selector, e);
                return Ok(false);
            }
        };

        let _ = self.step(element.scroll_into_view()).await;

        match self.step(element.click()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                log::debug!("click on {} failed ({}), forcing", selector, e);
                Ok(self
                    .eval(with_args(FORCE_CLICK_JS, &[selector]))
                    .await
                    .unwrap_or(false))
            }
        }
    }

    async fn click_by_text(&self, labels: &[&str], scope: TextScope) -> AgentResult<Option<String>> {
        let labels = serde_json::to_string(labels)?;
        let scope = serde_json::to_string(scope.selector())?;
        let script = CLICK_BY_TEXT_JS.replace("__ARGS__", &format!("{}, {}", labels, scope));
        self.eval(script).await
    }

    async fn fill(&self, selector: &str, value: &str) -> AgentResult<bool> {
        let page = self.page()?;

        let element = match self.step(page.find_element(selector)).await {
            Ok(element) => element,
            Err(_) => return Ok(false),
        };

        let _ = self.step(element.scroll_into_view()).await;
        let _ = self.step(element.focus()).await;
        let _: bool = self
            .eval(with_args(CLEAR_VALUE_JS, &[selector]))
            .await
            .unwrap_or(false);

        match self.step(element.type_str(value)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                log::debug!("typing into {} failed ({}), setting value", selector, e);
                Ok(self
                    .eval(with_args(SET_VALUE_JS, &[selector, value]))
                    .await
                    .unwrap_or(false))
            }
        }
    }

    async fn check(&self, selector: &str) -> AgentResult<bool> {
        self.eval(with_args(CHECK_JS, &[selector])).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> AgentResult<bool> {
        self.eval(with_args(SELECT_OPTION_JS, &[selector, value])).await
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> AgentResult<bool> {
        let page = self.page()?;
        Ok(matches!(
            tokio::time::timeout(timeout, page.wait_for_navigation()).await,
            Ok(Ok(_))
        ))
    }

    async fn screenshot(&self) -> AgentResult<Vec<u8>> {
        let page = self.page()?;
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(tokio::time::timeout(self.config.navigation_timeout, page.screenshot(params)).await??)
    }

    async fn close(&mut self) -> AgentResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = session.page.close().await {
            log::debug!("closing tab failed: {}", e);
        }
        if let Err(e) = session.browser.close().await {
            log::debug!("closing browser failed: {}", e);
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), session.browser.wait()).await;
        session.handler.abort();

        Ok(())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("chrome page dropped without close");
            session.handler.abort();
        }
    }
}

impl std::fmt::Debug for ChromePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromePage")
            .field("launched", &self.session.is_some())
            .finish()
    }
}

//! Element extraction: live DOM to a compact [`PageSnapshot`].
//!
//! The in-page script collects visible candidates with a computed selector
//! each. [`ElementExtractor::snapshot`] then applies the keyword gate, the
//! bucket caps and the byte budget so the analyzer prompt stays small.

use crate::config::ExtractionLimits;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::sync::LazyLock;
use unsub_agent_html::{clean_html_for_analysis, truncate_html};
use unsub_agent_types::{ElementDescriptor, FormDescriptor, PageSnapshot};

/// Vocabulary that marks an element as relevant to opting out.
pub const EXTRACTION_KEYWORDS: &[&str] = &[
    "unsubscribe",
    "unsub",
    "opt-out",
    "opt out",
    "optout",
    "remove",
    "preference",
    "manage",
    "subscription",
    "subscribe",
    "mailing list",
    "confirm",
    "submit",
    "email",
    "e-mail",
    "stop",
    "no longer",
    "leave",
];

static KEYWORDS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(EXTRACTION_KEYWORDS)
        .expect("valid extraction keywords")
});

/// Candidates as collected in the page, before gating.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPageElements {
    /// Visible forms with their actionable controls.
    #[serde(default)]
    pub forms: Vec<FormDescriptor>,
    /// Visible buttons outside forms.
    #[serde(default)]
    pub buttons: Vec<ElementDescriptor>,
    /// Visible links.
    #[serde(default)]
    pub links: Vec<ElementDescriptor>,
    /// Outer HTML of innermost elements whose text mentions a keyword.
    #[serde(default)]
    pub sections: Vec<String>,
}

/// In-page collection script. `__KEYWORDS__` is replaced with a JSON array.
const EXTRACT_ELEMENTS_JS: &str = r##"
(() => {
  const KEYWORDS = __KEYWORDS__;
  const MAX_SECTION = 4000;

  const isVisible = (el) => {
    if (!el || !el.isConnected) return false;
    for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
      const s = getComputedStyle(n);
      if (s.display === 'none' || s.visibility === 'hidden' || parseFloat(s.opacity) === 0) return false;
    }
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };

  const cssPath = (el) => {
    if (el.id && document.querySelectorAll('#' + CSS.escape(el.id)).length === 1) {
      return '#' + CSS.escape(el.id);
    }
    const parts = [];
    for (let n = el; n && n.nodeType === 1 && n !== document.documentElement; n = n.parentElement) {
      if (n.id && document.querySelectorAll('#' + CSS.escape(n.id)).length === 1) {
        parts.unshift('#' + CSS.escape(n.id));
        break;
      }
      let part = n.tagName.toLowerCase();
      const parent = n.parentElement;
      if (parent) {
        const same = Array.from(parent.children).filter((c) => c.tagName === n.tagName);
        if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(n) + 1) + ')';
      }
      parts.unshift(part);
    }
    return parts.join(' > ');
  };

  const labelFor = (el) => {
    if (el.labels && el.labels.length) return el.labels[0].innerText;
    return el.getAttribute('aria-label') || el.getAttribute('placeholder') || '';
  };

  const describe = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    const d = { tag, selector: cssPath(el) };
    if (type) d.type = type;
    if (el.id) d.id = el.id;
    if (el.className && typeof el.className === 'string') d.class = el.className.trim();
    if (el.getAttribute('name')) d.name = el.getAttribute('name');
    if (type !== 'password' && el.value !== undefined && el.value !== '' && tag !== 'select') d.value = String(el.value).slice(0, 200);
    let text = tag === 'input' ? (el.value || labelFor(el)) : (el.innerText || labelFor(el));
    if (tag === 'input' && type !== 'submit' && type !== 'button') text = labelFor(el);
    text = (text || '').replace(/\s+/g, ' ').trim().slice(0, 200);
    if (text) d.text = text;
    if (tag === 'a' && el.href) d.href = el.href;
    if (type === 'checkbox' || type === 'radio') d.checked = !!el.checked;
    if (tag === 'select') d.options = Array.from(el.options).slice(0, 30).map((o) => o.value || o.text);
    return d;
  };

  const controls = 'input, select, textarea, button, [role=button]';
  const actionable = (el) => {
    const type = (el.getAttribute('type') || '').toLowerCase();
    return type !== 'hidden' && type !== 'password' && isVisible(el);
  };

  const forms = Array.from(document.forms).filter(isVisible).map((f) => ({
    selector: cssPath(f),
    id: f.id || undefined,
    action: f.getAttribute('action') || undefined,
    method: (f.getAttribute('method') || '').toLowerCase() || undefined,
    elements: Array.from(f.querySelectorAll(controls)).filter(actionable).map(describe),
  }));

  const buttons = Array.from(document.querySelectorAll('button, input[type=submit], input[type=button], [role=button]'))
    .filter((el) => !el.closest('form') && isVisible(el))
    .map(describe);

  const links = Array.from(document.querySelectorAll('a[href]'))
    .filter(isVisible)
    .map(describe);

  const mentions = (el) => {
    const t = (el.textContent || '').toLowerCase();
    return KEYWORDS.some((k) => t.includes(k));
  };
  const sectionTags = 'p, li, td, span, label, h1, h2, h3, h4, h5, h6, div, section, article';
  const candidates = Array.from(document.body ? document.body.querySelectorAll(sectionTags) : [])
    .filter((el) => mentions(el) && isVisible(el));
  const sections = candidates
    .filter((el) => !candidates.some((o) => o !== el && el.contains(o)))
    .slice(0, 50)
    .map((el) => el.outerHTML.slice(0, MAX_SECTION));

  return { forms, buttons, links, sections };
})()
"##;

/// The extraction script with the keyword vocabulary injected.
pub fn extraction_script() -> String {
    let keywords = serde_json::to_string(EXTRACTION_KEYWORDS).unwrap_or_else(|_| "[]".into());
    EXTRACT_ELEMENTS_JS.replace("__KEYWORDS__", &keywords)
}

/// True when the text mentions an extraction keyword.
pub fn mentions_keyword(text: &str) -> bool {
    KEYWORDS.is_match(text)
}

/// Gates and bounds raw page candidates.
#[derive(Debug, Clone, Default)]
pub struct ElementExtractor {
    limits: ExtractionLimits,
}

impl ElementExtractor {
    /// Create an extractor with the given limits.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Build a snapshot from raw candidates.
    ///
    /// A form is kept when its action, id or any control mentions a keyword
    /// or it has an email input. Buckets are filled in order forms, buttons,
    /// links, sections until the byte budget runs out.
    pub fn snapshot(&self, raw: RawPageElements) -> PageSnapshot {
        let limits = &self.limits;
        let mut budget = Budget::new(limits.max_total_bytes);
        let mut snapshot = PageSnapshot::new();

        for mut form in raw.forms.into_iter().filter(form_is_relevant) {
            if snapshot.forms.len() >= limits.max_forms {
                break;
            }
            form.elements.truncate(limits.max_form_elements);
            if !budget.take(&form) {
                break;
            }
            snapshot.forms.push(form);
        }

        for button in raw.buttons.into_iter().filter(|b| mentions_keyword(&b.haystack())) {
            if snapshot.buttons.len() >= limits.max_buttons || !budget.take(&button) {
                break;
            }
            snapshot.buttons.push(button);
        }

        for link in raw.links.into_iter().filter(|l| mentions_keyword(&l.haystack())) {
            if snapshot.links.len() >= limits.max_links || !budget.take(&link) {
                break;
            }
            snapshot.links.push(link);
        }

        for section in raw.sections {
            if snapshot.relevant_sections.len() >= limits.max_sections {
                break;
            }
            let cleaned = clean_html_for_analysis(&section);
            let cleaned = truncate_html(&cleaned, limits.max_section_bytes).trim().to_string();
            if cleaned.is_empty() || snapshot.relevant_sections.contains(&cleaned) {
                continue;
            }
            if !budget.take(&cleaned) {
                break;
            }
            snapshot.relevant_sections.push(cleaned);
        }

        log::debug!(
            "snapshot: {} forms, {} buttons, {} links, {} sections, {} bytes",
            snapshot.forms.len(),
            snapshot.buttons.len(),
            snapshot.links.len(),
            snapshot.relevant_sections.len(),
            budget.used
        );

        snapshot
    }
}

fn form_is_relevant(form: &FormDescriptor) -> bool {
    let own = [form.action.as_deref(), form.id.as_deref()]
        .into_iter()
        .flatten()
        .any(mentions_keyword);
    own || form
        .elements
        .iter()
        .any(|e| e.is_email_input() || mentions_keyword(&e.haystack()))
}

struct Budget {
    used: usize,
    max: usize,
}

impl Budget {
    fn new(max: usize) -> Self {
        Self { used: 0, max }
    }

    /// Reserve the serialized size of `item`; false when it does not fit.
    fn take<T: serde::Serialize>(&mut self, item: &T) -> bool {
        let size = serde_json::to_vec(item).map(|v| v.len()).unwrap_or(usize::MAX);
        match self.used.checked_add(size) {
            Some(total) if total <= self.max => {
                self.used = total;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_page() -> RawPageElements {
        RawPageElements {
            forms: vec![
                FormDescriptor {
                    selector: "#prefs".into(),
                    action: Some("/preferences/update".into()),
                    elements: vec![
                        ElementDescriptor::new("input", "#em").with_kind("email").with_name("email"),
                        ElementDescriptor::new("button", "#go").with_text("Save"),
                    ],
                    ..Default::default()
                },
                FormDescriptor {
                    selector: "#search".into(),
                    action: Some("/search".into()),
                    elements: vec![ElementDescriptor::new("input", "#q").with_kind("search")],
                    ..Default::default()
                },
            ],
            buttons: vec![
                ElementDescriptor::new("button", "#unsub").with_text("Unsubscribe"),
                ElementDescriptor::new("button", "#cart").with_text("Add to cart"),
            ],
            links: vec![
                ElementDescriptor::new("a", "#home").with_text("Home").with_href("https://x.test/"),
                ElementDescriptor::new("a", "#opt")
                    .with_text("click here")
                    .with_href("https://x.test/opt-out"),
            ],
            sections: vec![
                r#"<p style="color:red">To stop receiving these emails, confirm below.</p>"#.into(),
                "<script>x</script>".into(),
            ],
        }
    }

    #[test]
    fn test_keyword_gate() {
        let snapshot = ElementExtractor::default().snapshot(raw_page());
        assert_eq!(snapshot.forms.len(), 1);
        assert_eq!(snapshot.forms[0].selector, "#prefs");
        assert_eq!(snapshot.buttons.len(), 1);
        assert_eq!(snapshot.buttons[0].selector, "#unsub");
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(snapshot.links[0].selector, "#opt");
        assert_eq!(snapshot.relevant_sections.len(), 1);
        assert!(!snapshot.relevant_sections[0].contains("style="));
    }

    #[test]
    fn test_bucket_caps_and_budget() {
        let mut raw = RawPageElements::default();
        for i in 0..100 {
            raw.buttons
                .push(ElementDescriptor::new("button", format!("#b{i}")).with_text("Unsubscribe"));
        }

        let limits = ExtractionLimits {
            max_buttons: 5,
            ..Default::default()
        };
        assert_eq!(ElementExtractor::new(limits).snapshot(raw.clone()).buttons.len(), 5);

        let limits = ExtractionLimits {
            max_total_bytes: 200,
            ..Default::default()
        };
        let snapshot = ElementExtractor::new(limits).snapshot(raw);
        assert!(!snapshot.buttons.is_empty());
        assert!(serde_json::to_vec(&snapshot.buttons).unwrap().len() <= 200 + snapshot.buttons.len());
    }

    #[test]
    fn test_script_has_keywords_injected() {
        let script = extraction_script();
        assert!(!script.contains("__KEYWORDS__"));
        assert!(script.contains(r#""unsubscribe""#));
    }
}

//! HTML cleaning for analysis prompts.
//!
//! Unsubscribe pages are usually small forms wrapped in a lot of tracking and
//! styling markup. The cleaners here strip everything a model does not need
//! to pick a control, while keeping the attributes a selector is built from.

use lol_html::{doc_comments, element, rewrite_str, RewriteStrSettings};

/// Attributes kept by [`clean_html_for_analysis`].
const KEPT_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "name",
    "type",
    "value",
    "href",
    "action",
    "method",
    "role",
    "for",
    "placeholder",
    "aria-label",
    "title",
    "checked",
    "selected",
];

/// Elements removed outright.
const REMOVED_TAGS: &[&str] = &[
    "script", "style", "link", "meta", "noscript", "svg", "canvas", "video", "iframe", "template",
];

/// Inline-hidden elements.
const HIDDEN_SELECTORS: &[&str] = &[
    "[hidden]",
    "[style*='display:none']",
    "[style*='display: none']",
];

/// Remove scripts, styles and other heavy elements.
///
/// Removes:
/// - `<script>`, `<style>`, `<link>`, `<meta>` tags
/// - `<svg>`, `<canvas>`, `<video>`, `<iframe>`, `<noscript>` tags
/// - Base64 images
/// - Elements hidden inline with `display:none` or the `hidden` attribute
/// - Comments
pub fn clean_html_slim(html: &str) -> String {
    let mut element_content_handlers: Vec<_> = REMOVED_TAGS
        .iter()
        .chain(HIDDEN_SELECTORS)
        .map(|selector| {
            element!(*selector, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();

    element_content_handlers.push(element!("img", |el| {
        if let Some(src) = el.get_attribute("src") {
            if src.starts_with("data:") {
                el.remove();
            }
        }
        Ok(())
    }));

    match rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers,
            document_content_handlers: vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    ) {
        Ok(r) => r,
        _ => html.into(),
    }
}

/// Clean HTML for the page analysis prompt.
///
/// In addition to [`clean_html_slim`], removes hidden and password inputs
/// and every attribute that does not help target an element (inline styles,
/// event handlers, tracking data).
pub fn clean_html_for_analysis(html: &str) -> String {
    let slim = clean_html_slim(html);

    match rewrite_str(
        &slim,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("input[type='hidden' i]", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("input[type='password' i]", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("head", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    let to_remove: Vec<String> = el
                        .attributes()
                        .iter()
                        .map(|attr| attr.name())
                        .filter(|n| !KEPT_ATTRIBUTES.contains(&n.as_str()))
                        .collect();
                    for name in to_remove {
                        el.remove_attribute(&name);
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    ) {
        Ok(r) => collapse_whitespace(&r),
        _ => slim,
    }
}

/// Truncate HTML to at most `max_bytes`, cutting on a char boundary and
/// never inside a tag.
pub fn truncate_html(html: &str, max_bytes: usize) -> &str {
    if html.len() <= max_bytes {
        return html;
    }

    let mut end = max_bytes;
    while end > 0 && !html.is_char_boundary(end) {
        end -= 1;
    }
    let head = &html[..end];

    // drop a trailing partial tag
    match (head.rfind('<'), head.rfind('>')) {
        (Some(open), Some(close)) if open > close => &head[..open],
        (Some(open), None) => &head[..open],
        _ => head,
    }
}

/// Collapse runs of whitespace between tags.
fn collapse_whitespace(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last_ws = false;

    for c in html.chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
    }

    out.trim().to_string()
}

//! Unsubscribe link discovery in email HTML.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Wording that marks an anchor as an opt-out link.
static UNSUBSCRIBE_WORDS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build([
            "unsubscribe",
            "unsub",
            "opt-out",
            "opt out",
            "optout",
            "remove me",
            "email preferences",
            "manage preferences",
            "manage subscription",
            "update your preferences",
            "stop receiving",
        ])
        .expect("valid unsubscribe patterns")
});

/// A candidate unsubscribe anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeLink {
    /// Link target.
    pub href: String,
    /// Anchor text, whitespace collapsed.
    pub text: String,
    /// Higher is more likely to be the opt-out link.
    pub score: u8,
}

#[derive(Default)]
struct Anchor {
    href: String,
    text: String,
}

/// Find every http(s) anchor whose text or target looks like an opt-out
/// link, best first.
///
/// Anchor text is weighted above the URL: "Unsubscribe" as link text is a
/// stronger signal than `/unsubscribe` in a tracking redirect.
pub fn find_unsubscribe_links(html: &str) -> Vec<UnsubscribeLink> {
    let anchors: RefCell<Vec<Anchor>> = RefCell::new(Vec::new());

    let _ = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("a[href]", |el| {
                    let href = el.get_attribute("href").unwrap_or_default();
                    anchors.borrow_mut().push(Anchor {
                        href: decode_entities(href.trim()),
                        text: String::new(),
                    });
                    Ok(())
                }),
                text!("a[href]", |t| {
                    if let Some(last) = anchors.borrow_mut().last_mut() {
                        last.text.push_str(t.as_str());
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    );

    let mut links: Vec<UnsubscribeLink> = anchors
        .into_inner()
        .into_iter()
        .filter(|a| is_http_url(&a.href))
        .filter_map(|a| {
            let text = a.text.split_whitespace().collect::<Vec<_>>().join(" ");
            let score = score_anchor(&text, &a.href);
            (score > 0).then(|| UnsubscribeLink {
                href: a.href,
                text,
                score,
            })
        })
        .collect();

    // stable, so document order breaks ties
    links.sort_by(|a, b| b.score.cmp(&a.score));
    let mut seen = HashSet::new();
    links.retain(|l| seen.insert(l.href.clone()));
    links
}

/// The highest scoring unsubscribe link, if any.
pub fn best_unsubscribe_link(html: &str) -> Option<String> {
    find_unsubscribe_links(html).into_iter().next().map(|l| l.href)
}

/// True for absolute `http://` or `https://` URLs.
pub fn is_http_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn score_anchor(text: &str, href: &str) -> u8 {
    let mut score = 0;
    if UNSUBSCRIBE_WORDS.is_match(text) {
        score += 2;
    }
    if UNSUBSCRIBE_WORDS.is_match(href) {
        score += 1;
    }
    score
}

fn decode_entities(s: &str) -> String {
    if s.contains('&') {
        s.replace("&amp;", "&")
    } else {
        s.to_string()
    }
}

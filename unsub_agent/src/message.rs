//! Field extraction from provider messages.

use crate::mailbox::{MessagePart, RawMessage};
use base64::Engine;
use chrono::{TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;
use unsub_agent_html::{best_unsubscribe_link, is_http_url};
use unsub_agent_types::EmailRecord;

static LIST_UNSUBSCRIBE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*(https?://[^>\s]+)\s*>").expect("valid List-Unsubscribe regex"));

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("valid url regex"));

/// Build a record from a fetched message. The unsubscribe link is filled
/// from the header and body heuristics only.
pub fn parse_message(account_id: &str, raw: &RawMessage) -> EmailRecord {
    let headers: Vec<(String, String)> = raw
        .payload
        .headers
        .iter()
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    let mut body_text = None;
    let mut body_html = None;
    walk_parts(&raw.payload, &mut body_text, &mut body_html);

    let unsubscribe_link = header("List-Unsubscribe")
        .and_then(list_unsubscribe_url)
        .or_else(|| body_html.as_deref().and_then(best_unsubscribe_link))
        .or_else(|| body_text.as_deref().and_then(text_unsubscribe_url));

    EmailRecord {
        account_id: account_id.to_string(),
        provider_message_id: raw.id.clone(),
        thread_id: raw.thread_id.clone(),
        subject: header("Subject").unwrap_or_default().to_string(),
        from: header("From").unwrap_or_default().to_string(),
        to: header("To").map(split_addresses).unwrap_or_default(),
        unsubscribe_link,
        is_read: !raw.label_ids.iter().any(|l| l == "UNREAD"),
        received_at: raw
            .internal_date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|t| t.to_rfc3339()),
        raw_headers: headers,
        body_text,
        body_html,
        ..Default::default()
    }
}

/// Depth-first walk; the first `text/plain` and first `text/html` bodies win.
fn walk_parts(part: &MessagePart, text: &mut Option<String>, html: &mut Option<String>) {
    let mime = part.mime_type.to_ascii_lowercase();

    if mime.starts_with("multipart/") || !part.parts.is_empty() {
        for child in &part.parts {
            walk_parts(child, text, html);
        }
        return;
    }

    let slot = match mime.as_str() {
        "text/plain" => text,
        "text/html" => html,
        _ => return,
    };
    if slot.is_some() {
        return;
    }
    if let Some(decoded) = part
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .and_then(decode_body)
    {
        *slot = Some(decoded);
    }
}

/// Decode base64url body data, padded or not.
pub fn decode_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    let trimmed = data.trim();
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(trimmed))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// First http(s) URL in a `List-Unsubscribe` header; `mailto:` entries are skipped.
pub fn list_unsubscribe_url(header: &str) -> Option<String> {
    LIST_UNSUBSCRIBE_URL
        .captures_iter(header)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .find(|url| is_http_url(url))
}

/// A URL in plain text that mentions unsubscribing.
fn text_unsubscribe_url(text: &str) -> Option<String> {
    BARE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']))
        .find(|url| {
            let lower = url.to_ascii_lowercase();
            lower.contains("unsubscribe") || lower.contains("optout") || lower.contains("opt-out")
        })
        .map(str::to_string)
}

/// Accept a model-proposed link only if it is an http(s) URL that occurs in
/// the message body verbatim.
pub fn accept_llm_link(answer: &str, record: &EmailRecord) -> Option<String> {
    let candidate = answer
        .trim()
        .trim_matches(|c| c == '"' || c == '<' || c == '>' || c == '`')
        .trim();
    if !is_http_url(candidate) {
        return None;
    }

    let occurs = [record.body_html.as_deref(), record.body_text.as_deref()]
        .into_iter()
        .flatten()
        .any(|body| body.contains(candidate) || body.contains(&candidate.replace('&', "&amp;")));

    occurs.then(|| candidate.to_string())
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

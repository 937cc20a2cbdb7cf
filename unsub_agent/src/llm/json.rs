//! Best effort recovery of JSON from model output.

use crate::error::{AgentError, AgentResult};
use serde::de::DeserializeOwned;

/// Parse model output into `T`.
///
/// Tries, in order: the whole text, the last fenced code block, the last
/// balanced `{...}` object. The first candidate that deserializes wins.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> AgentResult<T> {
    let trimmed = content.trim();
    let mut last_err = match serde_json::from_str::<T>(trimmed) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    for candidate in [last_fenced_block(trimmed), last_json_object(trimmed)]
        .into_iter()
        .flatten()
    {
        match serde_json::from_str::<T>(candidate) {
            Ok(v) => return Ok(v),
            Err(e) => last_err = e,
        }
    }

    Err(AgentError::Json(last_err))
}

/// Body of the last ``` fenced block, language tag stripped.
fn last_fenced_block(s: &str) -> Option<&str> {
    let end = s.rfind("```")?;
    let start = s[..end].rfind("```")? + 3;
    let block = &s[start..end];
    // skip a language tag such as `json`
    let block = match block.find('\n') {
        Some(nl) if !block[..nl].trim_start().starts_with('{') => &block[nl + 1..],
        _ => block,
    };
    let block = block.trim();
    (!block.is_empty()).then_some(block)
}

/// The last balanced JSON object, matching braces outside of strings.
fn last_json_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let end = bytes.iter().rposition(|&b| b == b'}')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut pos = end + 1;

    while pos > 0 {
        pos -= 1;
        let ch = bytes[pos];

        if ch == b'"' && !is_escaped(bytes, pos) {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == b'}' {
            depth += 1;
        } else if ch == b'{' {
            depth -= 1;
            if depth == 0 {
                return Some(&s[pos..=end]);
            }
        }
    }

    None
}

fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    let backslashes = bytes[..pos].iter().rev().take_while(|&&b| b == b'\\').count();
    backslashes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_plain_json() {
        let v: Value = parse_json_response(r#" {"a": 1} "#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_fenced_json() {
        let content = "Here you go:\n```json\n{\"nextAction\": \"click_button\"}\n```\n";
        let v: Value = parse_json_response(content).unwrap();
        assert_eq!(v["nextAction"], "click_button");
    }

    #[test]
    fn test_last_object_in_prose() {
        let content = r#"First {"draft": true} then the answer {"status": "unsubscribed", "note": "a } in text"} done"#;
        let v: Value = parse_json_response(content).unwrap();
        assert_eq!(v["status"], "unsubscribed");
    }

    #[test]
    fn test_garbage_is_json_error() {
        let err = parse_json_response::<Value>("no json here").unwrap_err();
        assert!(matches!(err, AgentError::Json(_)));
    }
}

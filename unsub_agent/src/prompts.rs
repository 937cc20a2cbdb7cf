//! Prompts and response schemas for every LLM decision the agent makes.

use serde_json::{json, Value};

/// Page analysis prompt. `{{URL}}`, `{{KIND}}` and `{{CONTENT}}` are filled in.
pub const ANALYZE_PAGE_PROMPT: &str = r##"
You are analyzing an email unsubscribe web page to decide the single next action that opts the user out.

Page URL: {{URL}}
Page content ({{KIND}}):
{{CONTENT}}

Decide one nextAction:
- "already_done": the page already states the user is unsubscribed or removed.
- "click_button": one button or link performs the opt-out. Put its CSS selector in buttonSelector.
- "fill_form": a form must be completed and submitted. List every field in fieldsToFill.
- "unknown": nothing on the page relates to unsubscribing.

Rules for fieldsToFill:
- Use the exact selectors from the content above. Never invent selectors.
- type is one of text, email, checkbox, radio, select, textarea.
- For an email address field use the value "{{EMAIL}}".
- For checkboxes or radios that opt out of everything (for example "unsubscribe from all"), set value "true".
- For selects choose the option that means unsubscribe or no emails.
- Do not touch fields that would keep or add subscriptions.
Set requiresEmailInput to true when the form asks for an email address.
Put the form's submit control selector in submitSelector.

Respond with JSON only.
"##;

/// Verification prompt. `{{TEXT}}` is filled in.
pub const VERIFY_RESULT_PROMPT: &str = r##"
An automated agent just tried to unsubscribe from a mailing list. This is the visible text of the page after the attempt:

---
{{TEXT}}
---

Classify the result with one status:
- "unsubscribed": the page confirms the opt-out.
- "already_unsubscribed": the address was not subscribed or was already removed.
- "error": the page reports a failure (expired link, invalid token, server error).
- "requires_action": the user must do something else, such as click a link in a confirmation email.
- "unknown": the text does not say.

Respond with JSON only: {"succeeded": bool, "status": string, "reason": short explanation}.
"##;

/// Summarization prompt. `{{SUBJECT}}`, `{{FROM}}` and `{{BODY}}` are filled in.
pub const SUMMARIZE_EMAIL_PROMPT: &str = r##"
Summarize this email in one or two plain sentences for an inbox overview. No preamble, no markdown.

Subject: {{SUBJECT}}
From: {{FROM}}

{{BODY}}
"##;

/// Categorization prompt. `{{CATEGORIES}}`, `{{SUBJECT}}`, `{{FROM}}` and `{{BODY}}` are filled in.
pub const CATEGORIZE_EMAIL_PROMPT: &str = r##"
Assign this email to at most one of the user's categories.

Categories (JSON):
{{CATEGORIES}}

Email:
Subject: {{SUBJECT}}
From: {{FROM}}

{{BODY}}

Return the id of the best matching category in categoryId, or null when none fits.
confidence is a number from 0 to 1. Be conservative: a wrong category is worse than none.
Respond with JSON only: {"categoryId": string|null, "confidence": number, "reasoning": string}.
"##;

/// Unsubscribe link extraction prompt. `{{BODY}}` is filled in.
pub const EXTRACT_UNSUBSCRIBE_PROMPT: &str = r##"
Find the URL a recipient would open to unsubscribe from this email. Copy it exactly as it appears.
If there is none, answer with the single word NONE.

{{BODY}}
"##;

/// JSON schema for an action plan.
pub fn action_plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hasButton": { "type": "boolean" },
            "buttonSelector": { "type": "string" },
            "hasForm": { "type": "boolean" },
            "fieldsToFill": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "selector": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": ["text", "email", "checkbox", "radio", "select", "textarea"]
                        },
                        "value": { "type": "string" },
                        "purpose": { "type": "string" }
                    },
                    "required": ["selector", "type", "value"]
                }
            },
            "submitSelector": { "type": "string" },
            "requiresEmailInput": { "type": "boolean" },
            "nextAction": {
                "type": "string",
                "enum": ["click_button", "fill_form", "already_done", "unknown"]
            }
        },
        "required": ["hasButton", "hasForm", "fieldsToFill", "requiresEmailInput", "nextAction"]
    })
}

/// JSON schema for an outcome verdict.
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "succeeded": { "type": "boolean" },
            "status": {
                "type": "string",
                "enum": ["unsubscribed", "already_unsubscribed", "error", "unknown", "requires_action"]
            },
            "reason": { "type": "string" }
        },
        "required": ["succeeded", "status", "reason"]
    })
}

/// JSON schema for a category decision.
pub fn category_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "categoryId": { "type": ["string", "null"] },
            "confidence": { "type": "number" },
            "reasoning": { "type": "string" }
        },
        "required": ["categoryId", "confidence"]
    })
}

/// Fill `{{NAME}}` placeholders in a template.
///
/// Substitution is a single pass over the template: inserted values are never
/// scanned again. Unknown placeholders are left as they are.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let template = template.trim();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let name = &after[..end];
        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

/// The longest prefix of `s` with at most `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let out = render(VERIFY_RESULT_PROMPT, &[("TEXT", "You are unsubscribed")]);
        assert!(out.contains("You are unsubscribed"));
        assert!(!out.contains("{{TEXT}}"));
    }

    #[test]
    fn test_render_leaves_email_placeholder_in_analysis_prompt() {
        let out = render(
            ANALYZE_PAGE_PROMPT,
            &[("URL", "https://x.test"), ("KIND", "elements"), ("CONTENT", "{}")],
        );
        assert!(out.contains(r#""{{EMAIL}}""#));
        assert!(out.contains("https://x.test"));
    }

    #[test]
    fn test_render_does_not_expand_inserted_values() {
        let out = render(
            SUMMARIZE_EMAIL_PROMPT,
            &[
                ("SUBJECT", "Hi {{BODY}} {{FROM}}"),
                ("FROM", "news@x.test"),
                ("BODY", "secret body"),
            ],
        );
        assert!(out.contains("Subject: Hi {{BODY}} {{FROM}}"));
        assert_eq!(out.matches("secret body").count(), 1);
        assert_eq!(out.matches("news@x.test").count(), 1);
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed_braces() {
        assert_eq!(render("a {{X}} b {{Y}} c {{", &[("Y", "y")]), "a {{X}} b y c {{");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_schema_enums_match_serde_names() {
        let schema = action_plan_schema();
        let actions = schema["properties"]["nextAction"]["enum"].as_array().unwrap();
        for action in actions {
            let parsed: unsub_agent_types::NextAction =
                serde_json::from_value(action.clone()).unwrap();
            assert_eq!(parsed.to_string(), action.as_str().unwrap());
        }
    }
}

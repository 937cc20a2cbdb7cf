//! Result Verifier: keyword heuristics first, LLM only when inconclusive.

use crate::llm::LlmClient;
use crate::prompts::{render, truncate_chars, verdict_schema, VERIFY_RESULT_PROMPT};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::Deserialize;
use std::sync::LazyLock;
use unsub_agent_types::{OutcomeStatus, OutcomeVerdict};

/// Phrases that confirm the opt-out.
pub const SUCCESS_PHRASES: &[&str] = &[
    "successfully unsubscribed",
    "unsubscribed successfully",
    "unsubscribe successful",
    "you have been unsubscribed",
    "you've been unsubscribed",
    "you have unsubscribed",
    "you are now unsubscribed",
    "you are unsubscribed",
    "you're unsubscribed",
    "has been unsubscribed",
    "successfully removed",
    "removed from",
    "have been removed",
    "has been removed",
    "you will no longer receive",
    "you won't receive",
    "preferences updated",
    "preferences have been updated",
    "preferences saved",
    "subscription cancelled",
    "subscription canceled",
    "successfully opted out",
    "you have opted out",
    "opt-out successful",
    "opt out successful",
];

/// Phrases meaning the address was never, or is no longer, on the list.
pub const ALREADY_DONE_PHRASES: &[&str] = &[
    "already unsubscribed",
    "already been unsubscribed",
    "already opted out",
    "already removed",
    "email not found",
    "email address not found",
    "address not found",
    "could not find your subscription",
    "couldn't find your subscription",
    "could not find your email",
    "no subscription found",
    "not on our list",
    "not on our mailing list",
    "no longer subscribed",
    "not subscribed",
    "is not subscribed",
];

/// Phrases that report a failure.
pub const ERROR_PHRASES: &[&str] = &[
    "link expired",
    "link has expired",
    "link is no longer valid",
    "invalid token",
    "invalid link",
    "invalid request",
    "error occurred",
    "error has occurred",
    "something went wrong",
    "please try again",
    "try again later",
    "unable to process",
    "could not process",
    "request failed",
    "page not found",
    "404 not found",
    "access denied",
];

fn phrase_matcher(phrases: &[&str]) -> AhoCorasick {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(phrases)
        .expect("valid verification phrases")
}

static SUCCESS: LazyLock<AhoCorasick> = LazyLock::new(|| phrase_matcher(SUCCESS_PHRASES));
static ALREADY_DONE: LazyLock<AhoCorasick> = LazyLock::new(|| phrase_matcher(ALREADY_DONE_PHRASES));
static ERROR: LazyLock<AhoCorasick> = LazyLock::new(|| phrase_matcher(ERROR_PHRASES));

/// Visible text sent to the LLM is capped at this many chars.
const MAX_VERIFY_CHARS: usize = 8_000;

/// Deterministic tier. Success is checked before already-done, which is
/// checked before error; the first bucket with a match decides.
pub fn heuristic_verdict(visible_text: &str) -> OutcomeVerdict {
    if visible_text.trim().is_empty() {
        return OutcomeVerdict::unknown("page has no visible text");
    }

    let buckets: [(&AhoCorasick, &[&str], OutcomeStatus); 3] = [
        (&SUCCESS, SUCCESS_PHRASES, OutcomeStatus::Unsubscribed),
        (&ALREADY_DONE, ALREADY_DONE_PHRASES, OutcomeStatus::AlreadyUnsubscribed),
        (&ERROR, ERROR_PHRASES, OutcomeStatus::Error),
    ];

    for (matcher, phrases, status) in buckets {
        if let Some(m) = matcher.find(visible_text) {
            let phrase = phrases[m.pattern().as_usize()];
            return OutcomeVerdict::new(status, format!("page says \"{}\"", phrase));
        }
    }

    OutcomeVerdict::unknown("no confirmation or error wording found")
}

#[derive(Deserialize)]
struct LlmVerdict {
    #[serde(default)]
    status: OutcomeStatus,
    #[serde(default)]
    reason: String,
}

/// Two-tier verifier.
#[derive(Debug, Clone, Default)]
pub struct ResultVerifier {
    llm: Option<LlmClient>,
}

impl ResultVerifier {
    /// A verifier that escalates to the LLM when the heuristics are inconclusive.
    pub fn new(llm: Option<LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify the visible text of the page reached after acting.
    ///
    /// Never fails: an LLM error returns the inconclusive heuristic verdict.
    pub async fn verify(&self, visible_text: &str) -> OutcomeVerdict {
        let verdict = heuristic_verdict(visible_text);
        if !verdict.is_unknown() {
            log::debug!("heuristic verdict: {} ({})", verdict.status, verdict.reason);
            return verdict;
        }
        if visible_text.trim().is_empty() {
            return verdict;
        }
        let Some(llm) = &self.llm else {
            return verdict;
        };

        let prompt = render(
            VERIFY_RESULT_PROMPT,
            &[("TEXT", truncate_chars(visible_text.trim(), MAX_VERIFY_CHARS))],
        );
        let request = llm
            .request(prompt)
            .with_temperature(0.0)
            .with_schema(verdict_schema())
            .without_thinking();

        match llm.complete_json::<LlmVerdict>("verify_result", &request).await {
            Ok(answer) => {
                let reason = if answer.reason.trim().is_empty() {
                    format!("model classified the page as {}", answer.status)
                } else {
                    answer.reason
                };
                log::debug!("llm verdict: {} ({})", answer.status, reason);
                OutcomeVerdict::new(answer.status, reason)
            }
            Err(e) => {
                log::warn!("verification llm call failed, keeping heuristic verdict: {}", e);
                verdict
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scripted_llm, ScriptedReply};
    use crate::error::AgentError;

    #[test]
    fn test_each_bucket() {
        let v = heuristic_verdict("You have been successfully unsubscribed.");
        assert!(v.succeeded);
        assert_eq!(v.status, OutcomeStatus::Unsubscribed);

        let v = heuristic_verdict("This address is already unsubscribed.");
        assert!(v.succeeded);
        assert_eq!(v.status, OutcomeStatus::AlreadyUnsubscribed);

        let v = heuristic_verdict("Sorry, this link has expired.");
        assert!(!v.succeeded);
        assert_eq!(v.status, OutcomeStatus::Error);

        let v = heuristic_verdict("Welcome to our store");
        assert!(!v.succeeded);
        assert_eq!(v.status, OutcomeStatus::Unknown);
    }

    #[test]
    fn test_priority_success_over_error() {
        let v = heuristic_verdict(
            "An error occurred earlier, but you have been successfully unsubscribed. Email not found errors are rare.",
        );
        assert_eq!(v.status, OutcomeStatus::Unsubscribed);

        let v = heuristic_verdict("Invalid token. Email not found.");
        assert_eq!(v.status, OutcomeStatus::AlreadyUnsubscribed);
    }

    #[test]
    fn test_subscription_not_found_wording() {
        let v = heuristic_verdict("\u{c2} Our system could not find your subscription");
        assert!(v.succeeded);
        assert_eq!(v.status, OutcomeStatus::AlreadyUnsubscribed);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            heuristic_verdict("PREFERENCES UPDATED").status,
            OutcomeStatus::Unsubscribed
        );
    }

    #[tokio::test]
    async fn test_llm_only_when_inconclusive() {
        let (llm, provider) = scripted_llm(vec![ScriptedReply::text(
            r#"{"succeeded": true, "status": "requires_action", "reason": "confirm via email"}"#,
        )]);
        let verifier = ResultVerifier::new(Some(llm));

        let v = verifier.verify("You are unsubscribed").await;
        assert_eq!(v.status, OutcomeStatus::Unsubscribed);
        assert_eq!(provider.calls(), 0);

        let v = verifier.verify("Check your inbox to finish").await;
        assert_eq!(v.status, OutcomeStatus::RequiresAction);
        assert!(!v.succeeded);
        assert_eq!(v.reason, "confirm via email");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_skips_llm() {
        let (llm, provider) = scripted_llm(vec![ScriptedReply::text("{}")]);
        let v = ResultVerifier::new(Some(llm)).verify("   ").await;
        assert!(v.is_unknown());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_heuristic() {
        let (llm, _) = scripted_llm(vec![ScriptedReply::error(AgentError::Llm("down".into()))]);
        let v = ResultVerifier::new(Some(llm)).verify("Thanks for visiting").await;
        assert!(v.is_unknown());
        assert!(!v.succeeded);
    }

    #[tokio::test]
    async fn test_llm_garbage_keeps_heuristic() {
        let (llm, _) = scripted_llm(vec![ScriptedReply::text("I think it worked")]);
        let v = ResultVerifier::new(Some(llm)).verify("Thanks for visiting").await;
        assert!(v.is_unknown());
    }
}

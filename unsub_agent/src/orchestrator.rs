//! Unsubscribe Orchestrator: one fresh browsing context per URL, URLs one at
//! a time.

use crate::analyze::{PageIntentAnalyzer, MIN_SIGNAL_CHARS};
use crate::artifacts::{ArtifactStore, Phase};
use crate::browser::{PageDriver, PageLauncher};
use crate::config::{BatchConfig, PageConfig, UsageStats};
use crate::error::{AgentError, AgentResult};
use crate::executor::ActionExecutor;
use crate::extract::{ElementExtractor, RawPageElements};
use crate::verify::{heuristic_verdict, ResultVerifier};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use unsub_agent_types::{Artifact, OutcomeStatus, OutcomeVerdict, UnsubscribeOutcome, UnsubscribeTarget};

/// Drives the analyze, act and verify loop.
pub struct UnsubscribeOrchestrator {
    launcher: Arc<dyn PageLauncher>,
    extractor: ElementExtractor,
    analyzer: PageIntentAnalyzer,
    executor: ActionExecutor,
    verifier: ResultVerifier,
    artifacts: ArtifactStore,
    page_config: PageConfig,
    batch_config: BatchConfig,
    usage: Arc<UsageStats>,
}

impl UnsubscribeOrchestrator {
    /// Assemble an orchestrator from its stages.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        launcher: Arc<dyn PageLauncher>,
        extractor: ElementExtractor,
        analyzer: PageIntentAnalyzer,
        verifier: ResultVerifier,
        page_config: PageConfig,
        batch_config: BatchConfig,
        usage: Arc<UsageStats>,
    ) -> Self {
        Self {
            launcher,
            extractor,
            analyzer,
            executor: ActionExecutor::new(page_config.clone()),
            verifier,
            artifacts: ArtifactStore::new(batch_config.artifacts_dir.clone(), batch_config.audit_log),
            page_config,
            batch_config,
            usage,
        }
    }

    /// Process targets strictly in order with the configured delay between
    /// them. Always returns one outcome per target.
    pub async fn run_batch(&self, targets: &[UnsubscribeTarget]) -> Vec<UnsubscribeOutcome> {
        let mut outcomes = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            if i > 0 && !self.batch_config.inter_request_delay.is_zero() {
                tokio::time::sleep(self.batch_config.inter_request_delay).await;
            }

            log::info!("unsubscribing {}/{}: {}", i + 1, targets.len(), target.url);
            let outcome = self.unsubscribe(target).await;
            log::info!(
                "{}: {} ({})",
                target.url,
                if outcome.succeeded { "ok" } else { "failed" },
                outcome.message
            );

            if let Err(e) = self.artifacts.record(&outcome).await {
                log::warn!("could not append audit line for {}: {}", target.url, e);
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Run one target in its own browsing context and always close it.
    pub async fn unsubscribe(&self, target: &UnsubscribeTarget) -> UnsubscribeOutcome {
        let mut page = match self.launcher.launch().await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("could not launch browser for {}: {}", target.url, e);
                return UnsubscribeOutcome::failure(&target.url, format!("could not launch browser: {}", e));
            }
        };
        self.usage.increment_browser_sessions();

        let outcome = self.attempt(page.as_ref(), target).await;

        if let Err(e) = page.close().await {
            log::warn!("closing browser for {} failed: {}", target.url, e);
        }

        outcome
    }

    async fn attempt(&self, page: &dyn PageDriver, target: &UnsubscribeTarget) -> UnsubscribeOutcome {
        let mut before = None;
        match self.try_attempt(page, target, &mut before).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("unsubscribe attempt on {} failed: {}", target.url, e);
                let after = self.capture(page, &target.url, Phase::After).await;
                UnsubscribeOutcome::failure(&target.url, format!("unsubscribe attempt failed: {}", e))
                    .with_artifacts(before, after)
            }
        }
    }

    async fn try_attempt(
        &self,
        page: &dyn PageDriver,
        target: &UnsubscribeTarget,
        before: &mut Option<Artifact>,
    ) -> AgentResult<UnsubscribeOutcome> {
        let url = target.url.as_str();
        let navigation_limit = self.page_config.navigation_timeout + self.page_config.step_timeout;

        if !self.bounded(navigation_limit, page.navigate(url)).await? {
            let after = self.capture(page, url, Phase::After).await;
            return Ok(UnsubscribeOutcome::failure(url, "could not load the unsubscribe page")
                .with_artifacts(None, after));
        }

        *before = self.capture(page, url, Phase::Before).await;

        let raw = match self.step(page.extract_elements()).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("element extraction failed on {}: {}", url, e);
                RawPageElements::default()
            }
        };
        let snapshot = self.extractor.snapshot(raw);

        let html = if snapshot.signal_len() < MIN_SIGNAL_CHARS {
            self.step(page.html()).await.unwrap_or_default()
        } else {
            String::new()
        };

        let plan = self.analyzer.analyze_page(url, &snapshot, &html).await;
        let report = self
            .executor
            .execute(page, &plan, target.owner_email_address.as_deref())
            .await;

        if !report.acted && !report.already_done {
            let after = self.capture(page, url, Phase::After).await;
            return Ok(UnsubscribeOutcome::failure(url, report.detail).with_artifacts(before.take(), after));
        }

        let text = match self.step(page.visible_text()).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("could not read visible text on {}: {}", url, e);
                String::new()
            }
        };
        let after = self.capture(page, url, Phase::After).await;

        let verdict = if report.already_done {
            let heuristic = heuristic_verdict(&text);
            if heuristic.succeeded {
                heuristic
            } else {
                OutcomeVerdict::new(OutcomeStatus::AlreadyUnsubscribed, report.detail.clone())
            }
        } else {
            self.verifier.verify(&text).await
        };

        let mut outcome = UnsubscribeOutcome::from_verdict(url, &verdict).with_artifacts(before.take(), after);
        if report.acted {
            outcome.message = format!("{}; {}", report.detail, verdict.reason);
        }
        Ok(outcome)
    }

    /// Screenshot for audit; a failure leaves the artifact out.
    async fn capture(&self, page: &dyn PageDriver, url: &str, phase: Phase) -> Option<Artifact> {
        let limit = self.page_config.navigation_timeout;
        match self.bounded(limit, page.screenshot()).await {
            Ok(png) => Some(self.artifacts.save(&png, url, phase).await),
            Err(e) => {
                log::debug!("no {:?} screenshot for {}: {}", phase, url, e);
                None
            }
        }
    }

    async fn step<T>(&self, fut: impl Future<Output = AgentResult<T>>) -> AgentResult<T> {
        self.bounded(self.page_config.step_timeout, fut).await
    }

    async fn bounded<T>(&self, limit: Duration, fut: impl Future<Output = AgentResult<T>>) -> AgentResult<T> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AgentError::Timeout)?
    }
}

impl std::fmt::Debug for UnsubscribeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeOrchestrator")
            .field("page_config", &self.page_config)
            .field("batch_config", &self.batch_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scripted_llm, MockLauncher, MockPage, ScriptedReply};

    fn orchestrator(launcher: MockLauncher, verifier: ResultVerifier) -> UnsubscribeOrchestrator {
        orchestrator_with(launcher, PageIntentAnalyzer::new(None), verifier)
    }

    fn orchestrator_with(
        launcher: MockLauncher,
        analyzer: PageIntentAnalyzer,
        verifier: ResultVerifier,
    ) -> UnsubscribeOrchestrator {
        UnsubscribeOrchestrator::new(
            Arc::new(launcher),
            ElementExtractor::default(),
            analyzer,
            verifier,
            PageConfig::default(),
            BatchConfig::default(),
            Arc::new(UsageStats::new()),
        )
    }

    fn confirming_page() -> MockPage {
        MockPage::new()
            .with_clickable("#unsubscribe")
            .with_visible_text("Click to unsubscribe")
            .with_text_after_action("You have been successfully unsubscribed.")
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_isolates_navigation_failure() {
        let pages = vec![confirming_page(), MockPage::new().failing_navigation(), confirming_page()];
        let launcher = MockLauncher::new(pages.clone());
        let orchestrator = orchestrator(launcher, ResultVerifier::default());

        let targets: Vec<UnsubscribeTarget> = ["https://a.test/u", "https://b.test/u", "https://c.test/u"]
            .into_iter()
            .map(UnsubscribeTarget::new)
            .collect();
        let outcomes = orchestrator.run_batch(&targets).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded);
        assert!(!outcomes[1].succeeded);
        assert_eq!(outcomes[1].url, "https://b.test/u");
        assert!(outcomes[2].succeeded);
        assert_eq!(outcomes[2].status, Some(OutcomeStatus::Unsubscribed));
        assert!(pages.iter().all(MockPage::is_closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_waits_between_urls() {
        let launcher = MockLauncher::new(vec![confirming_page(), confirming_page()]);
        let orchestrator = orchestrator(launcher, ResultVerifier::default());
        let targets = vec![UnsubscribeTarget::new("https://a.test"), UnsubscribeTarget::new("https://b.test")];

        let start = tokio::time::Instant::now();
        orchestrator.run_batch(&targets).await;
        // two settle delays plus one inter-request delay
        assert!(start.elapsed() >= Duration::from_millis(1500 * 2 + 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_not_found_page_is_already_unsubscribed() {
        let page = MockPage::new()
            .with_clickable("#unsubscribe")
            .with_text_after_action("Our system could not find your subscription");
        let (llm, provider) = scripted_llm(vec![]);
        let orchestrator = orchestrator(MockLauncher::new(vec![page]), ResultVerifier::new(Some(llm)));

        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.status, Some(OutcomeStatus::AlreadyUnsubscribed));
        assert_eq!(provider.calls(), 0);
        assert!(outcome.before_artifact.is_some());
        assert!(outcome.after_artifact.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconclusive_page_escalates_and_stays_unknown() {
        let page = MockPage::new()
            .with_clickable("#unsubscribe")
            .with_text_after_action("Thanks!");
        let (llm, provider) = scripted_llm(vec![ScriptedReply::text(
            r#"{"succeeded": false, "status": "unknown", "reason": "no confirmation"}"#,
        )]);
        let orchestrator = orchestrator(MockLauncher::new(vec![page]), ResultVerifier::new(Some(llm)));

        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.status, Some(OutcomeStatus::Unknown));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_control_found_is_a_failure() {
        let page = MockPage::new().with_visible_text("Newsletter archive");
        let orchestrator = orchestrator(MockLauncher::new(vec![page.clone()]), ResultVerifier::default());

        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.message, "could not find an unsubscribe button");
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_an_outcome() {
        let orchestrator = orchestrator(MockLauncher::new(vec![]), ResultVerifier::default());
        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;
        assert!(!outcome.succeeded);
        assert!(outcome.message.starts_with("could not launch browser"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_navigation_times_out_and_closes() {
        let page = MockPage::new().hanging_on_navigation();
        let orchestrator = orchestrator(MockLauncher::new(vec![page.clone()]), ResultVerifier::default());

        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;
        assert!(!outcome.succeeded);
        assert!(outcome.message.contains("timed out"));
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_done_plan_skips_actions_and_verifier() {
        let page = MockPage::new()
            .with_clickable("#unsubscribe")
            .with_visible_text("Nothing more to do here, see you around.");
        let (analyzer_llm, analyzer_provider) =
            scripted_llm(vec![ScriptedReply::text(r#"{"nextAction": "already_done"}"#)]);
        let (verifier_llm, verifier_provider) = scripted_llm(vec![]);
        let orchestrator = orchestrator_with(
            MockLauncher::new(vec![page.clone()]),
            PageIntentAnalyzer::new(Some(analyzer_llm)),
            ResultVerifier::new(Some(verifier_llm)),
        );

        let outcome = orchestrator.unsubscribe(&UnsubscribeTarget::new("https://x.test/u")).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.status, Some(OutcomeStatus::AlreadyUnsubscribed));
        assert!(page.actions().is_empty());
        assert_eq!(analyzer_provider.calls(), 1);
        assert_eq!(verifier_provider.calls(), 0);
        assert!(outcome.before_artifact.is_some());
        assert!(outcome.after_artifact.is_some());
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_form_plan_end_to_end() {
        let page = MockPage::new()
            .with_field("#email")
            .with_field("#all")
            .with_clickable("#save")
            .with_visible_text("Enter your email address to manage your subscription.")
            .with_text_after_action("You have been successfully unsubscribed.");
        let plan = r##"{
            "hasButton": true,
            "hasForm": true,
            "fieldsToFill": [
                {"selector": "#email", "type": "email", "value": "{{EMAIL}}", "purpose": "address"},
                {"selector": "#all", "type": "checkbox", "value": "true", "purpose": "every list"}
            ],
            "submitSelector": "#save",
            "requiresEmailInput": true,
            "nextAction": "fill_form"
        }"##;
        let (analyzer_llm, _) = scripted_llm(vec![ScriptedReply::text(plan)]);
        let (verifier_llm, verifier_provider) = scripted_llm(vec![]);
        let orchestrator = orchestrator_with(
            MockLauncher::new(vec![page.clone()]),
            PageIntentAnalyzer::new(Some(analyzer_llm)),
            ResultVerifier::new(Some(verifier_llm)),
        );

        let target = UnsubscribeTarget::new("https://x.test/prefs").with_owner_email(Some("me@example.com"));
        let outcome = orchestrator.unsubscribe(&target).await;

        assert_eq!(
            page.actions(),
            vec!["fill #email=me@example.com", "check #all", "click #save"]
        );
        assert!(outcome.succeeded);
        assert_eq!(outcome.status, Some(OutcomeStatus::Unsubscribed));
        assert!(outcome.message.starts_with("submitted form via"));
        assert_eq!(verifier_provider.calls(), 0);
        assert!(page.is_closed());
    }
}

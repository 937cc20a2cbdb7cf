use std::env;
use unsub_agent::LlmSettings;

fn run_live_tests() -> bool {
    let _ = dotenvy::dotenv();
    matches!(
        env::var("RUN_LIVE_TESTS")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[tokio::test]
async fn live_llm_completion_smoke() -> Result<(), Box<dyn std::error::Error>> {
    if !run_live_tests() {
        eprintln!("Skipping live LLM smoke test (RUN_LIVE_TESTS not enabled).");
        return Ok(());
    }
    let _ = env_logger::builder().is_test(true).try_init();

    let settings = LlmSettings::from_env()
        .expect("RUN_LIVE_TESTS is enabled, but neither GEMINI_API_KEY nor OPENAI_API_KEY is set");
    let llm = unsub_agent::LlmClient::new(settings.into_provider(), unsub_agent::AgentConfig::new())?;

    let response = llm
        .complete("smoke", &llm.request("Reply with exactly: ok"))
        .await?;

    assert!(!response.content.trim().is_empty());
    assert_eq!(llm.usage().calls_for("smoke"), 1);
    Ok(())
}

#[cfg(feature = "chrome")]
#[tokio::test]
async fn live_chrome_unsubscribe_smoke() -> Result<(), Box<dyn std::error::Error>> {
    if !run_live_tests() {
        eprintln!("Skipping live Chrome smoke test (RUN_LIVE_TESTS not enabled).");
        return Ok(());
    }
    let _ = env_logger::builder().is_test(true).try_init();

    let url = env::var("UNSUB_SMOKE_URL").unwrap_or_else(|_| "https://example.com/".to_string());
    let mut builder = unsub_agent::Agent::builder().with_page_config(unsub_agent::PageConfig::new().with_no_sandbox(true));
    if let Some(settings) = LlmSettings::from_env() {
        builder = builder.with_llm_settings(settings);
    }
    let agent = builder.build()?;

    let outcomes = agent.run_unsubscribe_batch(&[url.clone()], None).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].url, url);
    assert!(outcomes[0].before_artifact.is_some());
    assert_eq!(agent.usage().browser_sessions, 1);
    Ok(())
}

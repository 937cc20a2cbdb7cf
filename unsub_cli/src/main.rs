pub mod options;

use clap::Parser;
use options::Cli;
use std::process::ExitCode;
use std::time::Duration;
use unsub_agent::{Agent, BatchConfig, LlmSettings, PageConfig, MAX_URLS_PER_BATCH};
use unsub_agent_types::UnsubscribeOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        use env_logger::Env;
        let env = Env::default()
            .filter_or("RUST_LOG", "info")
            .write_style_or("RUST_LOG_STYLE", "always");

        env_logger::init_from_env(env);
    }

    if cli.urls.len() > MAX_URLS_PER_BATCH {
        eprintln!(
            "at most {} URLs per run, got {}",
            MAX_URLS_PER_BATCH,
            cli.urls.len()
        );
        return ExitCode::from(2);
    }

    let mut page_config = PageConfig::new()
        .with_headless(!cli.headful)
        .with_no_sandbox(cli.no_sandbox);
    if let Some(bin) = cli.chrome_bin {
        page_config = page_config.with_chrome_executable(bin);
    }

    let mut batch_config = BatchConfig::new().with_audit_log(cli.artifacts.is_some());
    if let Some(delay) = cli.delay {
        batch_config = batch_config.with_inter_request_delay(Duration::from_millis(delay));
    }
    if let Some(dir) = cli.artifacts {
        batch_config = batch_config.with_artifacts_dir(dir);
    }

    let mut builder = Agent::builder()
        .with_page_config(page_config)
        .with_batch_config(batch_config);

    match LlmSettings::from_env() {
        Some(settings) => {
            let settings = match cli.model {
                Some(model) => settings.with_model(model),
                None => settings,
            };
            builder = builder.with_llm_settings(settings);
        }
        None => log::warn!("no GEMINI_API_KEY or OPENAI_API_KEY set, using heuristics only"),
    }

    let agent = match builder.build() {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcomes = agent
        .run_unsubscribe_batch(&cli.urls, cli.email.as_deref())
        .await;

    let printed: Vec<UnsubscribeOutcome> = if cli.inline_images {
        outcomes.clone()
    } else {
        outcomes.iter().map(UnsubscribeOutcome::for_audit).collect()
    };

    match serde_json::to_string_pretty(&printed) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let usage = agent.usage();
    log::info!(
        "{} browser sessions, {} llm calls, {} tokens",
        usage.browser_sessions,
        usage.llm_calls,
        usage.total_tokens
    );

    if outcomes.iter().all(|o| o.succeeded) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

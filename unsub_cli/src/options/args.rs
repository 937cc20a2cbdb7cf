use clap::Parser;
use std::path::PathBuf;

/// program to unsubscribe from mailing lists by visiting their unsubscribe pages.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Unsubscribe URL to visit. Repeat for a batch.
    #[clap(short, long = "url", required = true)]
    pub urls: Vec<String>,
    /// Address typed into forms that ask for the subscriber email.
    #[clap(short, long, env = "UNSUB_OWNER_EMAIL")]
    pub email: Option<String>,
    /// Directory for before/after screenshots and the outcomes.jsonl audit log.
    #[clap(short, long, env = "UNSUB_ARTIFACTS_DIR")]
    pub artifacts: Option<PathBuf>,
    /// LLM model override. The provider is picked from GEMINI_API_KEY or OPENAI_API_KEY.
    #[clap(short, long, env = "UNSUB_LLM_MODEL")]
    pub model: Option<String>,
    /// Delay between URLs in milli seconds
    #[clap(short = 'D', long)]
    pub delay: Option<u64>,
    /// Show the browser window.
    #[clap(long)]
    pub headful: bool,
    /// Launch Chrome without its sandbox (containers).
    #[clap(long)]
    pub no_sandbox: bool,
    /// Path to the Chrome binary.
    #[clap(long, env = "CHROME_BIN")]
    pub chrome_bin: Option<PathBuf>,
    /// Keep the base64 screenshots in the printed outcomes.
    #[clap(long)]
    pub inline_images: bool,
    /// Print progress logs on standard error
    #[clap(short, long)]
    pub verbose: bool,
}

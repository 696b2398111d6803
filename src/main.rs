use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pagechat_pilot::{ChromeHost, ConsoleTranscript, InteractiveSession, PilotError, StdinPrompts};
use pagechat_types::{ConfigLoader, EffectiveConfig};
use tracing_subscriber::EnvFilter;

/// How long runtime shutdown waits for a stdin read still blocked in the background.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// pagechat -- talk to a chat web application through a headless browser.
#[derive(Parser, Debug)]
#[command(name = "pagechat", version, about)]
struct Cli {
    /// First prompt to send
    #[arg(short = 'p', long, default_value = "Hello, GPT")]
    prompt: String,

    /// Proxy server for the browser, e.g. http://127.0.0.1:8080
    #[arg(short = 'x', long)]
    proxy: Option<String>,

    /// Print each reply once it is complete instead of streaming it
    #[arg(long, visible_alias = "ns")]
    no_streaming: bool,

    /// Extra config file, merged over ~/.pagechat and ./.pagechat
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat page to open
    #[arg(long)]
    url: Option<String>,

    /// Chrome or Chromium binary to launch
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Give up on a reply that is still streaming after this many seconds
    #[arg(long, value_name = "SECS")]
    stream_limit: Option<u64>,

    /// Print the effective configuration and where each value came from, then exit
    #[arg(long)]
    show_config: bool,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let effective = load_config(&cli)?;

    if cli.show_config {
        print!("{}", render_effective_config(&effective)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(run(effective, cli.prompt));
    // A pending stdin read would otherwise keep the process alive until Enter.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<EffectiveConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_explicit_path(path.clone());
    }
    if let Some(proxy) = &cli.proxy {
        loader = loader.with_override("--proxy", &["browser", "proxy"], proxy.as_str());
    }
    if cli.no_streaming {
        loader = loader.with_override("--no-streaming", &["streaming"], false);
    }
    if let Some(url) = &cli.url {
        loader = loader.with_override("--url", &["page", "url"], url.as_str());
    }
    if let Some(chrome) = &cli.chrome {
        loader = loader.with_override(
            "--chrome",
            &["browser", "binary"],
            chrome.to_string_lossy().into_owned(),
        );
    }
    if cli.headful {
        loader = loader.with_override("--headful", &["browser", "headless"], false);
    }
    if let Some(secs) = cli.stream_limit {
        let secs = i64::try_from(secs).context("--stream-limit is out of range")?;
        loader = loader.with_override("--stream-limit", &["timing", "stream_limit_secs"], secs);
    }

    let effective = loader.load().context("failed to load configuration")?;
    for file in &effective.source_files {
        tracing::debug!(path = %file.display(), "merged config file");
    }
    Ok(effective)
}

/// One `field = value  # source` line per leaf of the configuration.
fn render_effective_config(effective: &EffectiveConfig) -> anyhow::Result<String> {
    let value = toml::Value::try_from(&effective.config).context("failed to serialize configuration")?;
    let mut leaves = Vec::new();
    collect_leaves("", &value, &mut leaves);

    let mut out = String::new();
    for (path, value) in leaves {
        out.push_str(&format!("{path} = {value}  # {}\n", effective.source_of(&path)));
    }
    Ok(out)
}

fn collect_leaves(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(&path, child, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.to_string())),
    }
}

async fn run(effective: EffectiveConfig, first_prompt: String) -> anyhow::Result<()> {
    let config = effective.config;

    let host = ChromeHost::launch(&config)
        .await
        .context("failed to start the browser")?;

    let mut session = InteractiveSession::new(host, config);
    let mut prompts = StdinPrompts::new();
    let mut transcript = ConsoleTranscript::new();

    match session
        .run(&first_prompt, &mut prompts, &mut transcript, interrupted())
        .await
    {
        Ok(stats) => {
            tracing::debug!(?stats, "conversation finished");
            Ok(())
        }
        Err(PilotError::Interrupted) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["pagechat"]);
        assert_eq!(cli.prompt, "Hello, GPT");
        assert!(cli.proxy.is_none());
        assert!(!cli.no_streaming);
        assert!(!cli.show_config);
    }

    #[test]
    fn cli_short_flags_and_alias() {
        let cli = Cli::parse_from(["pagechat", "-p", "Hi", "-x", "http://127.0.0.1:8080", "--ns"]);
        assert_eq!(cli.prompt, "Hi");
        assert_eq!(cli.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert!(cli.no_streaming);
    }

    #[test]
    fn leaves_are_dotted_paths() {
        let value: toml::Value = toml::from_str("streaming = true\n[timing]\npoll_interval_ms = 100\n").unwrap();
        let mut leaves = Vec::new();
        collect_leaves("", &value, &mut leaves);
        assert!(leaves.contains(&("streaming".to_string(), "true".to_string())));
        assert!(leaves.contains(&("timing.poll_interval_ms".to_string(), "100".to_string())));
    }
}

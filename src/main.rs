//! tabconsole - a JavaScript console for a browser tab
//!
//! Attaches to a browser's remote debugging port, evaluates expressions in
//! the selected tab and relays that tab's console output to the terminal.

mod config;
mod console_log;
mod error;
mod format;
mod launch;
mod prompt;
mod protocol;
mod relay;
mod repl;

use clap::Parser;
use config::{default_config_path, ConsoleConfig, FileConfig, DEFAULT_HOST, DEFAULT_PORT};
use error::ConsoleError;
use protocol::cdp::CdpClient;
use repl::{Repl, Session};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tabconsole", version, about = "JavaScript console for a browser tab")]
struct Cli {
    /// Host the browser's debugging port listens on
    #[arg(long, env = "TABCONSOLE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Remote debugging port (`--remote-debugging-port` of the browser)
    #[arg(short, long, env = "TABCONSOLE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Editor and path mapping config [default: ~/.tabconsole/config.json]
    #[arg(long, env = "TABCONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

async fn run(cli: Cli) -> Result<(), ConsoleError> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let file = FileConfig::load(&config_path)?;

    let color = !cli.no_color
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stdout().is_terminal();
    let config = ConsoleConfig::new(cli.host, cli.port, color, file);

    tracing::info!(endpoint = %config.http_base(), "Connecting");
    let client = Arc::new(CdpClient::connect(&config).await?);
    let session = Session::start(client, config).await?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut repl = Repl::new(session, std::io::stdout());
    repl.run(stdin).await
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so they never land in the middle of the prompt line
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabconsole=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::debug!(error = ?e, "Console stopped");
            eprintln!("tabconsole: {e}");
            1
        }
    };

    // The stdin reader parks a blocking thread that runtime shutdown would wait on
    std::process::exit(code);
}

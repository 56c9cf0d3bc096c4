//! agent-monitor - Command-line tool for tailing agent logs
//!
//! Streams a client or server agent's log at a chosen level, or fetches a
//! bounded range of it. While streaming, lines typed on stdin change the
//! level or mode without losing what was already printed.

mod commands;
mod config;
mod output;

use agent_monitor_client::{AuthorizedFetch, HttpFetch};
use agent_monitor_core::{LogLevel, PayloadFormat, StreamMode, Target};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::MonitorArgs;
use crate::config::Config;
use crate::output::OutputContext;

#[derive(Parser)]
#[command(name = "agent-monitor")]
#[command(author, version, about = "Tail agent logs at a selectable level")]
struct Cli {
    /// Agent HTTP address [default: http://localhost:4646]
    #[arg(short, long, env = "AGENT_MONITOR_ADDR")]
    address: Option<String>,

    /// Access token, sent as a bearer token
    #[arg(long, env = "AGENT_MONITOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Client agent to monitor
    #[arg(long, conflicts_with = "server_id", required_unless_present = "server_id")]
    client_id: Option<String>,

    /// Server agent to monitor
    #[arg(long)]
    server_id: Option<String>,

    /// Log level: error, warn, info, debug, trace
    #[arg(short, long)]
    level: Option<LogLevel>,

    /// Fetch a bounded range instead of streaming
    #[arg(long)]
    paged: bool,

    /// Ask the agent for raw text instead of framed output
    #[arg(long)]
    plain: bool,

    /// Print the first N bytes of the log (implies --paged)
    #[arg(long, value_name = "N", conflicts_with = "tail")]
    head: Option<u64>,

    /// Print the last N bytes of the log (implies --paged)
    #[arg(long, value_name = "N")]
    tail: Option<u64>,

    /// Configuration file path
    #[arg(short, long, env = "AGENT_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> StreamMode {
        if self.paged || self.head.is_some() || self.tail.is_some() {
            StreamMode::Paged
        } else {
            StreamMode::Streaming
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let mut merged = config.merge_with_args(
        cli.address.as_deref(),
        cli.token.as_deref(),
        cli.level,
        cli.no_color,
    );
    if cli.plain {
        merged.monitor.format = PayloadFormat::Plain;
    }

    let ctx = OutputContext::new(merged.no_color, cli.quiet);

    let target = Target::from_parts(cli.client_id.as_deref(), cli.server_id.as_deref())
        .context("Invalid monitor target")?;
    let args = MonitorArgs {
        target,
        level: merged.level,
        mode: cli.mode(),
        head: cli.head,
        tail: cli.tail,
    };

    let fetch = create_fetch(&merged.address, merged.token.as_deref())?;
    if let Err(e) = commands::monitor(fetch, merged.monitor, args, &ctx).await {
        ctx.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

/// Create a fetcher for the given agent address
fn create_fetch(address: &str, token: Option<&str>) -> Result<Arc<dyn AuthorizedFetch>> {
    let fetch = match token {
        Some(token) => HttpFetch::with_bearer_token(address, token),
        None => HttpFetch::new(address),
    }
    .context("Failed to create agent client")?;
    Ok(Arc::new(fetch))
}

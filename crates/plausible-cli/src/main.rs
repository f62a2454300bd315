//! Plausible CLI - send, replay and inspect analytics events.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::Context;
use std::path::PathBuf;
use tracing::debug;

/// Plausible CLI - deliver analytics events with on-disk retry.
#[derive(Parser)]
#[command(name = "plausible")]
#[command(about = "Send Plausible events and manage the pending event queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory for config, pending events and logs
    #[arg(long, env = "PLAUSIBLE_BASE_DIR", global = true)]
    base_dir: Option<PathBuf>,

    /// Site domain registered with the collector
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Collector base URL (`/event` is appended)
    #[arg(long, global = true)]
    host: Option<String>,

    /// User agent sent with every request
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Do not persist or retry failed events
    #[arg(long, global = true)]
    no_retry: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver one event and wait for the outcome
    Send {
        /// Event name ("pageview" for page views)
        #[arg(short, long, default_value = plausible_courier::PAGEVIEW)]
        name: String,
        /// Page URL; relative paths become app://localhost/<path>
        #[arg(short, long)]
        url: String,
        /// Referrer URL
        #[arg(short, long, default_value = "")]
        referrer: String,
        /// Custom property as key=value; repeatable
        #[arg(short, long = "prop", value_parser = commands::parse_prop)]
        props: Vec<(String, String)>,
        /// Run the full retry schedule before queueing a failed event
        #[arg(long)]
        wait: bool,
    },

    /// Give every pending event one delivery attempt
    Replay,

    /// List pending events
    Pending,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = Context::load(
        cli.base_dir,
        commands::Overrides {
            domain: cli.domain,
            host: cli.host,
            user_agent: cli.user_agent,
            no_retry: cli.no_retry,
        },
    )?;

    observability::init_with_config(observability::LogConfig {
        service_name: "plausible".into(),
        default_level: cli
            .log_level
            .unwrap_or_else(|| ctx.settings.log_level.clone()),
        log_path: Some(ctx.paths.log_file()),
        also_stderr: true,
    })?;

    debug!(base_dir = %ctx.paths.base_dir().display(), "Plausible CLI starting");

    match cli.command {
        Commands::Send {
            name,
            url,
            referrer,
            props,
            wait,
        } => commands::send(&ctx, &name, &url, &referrer, props, wait, &cli.format).await,
        Commands::Replay => commands::replay(&ctx, &cli.format).await,
        Commands::Pending => commands::pending(&ctx, &cli.format).await,
    }
}

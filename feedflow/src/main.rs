//! Command-line entry point.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use feedflow::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedflow", version, about = "Daily strip fetch, feed build and heartbeat")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once and print the run result
    Run {
        /// Strip date (YYYY-MM-DD); defaults to today in UTC
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Override the heartbeat endpoint for this run
        #[arg(long)]
        endpoint: Option<String>,

        /// Correlation id reported with the run
        #[arg(long, default_value = "manual")]
        correlation_id: String,
    },
    /// Trigger the pipeline every day at the configured time
    Schedule,
    /// Check the configuration and exit
    Validate,
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,feedflow=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn spawn_ctrl_c(token: Arc<CancellationToken>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel("Interrupted");
        }
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = FeedflowConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if matches!(cli.command, Command::Validate) {
        let builder = config.pipeline_builder()?;
        println!(
            "Configuration OK: pipeline '{}' with steps {}",
            builder.name(),
            builder.step_names().join(" -> ")
        );
        return Ok(ExitCode::SUCCESS);
    }

    let workers = Workers::from_config(&config).context("Failed to create workers")?;
    let orchestrator = config
        .pipeline_builder()?
        .with_event_sink(Arc::new(LoggingEventSink::default()))
        .build(workers)?;

    match cli.command {
        Command::Run {
            date,
            endpoint,
            correlation_id,
        } => {
            let mut event = TriggerEvent::new(correlation_id);
            if let Some(date) = date {
                event = event.with_date(date);
            }
            if let Some(endpoint) = endpoint {
                event = event.with_endpoint(endpoint);
            }

            let cancel = Arc::new(CancellationToken::new());
            spawn_ctrl_c(Arc::clone(&cancel));
            let budget = config.run_budget().map(|b| cancel.cancel_after(b));

            let result = orchestrator.trigger(event, &cancel).await?;
            if let Some(budget) = budget {
                budget.abort();
            }

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Schedule => {
            let schedule = config.schedule()?;
            let shutdown = Arc::new(CancellationToken::new());
            spawn_ctrl_c(Arc::clone(&shutdown));

            info!(at = %schedule.time(), pipeline = orchestrator.name(), "Starting daily schedule");
            let fired = run_daily(&orchestrator, schedule, config.run_budget(), &shutdown).await;
            info!(fired, "Schedule finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => Ok(ExitCode::SUCCESS),
    }
}

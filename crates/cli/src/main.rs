mod cli;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};

use nightshift_core::{Config, PowerAction, ValidationError};
use nightshift_provider::AwsCloud;
use nightshift_scheduler::{InstanceScheduler, SchedulerError};

use crate::cli::{CliArgs, Command};
use crate::config::{CliConfig, SelectionError};

/// sysexits: bad invocation.
const EXIT_USAGE: u8 = 64;
/// sysexits: try again later.
const EXIT_TEMPFAIL: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "nightshift failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    nightshift_core::config::load_dotenv();
    let mut config = Config::from_env();
    config.log_summary();

    let cli_config = CliConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let selection = cli_config.resolve(
        args.command.target(),
        args.region.as_deref(),
        &config.aws.region,
        &config.schedule,
    )?;
    config.aws.region = selection.region.clone();
    debug!(config = %config.redacted_summary(), "Effective configuration");
    let concurrency = cli_config
        .alarm_concurrency
        .unwrap_or(config.schedule.alarm_concurrency);

    let cloud = Arc::new(AwsCloud::connect(&config.aws).await);
    let scheduler = InstanceScheduler::from_provider(cloud, concurrency);

    info!(
        region = %selection.region,
        tag_key = %selection.tag_key,
        tag_value = %selection.tag_value,
        "Selection resolved"
    );

    let action = match &args.command {
        Command::Start(_) => PowerAction::Start,
        Command::Stop(_) => PowerAction::Stop,
        Command::Plan { action, .. } => {
            let plan = scheduler
                .plan(PowerAction::from(*action), &selection.tag_key, &selection.tag_value)
                .await
                .context("planning failed")?;
            return output::print_plan(&plan, args.json);
        }
    };

    let report = scheduler
        .run(action, &selection.tag_key, &selection.tag_value)
        .await
        .with_context(|| format!("{action} failed in {}", selection.region))?;
    output::print_report(&report, args.json)?;

    Ok(())
}

/// Map a failure to a process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SchedulerError>() {
        return match e {
            SchedulerError::Validation(_) => EXIT_USAGE,
            SchedulerError::Provider(p) if p.is_retryable() => EXIT_TEMPFAIL,
            SchedulerError::Provider(_) => 1,
        };
    }
    if err.downcast_ref::<SelectionError>().is_some()
        || err.downcast_ref::<ValidationError>().is_some()
    {
        return EXIT_USAGE;
    }
    1
}

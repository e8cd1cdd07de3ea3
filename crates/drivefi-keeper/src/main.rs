//! # DriveFi Keeper
//!
//! Entry point for the `drivefi-keeper` binary: parses the CLI, sets up
//! logging, and runs the requested subcommand.
//!
//! - `demo`    : open sales on in-memory ledgers and settle them via the keeper
//! - `version` : print build version information

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drivefi_keeper::demo::{self, DemoParams};
use drivefi_keeper::logging;
use drivefi_types::{KeeperConfig, constants};

use cli::{Commands, DemoArgs, KeeperCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = KeeperCli::parse();

    match cli.command {
        Commands::Demo(args) => {
            logging::init_logging(&cli.log_level, cli.log_format)?;
            run_demo(args).await
        }
        Commands::Version => {
            println!("{} keeper {}", constants::ENGINE_NAME, constants::VERSION);
            Ok(())
        }
    }
}

fn keeper_config(args: &DemoArgs) -> Result<KeeperConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read keeper config {}", path.display()))?;
            KeeperConfig::from_json(&raw)
                .with_context(|| format!("invalid keeper config {}", path.display()))?
        }
        None => KeeperConfig::default(),
    };
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }
    config.validate()?;
    Ok(config)
}

async fn run_demo(args: DemoArgs) -> Result<()> {
    let params = DemoParams {
        sales: args.sales,
        total_installments: args.installments,
        installment_amount: args.amount,
        payment_delay: Duration::from_millis(args.payment_delay_ms),
        settle_timeout: Duration::from_secs(args.timeout_secs),
        keeper: keeper_config(&args)?,
    };
    tracing::info!(
        sales = params.sales,
        installments = params.total_installments,
        amount = %params.installment_amount,
        poll_ms = params.keeper.poll_interval_ms,
        "Starting demo"
    );

    let summary = demo::run_demo(params).await?;
    tracing::info!(
        settled = summary.keeper.settled,
        rounds = summary.keeper.rounds,
        supply = %summary.token_supply,
        "Demo complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

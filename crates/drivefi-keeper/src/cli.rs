//! Command-line interface for `drivefi-keeper`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use drivefi_keeper::logging::LogFormat;
use rust_decimal::Decimal;

/// DriveFi settlement keeper.
///
/// Polls installment escrow agreements and settles each one as soon as the
/// last installment is paid.
#[derive(Parser, Debug)]
#[command(
    name = "drivefi-keeper",
    about = "DriveFi installment escrow keeper",
    version,
    propagate_version = true
)]
pub struct KeeperCli {
    /// Log output format.
    #[arg(long, global = true, env = "DRIVEFI_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        global = true,
        env = "DRIVEFI_LOG_LEVEL",
        default_value = "drivefi_keeper=info,drivefi_escrow=info,drivefi_ledger=warn"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open demo sales on in-memory ledgers, pay them off, and let the
    /// keeper settle them.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Keeper configuration file (JSON). Flags below override its values.
    #[arg(long, short = 'c', env = "DRIVEFI_KEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of independent sales to open.
    #[arg(long, default_value_t = 1)]
    pub sales: usize,

    /// Installments per sale.
    #[arg(long, default_value_t = 12)]
    pub installments: u32,

    /// Amount of each installment, in stablecoin units.
    #[arg(long, default_value = "10")]
    pub amount: Decimal,

    /// Milliseconds between installment rounds.
    #[arg(long, default_value_t = 50)]
    pub payment_delay_ms: u64,

    /// Keeper poll interval in milliseconds.
    #[arg(long, env = "DRIVEFI_KEEPER_POLL_MS")]
    pub poll_ms: Option<u64>,

    /// Seconds to wait for every sale to settle.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        KeeperCli::command().debug_assert();
    }

    #[test]
    fn demo_defaults() {
        let cli = KeeperCli::parse_from(["drivefi-keeper", "demo"]);
        let Commands::Demo(args) = cli.command else {
            panic!("expected demo subcommand");
        };
        assert_eq!(args.sales, 1);
        assert_eq!(args.installments, 12);
        assert_eq!(args.amount, Decimal::new(10, 0));
        assert!(args.poll_ms.is_none());
    }

    #[test]
    fn demo_overrides() {
        let cli = KeeperCli::parse_from([
            "drivefi-keeper",
            "--log-format",
            "json",
            "demo",
            "--sales",
            "4",
            "--amount",
            "12.5",
            "--poll-ms",
            "20",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Demo(args) = cli.command else {
            panic!("expected demo subcommand");
        };
        assert_eq!(args.sales, 4);
        assert_eq!(args.amount, Decimal::new(125, 1));
        assert_eq!(args.poll_ms, Some(20));
    }
}

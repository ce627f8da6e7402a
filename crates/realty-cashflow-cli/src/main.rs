mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::analyze::AnalyzeArgs;
use commands::loan::{AmortizationArgs, EmiArgs};
use commands::returns::IrrArgs;
use commands::schedule::ScheduleArgs;

/// Leveraged real-estate cash-flow and return analysis
#[derive(Parser)]
#[command(
    name = "rea",
    version,
    about = "Leveraged real-estate cash-flow and return analysis",
    long_about = "A CLI for projecting the cash flows of a leveraged property purchase \
                  with decimal precision. Supports loan EMIs and amortisation ledgers, \
                  construction-linked disbursement schedules, IRR/XIRR and full \
                  investment scenarios."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log engine diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fixed monthly installment for a loan
    Emi(EmiArgs),
    /// Month-by-month or annual amortisation ledger
    Amortization(AmortizationArgs),
    /// Construction-linked disbursement schedule
    Schedule(ScheduleArgs),
    /// IRR of periodic cash flows, or XIRR when dates are given
    Irr(IrrArgs),
    /// Full investment analysis of a scenario
    Analyze(AnalyzeArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Emi(args) => commands::loan::run_emi(args),
        Commands::Amortization(args) => commands::loan::run_amortization(args),
        Commands::Schedule(args) => commands::schedule::run_schedule(args),
        Commands::Irr(args) => commands::returns::run_irr(args),
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Version => {
            println!("rea {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            info!(format = ?cli.output, "computation finished");
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

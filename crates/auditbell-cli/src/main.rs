use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "auditbell", version, about = "Audit reminder scheduler")]
struct Cli {
    /// Log filter directive (trace, debug, info, warn, error, or per-target)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit period management
    Audit {
        #[command(subcommand)]
        action: commands::audit::AuditAction,
    },
    /// Run one scheduler pass
    Run {
        /// Evaluate as of this instant (RFC 3339 or YYYY-MM-DD) instead of now
        #[arg(long)]
        now: Option<String>,
        /// Append reminders to this file instead of writing them to stdout
        #[arg(long)]
        outbox: Option<PathBuf>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduler on an interval until interrupted
    Watch {
        /// Seconds between passes (default: scheduler.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Append reminders to this file instead of writing them to stdout
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
    /// Show which tiers are due for a deadline
    Preview {
        /// Audit deadline (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        ends_at: String,
        /// Evaluate as of this instant instead of now
        #[arg(long)]
        now: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Audit { action } => commands::audit::run(action),
        Commands::Run { now, outbox, json } => commands::run::run(now, outbox, json),
        Commands::Watch { interval, outbox } => commands::run::watch(interval, outbox),
        Commands::Preview { ends_at, now, json } => commands::preview::run(&ends_at, now, json),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

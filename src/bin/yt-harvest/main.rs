mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "yt-harvest",
    version,
    about = "Resumable, quota-aware harvesting of YouTube channel videos"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest partitions from their checkpoints
    Run {
        /// Partition keys, processed in order (e.g. poland united-states)
        #[arg(short, long = "partition", required = true, num_args = 1..)]
        partitions: Vec<String>,

        /// Override the configured retrieval strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Videos per channel for the overridden strategy
        #[arg(long)]
        max_results: Option<u32>,

        /// Start of the time range (RFC 3339, by-time-range only)
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// End of the time range (RFC 3339, by-time-range only)
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show checkpoint progress
    Status {
        /// Partition keys
        #[arg(short, long = "partition", required = true, num_args = 1..)]
        partitions: Vec<String>,
    },
    /// Clear a partition's checkpoint so the next run starts over
    Reset {
        /// Partition key
        #[arg(short, long)]
        partition: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Most viewed videos
    TopByViews,
    /// Newest uploads
    ByRecency,
    /// Videos published in [--start, --end)
    ByTimeRange,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            partitions,
            strategy,
            max_results,
            start,
            end,
            batch_size,
        } => {
            let overrides = commands::run::Overrides {
                strategy,
                max_results,
                start,
                end,
                batch_size,
            };
            commands::run::execute(config, &partitions, overrides).await
        }
        Commands::Status { partitions } => commands::status::execute(&config, &partitions).await,
        Commands::Reset { partition } => commands::reset::execute(&config, &partition).await,
    }
}

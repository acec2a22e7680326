use std::process::ExitCode;

use anyhow::{Context, Result};
use yt_harvest::partition::validate_partition_key;
use yt_harvest::{BatchRunner, Config};

/// Execute the `reset` command: drop a partition's checkpoint.
pub async fn execute(config: &Config, partition: &str) -> Result<ExitCode> {
    validate_partition_key(partition)?;

    let runner = BatchRunner::from_config(config)
        .await
        .context("Failed to initialize harvester")?;
    runner
        .reset(partition)
        .await
        .with_context(|| format!("Failed to reset partition '{partition}'"))?;

    println!("Checkpoint for '{partition}' cleared; the next run starts at item 1.");
    Ok(ExitCode::SUCCESS)
}

use std::process::ExitCode;

use anyhow::{Context, Result};
use yt_harvest::{BatchRunner, Config};

/// Execute the `status` command: print checkpoint progress per partition.
pub async fn execute(config: &Config, partitions: &[String]) -> Result<ExitCode> {
    let runner = BatchRunner::from_config(config)
        .await
        .context("Failed to initialize harvester")?;

    for partition in partitions {
        let status = runner
            .status(partition)
            .await
            .with_context(|| format!("Failed to read partition '{partition}'"))?;

        println!("Partition '{partition}':");
        println!(
            "  Checkpoint:        {} / {}",
            status.checkpoint.last_processed_offset, status.total_items
        );
        println!("  Remaining items:   {}", status.remaining_items);
        println!("  Remaining batches: {}", status.remaining_batches);
        if let Some(updated_at) = status.checkpoint.updated_at {
            println!("  Last saved:        {}", updated_at.to_rfc3339());
        }
    }

    Ok(ExitCode::SUCCESS)
}

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use yt_harvest::{BatchRunner, Config, RetrievalStrategy, RunReport, RunState, run_with_shutdown};

use crate::StrategyArg;

/// Command-line overrides applied on top of the configuration file.
pub struct Overrides {
    pub strategy: Option<StrategyArg>,
    pub max_results: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub batch_size: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(batch_size) = self.batch_size {
            config.harvest.batch_size = batch_size;
        }

        let max_results = self
            .max_results
            .unwrap_or_else(|| config.harvest.strategy.max_results());

        match self.strategy {
            Some(StrategyArg::TopByViews) => {
                config.harvest.strategy = RetrievalStrategy::TopByViews { max_results };
            }
            Some(StrategyArg::ByRecency) => {
                config.harvest.strategy = RetrievalStrategy::ByRecency { max_results };
            }
            Some(StrategyArg::ByTimeRange) => {
                let (Some(start), Some(end)) = (self.start, self.end) else {
                    bail!("--strategy by-time-range needs both --start and --end");
                };
                config.harvest.strategy = RetrievalStrategy::ByTimeRange {
                    start,
                    end,
                    max_results,
                };
            }
            None if self.max_results.is_some() => {
                config.harvest.strategy = match config.harvest.strategy.clone() {
                    RetrievalStrategy::TopByViews { .. } => {
                        RetrievalStrategy::TopByViews { max_results }
                    }
                    RetrievalStrategy::ByRecency { .. } => {
                        RetrievalStrategy::ByRecency { max_results }
                    }
                    RetrievalStrategy::ByTimeRange { start, end, .. } => {
                        RetrievalStrategy::ByTimeRange {
                            start,
                            end,
                            max_results,
                        }
                    }
                };
            }
            None => {}
        }

        config.validate()?;
        Ok(())
    }
}

/// Execute the `run` command: harvest each partition in order and print its report.
pub async fn execute(
    mut config: Config,
    partitions: &[String],
    overrides: Overrides,
) -> Result<ExitCode> {
    overrides.apply(&mut config)?;

    let runner = BatchRunner::from_config(&config)
        .await
        .context("Failed to initialize harvester")?;

    tracing::info!(
        partitions = partitions.len(),
        strategy = config.harvest.strategy.name(),
        batch_size = config.harvest.batch_size,
        "Harvest starting"
    );

    let reports = run_with_shutdown(&runner, partitions).await;
    for report in &reports {
        print_report(report);
    }

    if reports.len() < partitions.len() {
        println!(
            "Interrupted: {} of {} partitions finished.",
            reports.len(),
            partitions.len()
        );
    }

    let failed = reports.iter().any(|r| r.state == RunState::Failed);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &RunReport) {
    println!("Partition '{}': {}", report.partition, report.state);
    println!("  Batches written: {}", report.batches_written);
    println!("  Items attempted: {}", report.items_attempted);
    println!("  Items failed:    {}", report.items_failed);
    println!(
        "  Checkpoint:      {} / {}",
        report.checkpoint_offset, report.total_items
    );
    if report.state != RunState::Completed {
        println!("  Remaining items: {}", report.remaining_items);
    }
    if let Some(reason) = &report.reason {
        println!("  Reason:          {reason}");
    }
}

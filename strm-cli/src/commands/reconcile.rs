//! `strm-mirror reconcile`: one full pass, then exit.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use strm_sync::{pipeline, ReconcileReport};

use super::{load_config, scope};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Only reconcile the mapping at this index (0-based, configuration order).
    #[arg(long)]
    pub mapping: Option<usize>,

    /// Print the pass reports as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        if !self.json {
            strm_daemon::init_tracing(None).context("failed to initialise logging")?;
        }

        let reports = pipeline::run(config, scope(self.mapping), &CancellationToken::new())
            .context("full pass failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&reports).context("failed to serialize reports")?
            );
        } else {
            for report in &reports {
                print_report(report);
            }
        }

        let aborted: usize = reports.iter().map(|r| r.aborted_roots.len()).sum();
        if aborted > 0 {
            bail!("{aborted} source root(s) aborted during the pass");
        }
        Ok(())
    }
}

fn print_report(report: &ReconcileReport) {
    let mark = if !report.aborted_roots.is_empty() {
        "✗".red().bold()
    } else if report.mutations() == 0 {
        "✓".green().bold()
    } else {
        "✎".yellow().bold()
    };
    println!(
        "{mark} mapping[{}]: {} pointers, {} metadata, {} copied back, {} removed ({} dirs), {} unchanged in {} ms",
        report.mapping,
        report.pointers_written,
        report.metadata_copied,
        report.reverse_copied,
        report.files_removed,
        report.dirs_removed,
        report.unchanged,
        report.duration_ms,
    );
    if report.skipped > 0 {
        println!("  {} {} file(s) skipped after errors", "!".yellow(), report.skipped);
    }
    for root in &report.missing_roots {
        println!("  {} missing root {}", "!".yellow(), root.display());
    }
    for root in &report.aborted_roots {
        println!("  {} aborted root {}", "✗".red(), root.display());
    }
}

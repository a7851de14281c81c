//! `strm-mirror diff`: read-only preview of a full pass.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use strm_sync::{pipeline, PassPlan};

use super::{load_config, scope};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only preview the mapping at this index.
    #[arg(long)]
    pub mapping: Option<usize>,

    /// Print the plans as JSON.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        let plans = pipeline::plan(config, scope(self.mapping)).context("failed to plan pass")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plans).context("failed to serialize plans")?
            );
            return Ok(());
        }
        for plan in &plans {
            print_plan(plan);
        }
        Ok(())
    }
}

fn print_plan(plan: &PassPlan) {
    if plan.generate.is_empty() && plan.reverse.is_empty() && plan.diff.is_empty() {
        println!("mapping[{}]: up to date", plan.mapping);
        return;
    }
    println!("mapping[{}]:", plan.mapping);
    for path in &plan.reverse {
        println!("  {} {}", "<".cyan(), path.display());
    }
    for path in &plan.generate {
        println!("  {} {}", "+".green(), path.display());
    }
    for path in &plan.diff.files {
        println!("  {} {}", "-".red(), path.display());
    }
    for path in &plan.diff.dirs {
        println!("  {} {}/", "-".red(), path.display());
    }
}

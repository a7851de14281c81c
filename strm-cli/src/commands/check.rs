//! `strm-mirror check`: validate configuration without running anything.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use strm_core::ExtensionSet;
use strm_daemon::CronSchedule;

use super::load_config;

#[derive(Args, Debug)]
pub struct CheckArgs {}

impl CheckArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        if config.cron.enable {
            CronSchedule::parse(&config.cron.expression).context("cron_full_process is invalid")?;
        }

        println!("{} {}", "✓".green().bold(), config_path.display());
        println!(
            "  real_time_monitor: {}  cron: {}",
            config.real_time_monitor,
            if config.cron.enable { config.cron.expression.as_str() } else { "off" },
        );
        for mapping in &config.mappings {
            println!("  {}", mapping.id.to_string().bold());
            for root in &mapping.source_roots {
                let state = if root.is_dir() { "ok".green() } else { "missing".yellow() };
                println!("    source  {} [{state}]", root.display());
            }
            println!("    dest    {}", mapping.dest_root.display());
            println!("    library {}", mapping.library_root.display());
            println!(
                "    video {}  metadata {}",
                extensions(&mapping.video_extensions),
                extensions(&mapping.metadata_extensions)
            );
            if !mapping.create_pointers && !mapping.copy_metadata {
                println!("    {} create_strm and copy_metadata are both off", "!".yellow());
            }
        }
        Ok(())
    }
}

fn extensions(set: &ExtensionSet) -> String {
    if set.is_empty() {
        return "-".to_string();
    }
    set.iter().collect::<Vec<_>>().join(" ")
}

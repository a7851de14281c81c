//! `strm-mirror run`: foreground daemon.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        strm_daemon::start_blocking(config_path).context("daemon exited with error")
    }
}

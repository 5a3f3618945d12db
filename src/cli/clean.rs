//! `quire clean`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use crate::utils::BuildLock;
use crate::utils::fs::remove_dir_all;

#[derive(Args, Debug)]
pub struct CleanCommand {}

impl CleanCommand {
    pub async fn execute(self, project_dir: &Path) -> Result<()> {
        let config = super::load_config(project_dir, None)?;
        let build_dir = config.build_dir();
        if !build_dir.exists() {
            println!("{}", "Nothing to clean".dimmed());
            return Ok(());
        }

        // Fails with BuildLocked while a build is running.
        let _lock = BuildLock::acquire(&build_dir).await?;
        remove_dir_all(&build_dir)?;
        info!("Removed {}", config.display_path(&build_dir));
        println!("{} Removed {}", "✓".green(), config.display_path(&build_dir));
        Ok(())
    }
}

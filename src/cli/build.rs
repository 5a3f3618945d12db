//! `quire build`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tracing::debug;

use crate::graph::{BuildReport, Outcome};
use crate::pipeline::{Pipeline, parse_target};
use crate::utils::BuildLock;

#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Stage name or file path to build.
    pub target: Option<String>,
}

impl BuildCommand {
    pub async fn execute(self, project_dir: &Path, jobs: Option<usize>) -> Result<()> {
        let config = super::load_config(project_dir, jobs)?;
        let _lock = BuildLock::acquire(&config.build_dir()).await?;

        let pipeline = Pipeline::from_config(config.clone())?;
        let target = match self.target.as_deref() {
            Some(name) => parse_target(&config, name),
            None => pipeline.default_target(),
        };
        debug!(%target, sources = pipeline.registry().len(), "Starting build");

        let report = pipeline.build(std::slice::from_ref(&target)).await?;
        print_summary(&target, &report);
        Ok(())
    }
}

fn print_summary(target: &impl std::fmt::Display, report: &BuildReport) {
    let built = report.count(Outcome::Built);
    let fresh = report.count(Outcome::UpToDate);
    if built == 0 {
        println!("{} {} is up to date", "✓".green(), target.to_string().bold());
    } else {
        println!(
            "{} Built {} ({} {}, {} up to date)",
            "✓".green(),
            target.to_string().bold(),
            built,
            if built == 1 { "action" } else { "actions" },
            fresh
        );
    }
}

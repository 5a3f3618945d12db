//! `quire sources`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use crate::source::SourceRegistry;

#[derive(Args, Debug)]
pub struct SourcesCommand {
    /// Also show the signature each source becomes.
    #[arg(long)]
    pub signatures: bool,

    /// Print a JSON array instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl SourcesCommand {
    pub fn execute(self, project_dir: &Path) -> Result<()> {
        let config = super::load_config(project_dir, None)?;
        let registry = SourceRegistry::discover(config.clone())?;
        if self.json {
            let entries: Vec<_> = registry
                .files()
                .iter()
                .map(|file| {
                    json!({
                        "path": config.display_path(&file.path),
                        "format": file.format.as_str(),
                        "export": config.display_path(&registry.export_path(file)),
                        "signature": config.display_path(&registry.signature_path(file)),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        if registry.is_empty() {
            println!("{}", "No sources found".yellow());
            return Ok(());
        }

        for file in registry.files() {
            let format = format!("[{}]", file.format);
            if self.signatures {
                println!(
                    "{:<40} {} {}",
                    file.relative.display().to_string(),
                    format.dimmed(),
                    config.display_path(&registry.signature_path(file)).cyan()
                );
            } else {
                println!("{:<40} {}", file.relative.display().to_string(), format.dimmed());
            }
        }
        Ok(())
    }
}

//! `quire templates`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

use crate::templating::TemplateResolver;

#[derive(Args, Debug)]
pub struct TemplatesCommand {
    /// Include partials (names starting with `_`).
    #[arg(long)]
    pub partials: bool,
}

impl TemplatesCommand {
    pub fn execute(self, project_dir: &Path) -> Result<()> {
        let config = super::load_config(project_dir, None)?;
        let resolver = TemplateResolver::new(config.clone());
        for entry in resolver.list_templates()? {
            if entry.is_partial() && !self.partials {
                continue;
            }
            let origin = if entry.user {
                format!("{:<7}", "user").green()
            } else {
                format!("{:<7}", "system").dimmed()
            };
            println!("{:<36} {} {}", entry.logical.display().to_string(), origin, entry.path.display());
        }
        Ok(())
    }
}

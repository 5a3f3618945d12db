//! Command-line interface for quire.
//!
//! The CLI is a thin layer over the library: each subcommand loads the
//! project configuration, calls into [`crate::pipeline`] or
//! [`crate::templating`], and prints a short coloured summary.
//!
//! # Available Commands
//!
//! - `build [TARGET]` - Build a stage (`export`, `signatures`, `spine`,
//!   `codex`, `skeleton`, `highlight`, `master`, `fascicles`, `site`,
//!   `deliverables`) or a single file under the build directory
//! - `sources` - List the discovered source files with their formats
//! - `templates` - List templates by logical path and where they resolve
//! - `clean` - Remove the build directory
//!
//! # Examples
//!
//! ```bash
//! quire build              # fascicles, or deliverables when configured
//! quire build site         # render the static site
//! quire -v build master    # with debug logging
//! quire --jobs 1 build     # one action at a time
//! quire --project-dir ~/books/confident-ruby sources
//! ```
//!
//! # Logging
//!
//! Logs go to stderr through `tracing-subscriber`. The default level is
//! `info`; `--verbose` selects `debug` and `--quiet` selects `error`. A set
//! `RUST_LOG` always wins.

mod build;
mod clean;
mod sources;
mod templates;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::BuildConfig;

/// Build books from a tree of lightweight-markup sources.
#[derive(Parser, Debug)]
#[command(name = "quire", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project root (defaults to the current directory).
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Maximum number of build actions running at once.
    ///
    /// Overrides `jobs` in quire.toml.
    #[arg(short, long, global = true, value_name = "N")]
    jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a target (default: fascicles, or deliverables when configured).
    Build(build::BuildCommand),

    /// List the source files that make up the book.
    Sources(sources::SourcesCommand),

    /// List the available templates.
    Templates(templates::TemplatesCommand),

    /// Remove the build directory.
    Clean(clean::CleanCommand),
}

impl Cli {
    /// Install logging and run the selected command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.log_filter());

        let project_dir = self.project_dir()?;
        match self.command {
            Commands::Build(cmd) => cmd.execute(&project_dir, self.jobs).await,
            Commands::Sources(cmd) => cmd.execute(&project_dir),
            Commands::Templates(cmd) => cmd.execute(&project_dir),
            Commands::Clean(cmd) => cmd.execute(&project_dir).await,
        }
    }

    /// Filter directive implied by `--verbose`/`--quiet`.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    fn project_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
        Ok(match &self.project_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }
}

fn init_logging(default_filter: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("quire={default_filter},{}", fallback_level(default_filter)))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// Dependencies stay at warn unless the user asks for less.
fn fallback_level(default_filter: &str) -> &'static str {
    if default_filter == "error" { "error" } else { "warn" }
}

/// Load the project's configuration, applying a `--jobs` override.
pub(crate) fn load_config(project_dir: &Path, jobs: Option<usize>) -> Result<Arc<BuildConfig>> {
    let mut config = BuildConfig::load(project_dir)?;
    if let Some(jobs) = jobs {
        config.jobs = Some(jobs.max(1));
    }
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_with_target() {
        let cli = Cli::try_parse_from(["quire", "--jobs", "2", "build", "master"]).unwrap();
        assert_eq!(cli.jobs, Some(2));
        match cli.command {
            Commands::Build(cmd) => assert_eq!(cmd.target.as_deref(), Some("master")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["quire", "sources", "-v", "-C", "book"]).unwrap();
        assert_eq!(cli.log_filter(), "debug");
        assert_eq!(cli.project_dir.as_deref(), Some(Path::new("book")));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["quire", "-v", "-q", "build"]).is_err());
    }

    #[test]
    fn test_quiet_filter() {
        let cli = Cli::try_parse_from(["quire", "--quiet", "clean"]).unwrap();
        assert_eq!(cli.log_filter(), "error");
    }

    #[test]
    fn test_jobs_override() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = load_config(temp.path(), Some(0)).unwrap();
        assert_eq!(config.jobs(), 1);
        let config = load_config(temp.path(), Some(3)).unwrap();
        assert_eq!(config.jobs(), 3);
    }
}

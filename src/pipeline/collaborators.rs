//! Interfaces to the external collaborators and their default
//! implementations.
//!
//! The pipeline never shells out directly. Converters, the highlighter, the
//! asset linker and the XInclude processor are trait objects held by
//! [`Collaborators`], so tests and embedders can substitute their own.
//! All methods are blocking; the pipeline calls them from
//! `tokio::task::spawn_blocking`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::xinclude::XIncludeResolver;
use crate::config::BuildConfig;
use crate::core::SourceFormat;
use crate::utils::ToolCommand;
use crate::utils::fs::{copy_file, ensure_parent_dir};

/// Converts one source file into an HTML export.
pub trait Exporter: Send + Sync {
    fn export(&self, source: &Path, export: &Path, format: &SourceFormat) -> Result<()>;
}

/// Renders a code listing into highlighted HTML.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, listing: &Path, highlight: &Path) -> Result<()>;
}

/// Places an asset at its destination in the master asset tree.
pub trait AssetLinker: Send + Sync {
    fn materialize(&self, source: &Path, dest: &Path) -> Result<()>;
}

/// Resolves every XInclude in `input` and writes the flattened document.
pub trait XIncludeProcessor: Send + Sync {
    fn flatten(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Exporter running a configured command line.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    template: Vec<String>,
    language: String,
    working_dir: PathBuf,
}

impl CommandExporter {
    pub fn new(template: Vec<String>, language: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            template,
            language: language.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl Exporter for CommandExporter {
    fn export(&self, source: &Path, export: &Path, format: &SourceFormat) -> Result<()> {
        ensure_parent_dir(export)?;
        ToolCommand::from_template(
            &self.template,
            &[
                ("input", source.display().to_string()),
                ("output", export.display().to_string()),
                ("language", self.language.clone()),
            ],
        )?
        .current_dir(&self.working_dir)
        .with_context(format!("export {format}"))
        .run()
        .with_context(|| format!("Failed to export {}", source.display()))?;
        Ok(())
    }
}

/// Highlighter running a configured command line.
#[derive(Debug, Clone)]
pub struct CommandHighlighter {
    template: Vec<String>,
}

impl CommandHighlighter {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

impl Highlighter for CommandHighlighter {
    fn highlight(&self, listing: &Path, highlight: &Path) -> Result<()> {
        ensure_parent_dir(highlight)?;
        ToolCommand::from_template(
            &self.template,
            &[("input", listing.display().to_string()), ("output", highlight.display().to_string())],
        )?
        .with_context("highlight")
        .run()
        .with_context(|| format!("Failed to highlight {}", listing.display()))?;
        Ok(())
    }
}

/// Symlinks assets where the platform allows it and copies otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkingAssetLinker;

impl AssetLinker for LinkingAssetLinker {
    fn materialize(&self, source: &Path, dest: &Path) -> Result<()> {
        ensure_parent_dir(dest)?;
        if dest.symlink_metadata().is_ok() {
            std::fs::remove_file(dest)
                .with_context(|| format!("Failed to replace existing asset: {}", dest.display()))?;
        }

        #[cfg(unix)]
        {
            let absolute = std::fs::canonicalize(source)
                .with_context(|| format!("Failed to resolve asset: {}", source.display()))?;
            match std::os::unix::fs::symlink(&absolute, dest) {
                Ok(()) => {
                    debug!("Linked {} -> {}", dest.display(), absolute.display());
                    return Ok(());
                }
                Err(e) => debug!("Symlink failed ({}), copying {}", e, source.display()),
            }
        }

        copy_file(source, dest)
    }
}

/// The set of collaborators one pipeline uses.
#[derive(Clone)]
pub struct Collaborators {
    pub highlighter: Arc<dyn Highlighter>,
    pub asset_linker: Arc<dyn AssetLinker>,
    pub xinclude: Arc<dyn XIncludeProcessor>,
}

impl Collaborators {
    /// Command-line highlighter from the configuration, symlinking asset
    /// linker and the in-process XInclude processor.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            highlighter: Arc::new(CommandHighlighter::new(config.tools.highlight.clone())),
            asset_linker: Arc::new(LinkingAssetLinker),
            xinclude: Arc::new(XIncludeResolver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::QuireError;
    use tempfile::TempDir;

    #[test]
    fn test_linker_materializes_and_replaces() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("images/cover.png");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"png").unwrap();
        let dest = temp.path().join("build/master/images/cover.png");

        LinkingAssetLinker.materialize(&source, &dest).unwrap();
        LinkingAssetLinker.materialize(&source, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"png");
    }

    #[test]
    fn test_command_exporter_reports_tool_failure() {
        let temp = TempDir::new().unwrap();
        let exporter = CommandExporter::new(
            vec!["quire-test-no-such-converter".to_string(), "{input}".to_string()],
            "en",
            temp.path(),
        );
        let err = exporter
            .export(&temp.path().join("ch1.md"), &temp.path().join("out/ch1.html"), &SourceFormat::markdown())
            .unwrap_err();
        match err.downcast_ref::<QuireError>() {
            Some(QuireError::ExternalToolFailure { tool, .. }) => assert_eq!(tool, "quire-test-no-such-converter"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

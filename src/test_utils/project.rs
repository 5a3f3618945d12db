//! Temporary book projects.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use super::stubs::{StubExporter, StubHighlighter};
use crate::config::BuildConfig;
use crate::core::SourceFormat;
use crate::pipeline::{Collaborators, FormatHandlers, LinkingAssetLinker, Pipeline, XIncludeResolver};
use crate::source::SourceRegistry;
use crate::templating::TemplateResolver;

/// A book project in a temporary directory.
///
/// The directory is removed when the fixture is dropped.
pub struct ProjectFixture {
    dir: TempDir,
}

/// A pipeline wired to stub collaborators, with handles on the stubs.
pub struct StubBuild {
    pub pipeline: Pipeline,
    pub exporter: Arc<StubExporter>,
    pub highlighter: Arc<StubHighlighter>,
}

impl ProjectFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("Failed to create temp project")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a project file, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }

    /// Set the modification time of every project file `secs` seconds into
    /// the past, so a file written afterwards is strictly newer than
    /// everything built so far.
    pub fn backdate(&self, secs: u64) -> Result<()> {
        let when = SystemTime::now() - Duration::from_secs(secs);
        for entry in walkdir::WalkDir::new(self.root()) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let file = std::fs::OpenOptions::new().write(true).open(entry.path())?;
                file.set_modified(when)?;
            }
        }
        Ok(())
    }

    /// Configuration loaded from the project, with system templates disabled
    /// so only the project's own templates resolve.
    pub fn config(&self) -> Result<Arc<BuildConfig>> {
        let mut config = BuildConfig::load(self.root())?;
        config.system_template_dir = PathBuf::from("no-system-templates");
        Ok(Arc::new(config))
    }

    /// Pipeline over the project's sources with a stub Markdown exporter
    /// and highlighter.
    pub fn stub_pipeline(&self) -> Result<StubBuild> {
        self.stub_pipeline_with(self.config()?)
    }

    pub fn stub_pipeline_with(&self, config: Arc<BuildConfig>) -> Result<StubBuild> {
        let exporter = Arc::new(StubExporter::new());
        let highlighter = Arc::new(StubHighlighter::new());

        let registry = SourceRegistry::discover(config.clone())?;
        let mut handlers = FormatHandlers::from_config(&config);
        handlers.register_exporter(SourceFormat::markdown(), exporter.clone());
        let collaborators = Collaborators {
            highlighter: highlighter.clone(),
            asset_linker: Arc::new(LinkingAssetLinker),
            xinclude: Arc::new(XIncludeResolver),
        };
        let templates = TemplateResolver::new(config.clone());
        let pipeline = Pipeline::new(config, registry, handlers, collaborators).with_templates(Some(Arc::new(templates)));

        Ok(StubBuild {
            pipeline,
            exporter,
            highlighter,
        })
    }
}

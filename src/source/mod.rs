//! Source file discovery.
//!
//! The [`SourceRegistry`] walks the project tree once, keeps the files that
//! match an include glob and no exclude glob, infers each file's
//! [`SourceFormat`] from its extension, and orders them by relative path.
//! That order is the reading order of the book: it decides signature
//! numbering and fascicle numbering downstream, so it must not depend on
//! directory iteration order.
//!
//! # Pattern Syntax
//!
//! Include and exclude patterns are standard globs matched against the path
//! relative to the project root, with `/` as separator:
//!
//! - `*` matches within a single path component
//! - `**` matches any number of components, including none
//! - `?`, `[abc]` and `[a-z]` match single characters

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::core::{QuireError, SourceFormat};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the project root.
    pub relative: PathBuf,
    pub format: SourceFormat,
}

impl SourceFile {
    /// Logical name: the file name without its extension.
    pub fn name(&self) -> String {
        self.relative.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

/// Ordered, immutable set of source files.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    config: Arc<BuildConfig>,
    files: Vec<SourceFile>,
    by_export: HashMap<PathBuf, usize>,
    by_signature: HashMap<PathBuf, usize>,
}

/// Format for `path` according to the configured extension table.
pub fn format_of(config: &BuildConfig, path: &Path) -> Result<SourceFormat, QuireError> {
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
    config.formats.get(&extension).cloned().ok_or_else(|| QuireError::UnregisteredExtension {
        path: path.display().to_string(),
        extension,
    })
}

impl SourceRegistry {
    /// Walk the project root and collect matching source files.
    pub fn discover(config: Arc<BuildConfig>) -> Result<Self> {
        let root = config.project_root.clone();
        let includes = compile(&config.sources)?;
        let excludes = compile(&config.exclude)?;
        let build_dir = config.build_dir();

        debug!("Discovering sources in {}", root.display());
        let mut files = Vec::new();
        let walker = WalkDir::new(&root).follow_links(false).into_iter().filter_entry(|entry| {
            let hidden = entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.');
            !hidden && entry.path() != build_dir
        });

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative_str = to_slash(relative);
            trace!("Checking path: {}", relative_str);

            let included = includes.iter().any(|p| p.matches_with(&relative_str, MATCH_OPTIONS));
            let excluded = excludes.iter().any(|p| p.matches_with(&relative_str, MATCH_OPTIONS));
            if !included || excluded {
                continue;
            }

            let format = format_of(&config, relative)?;
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                relative: relative.to_path_buf(),
                format,
            });
        }

        files.sort_by(|a, b| to_slash(&a.relative).cmp(&to_slash(&b.relative)));
        debug!("Found {} source files", files.len());
        Ok(Self::from_files(config, files))
    }

    /// Build a registry from an explicit, already ordered file list.
    pub fn from_files(config: Arc<BuildConfig>, files: Vec<SourceFile>) -> Self {
        let mut registry = Self {
            config,
            files,
            by_export: HashMap::new(),
            by_signature: HashMap::new(),
        };
        for (index, file) in registry.files.iter().enumerate() {
            registry.by_export.insert(registry.export_path(file), index);
            registry.by_signature.insert(registry.signature_path(file), index);
        }
        registry
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn config(&self) -> &Arc<BuildConfig> {
        &self.config
    }

    /// `<build>/exports/<relative path with .html extension>`
    pub fn export_path(&self, source: &SourceFile) -> PathBuf {
        self.config.exports_dir().join(source.relative.with_extension("html"))
    }

    /// `<build>/signatures/<relative path with .xhtml extension>`
    pub fn signature_path(&self, source: &SourceFile) -> PathBuf {
        self.config.signatures_dir().join(source.relative.with_extension("xhtml"))
    }

    pub fn export_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.export_path(f)).collect()
    }

    pub fn signature_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.signature_path(f)).collect()
    }

    pub fn source_for_export(&self, export: &Path) -> Option<&SourceFile> {
        self.by_export.get(export).map(|&i| &self.files[i])
    }

    pub fn source_for_signature(&self, signature: &Path) -> Option<&SourceFile> {
        self.by_signature.get(signature).map(|&i| &self.files[i])
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("Invalid glob pattern: {p}")))
        .collect()
}

fn to_slash(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[&str]) -> (TempDir, Arc<BuildConfig>) {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "# Title\n").unwrap();
        }
        let config = Arc::new(BuildConfig::for_project(temp.path()).unwrap());
        (temp, config)
    }

    #[test]
    fn test_discover_sorted_by_relative_path() {
        let (_temp, config) = project(&["b.md", "a.org", "part2/c.markdown", "part1/z.md", "notes.txt"]);
        let registry = SourceRegistry::discover(config).unwrap();
        let names: Vec<String> = registry.files().iter().map(|f| to_slash(&f.relative)).collect();
        assert_eq!(names, vec!["a.org", "b.md", "part1/z.md", "part2/c.markdown"]);
        assert_eq!(registry.files()[0].format, SourceFormat::orgmode());
    }

    #[test]
    fn test_build_dir_and_hidden_dirs_skipped() {
        let (_temp, config) = project(&["ch1.md", "build/exports/ch1.md", ".git/x.md"]);
        let registry = SourceRegistry::discover(config).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_exclude_patterns() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("ch1.md"), "").unwrap();
        std::fs::write(temp.path().join("README.md"), "").unwrap();
        let mut config = BuildConfig::for_project(temp.path()).unwrap();
        config.exclude.push("README.md".to_string());
        let registry = SourceRegistry::discover(Arc::new(config)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.files()[0].name(), "ch1");
    }

    #[test]
    fn test_format_inference_rejects_unregistered_extension() {
        let (_temp, config) = project(&[]);
        assert_eq!(format_of(&config, Path::new("a.markdown")).unwrap(), SourceFormat::markdown());
        let err = format_of(&config, Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, QuireError::UnregisteredExtension { ref extension, .. } if extension == "txt"));
    }

    #[test]
    fn test_included_file_with_unregistered_extension_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();
        let mut config = BuildConfig::for_project(temp.path()).unwrap();
        config.sources.push("*.txt".to_string());
        let err = SourceRegistry::discover(Arc::new(config)).unwrap_err();
        assert!(matches!(err.downcast_ref::<QuireError>(), Some(QuireError::UnregisteredExtension { .. })));
    }

    #[test]
    fn test_export_and_signature_paths_preserve_structure() {
        let (_temp, config) = project(&["part1/intro.md", "part1/ruby.org"]);
        let registry = SourceRegistry::discover(config.clone()).unwrap();
        let exports = registry.export_paths();
        assert_eq!(exports[0], config.exports_dir().join("part1/intro.html"));
        assert_eq!(exports[1], config.exports_dir().join("part1/ruby.html"));
        let signature = registry.signature_path(&registry.files()[1]);
        assert_eq!(signature, config.signatures_dir().join("part1/ruby.xhtml"));
        assert_eq!(registry.source_for_export(&exports[0]).unwrap().name(), "intro");
        assert_eq!(registry.source_for_signature(&signature).unwrap().format, SourceFormat::orgmode());
    }
}

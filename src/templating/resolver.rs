//! Template lookup across the user and system roots, and expansion of a
//! template through its metamorphosis chain.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::Context as TeraContext;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::engine::TemplateEngines;
use crate::config::BuildConfig;
use crate::core::QuireError;
use crate::utils::fs::{copy_file, ensure_parent_dir, read_text_file, write_text_file};

/// Name of the layout template searched for next to HTML outputs.
pub const LAYOUT_NAME: &str = "_layout.html";

/// A template known by its logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Path relative to its root with engine extensions removed, e.g. `site/index.html`.
    pub logical: PathBuf,
    /// The concrete file.
    pub path: PathBuf,
    /// Whether it came from the user root.
    pub user: bool,
}

impl TemplateEntry {
    /// Partials (`_name`) are only rendered as part of other templates.
    pub fn is_partial(&self) -> bool {
        is_partial(&self.logical)
    }
}

pub(crate) fn is_partial(logical: &Path) -> bool {
    logical.file_name().is_some_and(|n| n.to_string_lossy().starts_with('_'))
}

/// Resolves logical template paths and expands templates.
#[derive(Clone)]
pub struct TemplateResolver {
    config: Arc<BuildConfig>,
    engines: TemplateEngines,
    roots: Vec<PathBuf>,
}

impl TemplateResolver {
    /// Resolver over the configured user and system roots with the
    /// built-in engines.
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self::with_engines(config, TemplateEngines::with_defaults())
    }

    pub fn with_engines(config: Arc<BuildConfig>, engines: TemplateEngines) -> Self {
        let roots = vec![config.user_template_dir(), config.system_template_dir()];
        Self {
            config,
            engines,
            roots,
        }
    }

    pub fn config(&self) -> &Arc<BuildConfig> {
        &self.config
    }

    pub fn engines(&self) -> &TemplateEngines {
        &self.engines
    }

    /// Search roots, user root first.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Concrete file for `logical`.
    ///
    /// Each root is searched for the exact path, then for any file named
    /// `<basename>.<more extensions>`; the first root with a match wins.
    pub fn find(&self, logical: impl AsRef<Path>) -> Result<PathBuf> {
        let logical = logical.as_ref();
        self.find_optional(logical)?.ok_or_else(|| {
            QuireError::UnresolvedTemplate {
                name: logical.display().to_string(),
                searched: self.roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>().join(", "),
            }
            .into()
        })
    }

    /// Like [`find`](Self::find), but a missing template is `None`.
    pub fn find_optional(&self, logical: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let logical = logical.as_ref();
        let Some(basename) = logical.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(None);
        };
        let prefix = format!("{basename}.");

        for root in &self.roots {
            let exact = root.join(logical);
            if exact.is_file() {
                trace!("Template {} -> {}", logical.display(), exact.display());
                return Ok(Some(exact));
            }
            let dir = exact.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            if !dir.is_dir() {
                continue;
            }
            let mut candidates: Vec<PathBuf> = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read template directory: {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file() && path.file_name().is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
                })
                .collect();
            candidates.sort();
            if let Some(found) = candidates.into_iter().next() {
                trace!("Template {} -> {}", logical.display(), found.display());
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Root-relative path of a concrete template with its engine
    /// extensions removed.
    pub fn logical_path(&self, concrete: &Path) -> PathBuf {
        let relative = self
            .roots
            .iter()
            .find_map(|root| concrete.strip_prefix(root).ok())
            .unwrap_or(concrete);
        let mut logical = relative.to_path_buf();
        while self.engines.engine_for_path(&logical).is_some() {
            logical = logical.with_extension("");
        }
        logical
    }

    /// The chain of paths `concrete` passes through: the template itself,
    /// one intermediate per engine stage under the template expansion
    /// directory, and finally `<build>/<logical path>`.
    pub fn metamorphose(&self, concrete: &Path) -> Vec<PathBuf> {
        let logical = self.logical_path(concrete);
        let logical_dir = logical.parent().map(Path::to_path_buf).unwrap_or_default();
        let expansions = self.config.template_expansion_dir().join(&logical_dir);

        let mut chain = vec![concrete.to_path_buf()];
        let mut name = PathBuf::from(concrete.file_name().unwrap_or_default());
        while self.engines.engine_for_path(&name).is_some() {
            name = name.with_extension("");
            if self.engines.engine_for_path(&name).is_some() {
                chain.push(expansions.join(&name));
            }
        }
        chain.push(self.config.build_dir().join(logical));
        chain
    }

    /// Expand `concrete` into `output` (its metamorphosis target when
    /// `None`).
    ///
    /// Final templates are copied verbatim. Others are rendered stage by
    /// stage with `locals` plus the book metadata; an HTML result is then
    /// wrapped by the nearest `_layout.html` when `with_layout` is set.
    pub fn expand(
        &self,
        concrete: &Path,
        output: Option<&Path>,
        locals: &TeraContext,
        with_layout: bool,
    ) -> Result<PathBuf> {
        let mut chain = self.metamorphose(concrete);
        if let Some(output) = output
            && let Some(last) = chain.last_mut()
        {
            *last = output.to_path_buf();
        }
        let Some(target) = chain.last().cloned() else {
            return Err(QuireError::Other {
                message: format!("Empty expansion chain for {}", concrete.display()),
            }
            .into());
        };

        if self.engines.engine_for_path(concrete).is_none() {
            debug!("Publishing {} verbatim", concrete.display());
            copy_file(concrete, &target)?;
            return Ok(target);
        }

        let context = self.context(locals);
        let mut text = read_text_file(concrete)?;
        for pair in chain.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let engine = self.engines.engine_for_path(from).ok_or_else(|| QuireError::Other {
                message: format!("No template engine for {}", from.display()),
            })?;
            text = engine.render(concrete, &text, &context)?;
            if to != &target {
                write_text_file(to, &text)?;
                trace!("Expanded {} -> {}", from.display(), to.display());
            }
        }

        if with_layout && target.extension().is_some_and(|e| e == "html") {
            text = self.apply_layout(&target, text, &context)?;
        }
        ensure_parent_dir(&target)?;
        write_text_file(&target, &text)?;
        debug!("Expanded {} -> {}", concrete.display(), target.display());
        Ok(target)
    }

    /// Render a partial to a string, without writing it or applying a layout.
    pub fn render(&self, logical: impl AsRef<Path>, locals: &TeraContext) -> Result<String> {
        let concrete = self.find(logical)?;
        self.engines.render_chain(&concrete, &read_text_file(&concrete)?, &self.context(locals))
    }

    /// Wrap `content` in the nearest layout, searching from the output's
    /// directory up to the build directory.
    fn apply_layout(&self, output: &Path, content: String, context: &TeraContext) -> Result<String> {
        let Some(layout) = self.find_layout(output)? else {
            return Ok(content);
        };
        debug!("Applying layout {}", layout.display());
        let mut context = context.clone();
        context.insert("content", &content);
        self.engines.render_chain(&layout, &read_text_file(&layout)?, &context)
    }

    /// Nearest `_layout.html` for an output below the build directory.
    pub fn find_layout(&self, output: &Path) -> Result<Option<PathBuf>> {
        let build_dir = self.config.build_dir();
        let mut dir = output.parent();
        while let Some(current) = dir {
            let Ok(logical_dir) = current.strip_prefix(&build_dir) else {
                break;
            };
            if let Some(layout) = self.find_optional(logical_dir.join(LAYOUT_NAME))? {
                return Ok(Some(layout));
            }
            if current == build_dir {
                break;
            }
            dir = current.parent();
        }
        Ok(None)
    }

    /// Book metadata available to every template, overlaid with `locals`.
    pub fn context(&self, locals: &TeraContext) -> TeraContext {
        let config = &self.config;
        let mut context = TeraContext::new();
        context.insert("book_title", &config.title);
        context.insert("book_name", &config.name);
        context.insert("authors", &config.authors);
        context.insert("description", &config.description);
        context.insert("language", &config.language);
        context.insert("date", &config.date);
        context.insert("rights", &config.rights);
        context.extend(locals.clone());
        context
    }

    /// Every template in either root by logical path; the user root wins.
    ///
    /// Editor backups, dotfiles and similar noise are skipped.
    pub fn list_templates(&self) -> Result<Vec<TemplateEntry>> {
        let mut found: BTreeMap<PathBuf, TemplateEntry> = BTreeMap::new();
        for (index, root) in self.roots.iter().enumerate() {
            if !root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
                if !entry.file_type().is_file() || is_noise(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                let logical = self.logical_path(entry.path());
                found.entry(logical.clone()).or_insert_with(|| TemplateEntry {
                    logical,
                    path: entry.path().to_path_buf(),
                    user: index == 0,
                });
            }
        }
        Ok(found.into_values().collect())
    }
}

/// Names starting with anything but `_`, `.` or an alphanumeric, or ending
/// in a non-alphanumeric (`#draft#`, `page.html~`).
fn is_noise(name: &str) -> bool {
    let starts_badly = name.chars().next().is_none_or(|c| !(c == '_' || c == '.' || c.is_alphanumeric()));
    let ends_badly = name.chars().last().is_none_or(|c| !c.is_alphanumeric());
    starts_badly || ends_badly
}

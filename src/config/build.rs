use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::tools::{DeliverableConfig, ToolsConfig};
use crate::core::{QuireError, SourceFormat};
use crate::utils::fs::read_toml_file;
use crate::utils::slugify;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "quire.toml";

/// Environment variable overriding the default system template root.
pub const SYSTEM_TEMPLATES_ENV: &str = "QUIRE_SYSTEM_TEMPLATES";

const FRONTMATTER_CLASSES: &[&str] = &[
    "frontcover",
    "halftitlepage",
    "titlepage",
    "imprint",
    "dedication",
    "foreword",
    "toc",
    "preface",
];

const BACKMATTER_CLASSES: &[&str] =
    &["references", "appendix", "bibliography", "glossary", "index", "colophon", "backcover"];

const DEFAULT_LISTING_EXTENSIONS: &[(&str, &str)] = &[
    ("bash", "sh"),
    ("c++", "cpp"),
    ("cpp", "cpp"),
    ("csharp", "cs"),
    ("elixir", "ex"),
    ("emacs-lisp", "el"),
    ("erlang", "erl"),
    ("haskell", "hs"),
    ("javascript", "js"),
    ("kotlin", "kt"),
    ("markdown", "md"),
    ("perl", "pl"),
    ("python", "py"),
    ("ruby", "rb"),
    ("rust", "rs"),
    ("shell", "sh"),
    ("typescript", "ts"),
    ("yaml", "yml"),
];

/// Configuration of one book project.
///
/// Every field has a default, so an empty (or missing) `quire.toml` is a
/// valid configuration. Relative paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Project root. Set by [`BuildConfig::load`], never read from the file.
    #[serde(skip)]
    pub project_root: PathBuf,

    pub title: String,
    /// URL-safe book name; derived from the title when empty.
    pub name: String,
    pub authors: Vec<String>,
    pub description: String,
    pub language: String,
    /// Publication date; the load time (RFC 3339) when empty.
    pub date: String,
    /// Rights statement; derived from the year and authors when empty.
    pub rights: String,

    pub build_dir: PathBuf,
    /// User template root, searched before the system root.
    pub template_dir: PathBuf,
    /// System template root with the built-in defaults.
    pub system_template_dir: PathBuf,

    /// Glob patterns selecting source files.
    pub sources: Vec<String>,
    /// Glob patterns removing files from the selection.
    pub exclude: Vec<String>,
    /// File extension (without dot) to source format.
    pub formats: BTreeMap<String, SourceFormat>,

    /// Stylesheets linked from the spine.
    pub stylesheets: Vec<String>,
    /// Whether the spine carries author/date/Dublin Core metadata.
    pub metadata: bool,
    pub bitmap_cover_image: Option<PathBuf>,
    pub vector_cover_image: Option<PathBuf>,
    /// Additional files copied into the master asset tree.
    pub extra_assets: Vec<PathBuf>,

    /// Classes that mark front-matter toplevel elements.
    pub frontmatter_classes: Vec<String>,
    /// Classes that mark back-matter toplevel elements.
    pub backmatter_classes: Vec<String>,
    /// Class marking a `pre` element as an extractable code listing.
    pub code_marker_class: String,
    /// Language to listing file extension, merged over the built-in table.
    /// Languages in neither use their lowercased name.
    pub listing_extensions: BTreeMap<String, String>,

    /// Maximum number of build actions running at once.
    pub jobs: Option<usize>,

    pub tools: ToolsConfig,
    pub deliverables: Vec<DeliverableConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let mut formats = BTreeMap::new();
        formats.insert("md".to_string(), SourceFormat::markdown());
        formats.insert("markdown".to_string(), SourceFormat::markdown());
        formats.insert("org".to_string(), SourceFormat::orgmode());

        Self {
            project_root: PathBuf::from("."),
            title: "Untitled Book".to_string(),
            name: String::new(),
            authors: Vec::new(),
            description: String::new(),
            language: "en".to_string(),
            date: String::new(),
            rights: String::new(),
            build_dir: PathBuf::from("build"),
            template_dir: PathBuf::from("templates"),
            system_template_dir: default_system_template_dir(),
            sources: vec!["**/*.md".to_string(), "**/*.markdown".to_string(), "**/*.org".to_string()],
            exclude: Vec::new(),
            formats,
            stylesheets: Vec::new(),
            metadata: true,
            bitmap_cover_image: None,
            vector_cover_image: None,
            extra_assets: Vec::new(),
            frontmatter_classes: FRONTMATTER_CLASSES.iter().map(ToString::to_string).collect(),
            backmatter_classes: BACKMATTER_CLASSES.iter().map(ToString::to_string).collect(),
            code_marker_class: "sourceCode".to_string(),
            listing_extensions: BTreeMap::new(),
            jobs: None,
            tools: ToolsConfig::default(),
            deliverables: Vec::new(),
        }
    }
}

/// System template root when `quire.toml` names none.
///
/// `QUIRE_SYSTEM_TEMPLATES` wins, then a `templates` directory next to the
/// executable or in `../share/quire` relative to it, then the templates of
/// the source tree the binary was built from.
pub fn default_system_template_dir() -> PathBuf {
    let exe_dir = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf));
    system_template_dir_from(std::env::var_os(SYSTEM_TEMPLATES_ENV).map(PathBuf::from), exe_dir.as_deref())
}

fn system_template_dir_from(from_env: Option<PathBuf>, exe_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = from_env.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    if let Some(exe_dir) = exe_dir {
        let installed = [exe_dir.join("templates"), exe_dir.join("../share/quire/templates")];
        if let Some(dir) = installed.into_iter().find(|d| d.is_dir()) {
            return dir;
        }
    }
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))
}

impl BuildConfig {
    /// Load `quire.toml` from `project_root`, falling back to defaults when
    /// the file does not exist.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE_NAME);
        let config = if config_path.exists() {
            tracing::debug!("Loading configuration from {}", config_path.display());
            read_toml_file::<Self>(&config_path).map_err(|e| {
                let reason = e.chain().last().map(ToString::to_string).unwrap_or_default();
                anyhow::Error::from(QuireError::ConfigError {
                    file: config_path.display().to_string(),
                    reason,
                })
            })?
        } else {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, project_root.display());
            Self::default()
        };
        config.finalize(project_root)
    }

    /// Defaults rooted at `project_root`, as if loaded from an empty file.
    pub fn for_project(project_root: &Path) -> Result<Self> {
        Self::default().finalize(project_root)
    }

    /// Fill derived fields and validate.
    pub fn finalize(mut self, project_root: &Path) -> Result<Self> {
        self.project_root = project_root.to_path_buf();
        if self.name.is_empty() {
            self.name = slugify(&self.title);
        }
        if self.date.is_empty() {
            self.date = chrono::Local::now().to_rfc3339();
        }
        if self.rights.is_empty() {
            self.rights = format!("Copyright © {} {}", chrono::Local::now().year(), self.authors.join(", "))
                .trim_end()
                .to_string();
        }
        if self.jobs == Some(0) {
            return Err(QuireError::ConfigError {
                file: CONFIG_FILE_NAME.to_string(),
                reason: "jobs must be at least 1".to_string(),
            }
            .into());
        }
        for pattern in self.sources.iter().chain(self.exclude.iter()) {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid glob pattern in {CONFIG_FILE_NAME}: {pattern}"))?;
        }
        Ok(self)
    }

    /// Resolve a project-relative path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.project_root.join(path)
    }

    /// Maximum concurrent build actions.
    pub fn jobs(&self) -> usize {
        self.jobs
            .unwrap_or_else(|| std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4))
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build_dir)
    }

    pub fn user_template_dir(&self) -> PathBuf {
        self.resolve(&self.template_dir)
    }

    pub fn system_template_dir(&self) -> PathBuf {
        self.resolve(&self.system_template_dir)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.build_dir().join("exports")
    }

    pub fn signatures_dir(&self) -> PathBuf {
        self.build_dir().join("signatures")
    }

    pub fn spine_path(&self) -> PathBuf {
        self.build_dir().join("spine.xhtml")
    }

    pub fn codex_path(&self) -> PathBuf {
        self.build_dir().join("codex.xhtml")
    }

    pub fn skeleton_path(&self) -> PathBuf {
        self.build_dir().join("skeleton.xhtml")
    }

    pub fn listings_dir(&self) -> PathBuf {
        self.build_dir().join("listings")
    }

    pub fn highlights_dir(&self) -> PathBuf {
        self.build_dir().join("highlights")
    }

    /// Timestamp marking that every highlight the skeleton needs exists.
    pub fn highlights_stamp(&self) -> PathBuf {
        self.build_dir().join("highlights.timestamp")
    }

    pub fn master_dir(&self) -> PathBuf {
        self.build_dir().join("master")
    }

    pub fn master_path(&self) -> PathBuf {
        self.master_dir().join("master.xhtml")
    }

    /// Timestamp marking that the master asset tree is populated.
    pub fn assets_stamp(&self) -> PathBuf {
        self.master_dir().join("assets.timestamp")
    }

    pub fn fascicles_dir(&self) -> PathBuf {
        self.build_dir().join("fascicles")
    }

    pub fn fascicle_manifest(&self) -> PathBuf {
        self.build_dir().join("fascicle-manifest.txt")
    }

    /// Work directory for intermediate template expansions.
    pub fn template_expansion_dir(&self) -> PathBuf {
        self.build_dir().join("template-expansions")
    }

    pub fn site_dir(&self) -> PathBuf {
        self.build_dir().join("site")
    }

    /// Every taxonomy class that marks a toplevel element, chapters first.
    pub fn toplevel_classes(&self) -> Vec<String> {
        let mut classes = vec!["chapter".to_string()];
        classes.extend(self.frontmatter_classes.iter().cloned());
        classes.extend(self.backmatter_classes.iter().cloned());
        classes
    }

    /// File extension for a listing in `language`.
    pub fn listing_extension(&self, language: &str) -> String {
        let language = language.to_lowercase();
        self.listing_extensions
            .get(&language)
            .cloned()
            .or_else(|| DEFAULT_LISTING_EXTENSIONS.iter().find(|(l, _)| *l == language).map(|(_, e)| e.to_string()))
            .unwrap_or(language)
    }

    /// Path relative to the project root, with `/` separators, for manifests and logs.
    pub fn display_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
    }
}

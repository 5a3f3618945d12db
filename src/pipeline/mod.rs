//! The document transformation pipeline.
//!
//! [`Pipeline::define_tasks`] turns a project into a [`TaskGraph`]:
//!
//! ```text
//! source ─▶ build/exports/<rel>.html ─▶ build/signatures/<rel>.xhtml ─┐
//!                                                                      ▼
//!   build/spine.xhtml ─▶ build/codex.xhtml ─▶ build/skeleton.xhtml ─▶ build/highlights.timestamp
//!                                                   │                     (requests build/highlights/<digest>.html)
//!                                                   ▼
//!   build/master/master.xhtml + build/master/assets.timestamp ─▶ build/fascicle-manifest.txt ─▶ site
//!                                                   └─▶ deliverables
//! ```
//!
//! Each stage lives in its own module; this module only wires them to
//! targets. Stage functions are blocking and run on the blocking pool.
//!
//! Phony targets name each stage: `export`, `signatures`, `spine`, `codex`,
//! `skeleton`, `highlight`, `master`, `fascicles`, `site` and
//! `deliverables`.

pub mod codex;
pub mod collaborators;
pub mod fascicle;
pub mod handlers;
pub mod master;
pub mod normalize;
pub mod skeleton;
pub mod spine;
pub mod xinclude;

pub use collaborators::{
    AssetLinker, Collaborators, CommandExporter, CommandHighlighter, Exporter, Highlighter, LinkingAssetLinker,
    XIncludeProcessor,
};
pub use fascicle::{Fascicle, read_fascicles};
pub use handlers::FormatHandlers;
pub use xinclude::XIncludeResolver;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{BuildConfig, CONFIG_FILE_NAME, DeliverableConfig};
use crate::core::{QuireError, Target};
use crate::graph::{BuildReport, BuildSession, TaskGraph, TargetPattern, action, deps_fn};
use crate::listing::ListingCache;
use crate::source::{SourceFile, SourceRegistry};
use crate::templating::TemplateResolver;
use crate::utils::ToolCommand;
use crate::utils::fs::touch;
use crate::xhtml::{read_html, read_xhtml, write_xhtml};

/// Names of the stage targets, in pipeline order.
pub const STAGES: [&str; 10] = [
    "export",
    "signatures",
    "spine",
    "codex",
    "skeleton",
    "highlight",
    "master",
    "fascicles",
    "site",
    "deliverables",
];

/// Everything needed to build one project.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<BuildConfig>,
    registry: Arc<SourceRegistry>,
    listings: ListingCache,
    handlers: Arc<FormatHandlers>,
    collaborators: Collaborators,
    templates: Option<Arc<TemplateResolver>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<BuildConfig>,
        registry: SourceRegistry,
        handlers: FormatHandlers,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            listings: ListingCache::new(config.clone()),
            config,
            registry: Arc::new(registry),
            handlers: Arc::new(handlers),
            collaborators,
            templates: None,
        }
    }

    /// Discover sources and wire the configured command-line collaborators
    /// and the default template resolver.
    pub fn from_config(config: Arc<BuildConfig>) -> Result<Self> {
        let registry = SourceRegistry::discover(config.clone())?;
        let handlers = FormatHandlers::from_config(&config);
        let collaborators = Collaborators::from_config(&config);
        let templates = TemplateResolver::new(config.clone());
        Ok(Self::new(config, registry, handlers, collaborators).with_templates(Some(Arc::new(templates))))
    }

    /// Attach (or detach) the template resolver used by the `site` target.
    #[must_use]
    pub fn with_templates(mut self, templates: Option<Arc<TemplateResolver>>) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &Arc<BuildConfig> {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn listings(&self) -> &ListingCache {
        &self.listings
    }

    /// `deliverables` when any are configured, `fascicles` otherwise.
    pub fn default_target(&self) -> Target {
        if self.config.deliverables.is_empty() {
            Target::phony("fascicles")
        } else {
            Target::phony("deliverables")
        }
    }

    /// Build `targets` in a fresh session.
    pub async fn build(&self, targets: &[Target]) -> Result<BuildReport> {
        let graph = Arc::new(self.define_tasks()?);
        let session = BuildSession::new(graph, self.config.jobs());
        session.build(targets).await
    }

    /// Declare every target of the project.
    pub fn define_tasks(&self) -> Result<TaskGraph> {
        let mut graph = TaskGraph::new();
        self.define_exports(&mut graph)?;
        self.define_signatures(&mut graph)?;
        self.define_spine(&mut graph);
        self.define_codex(&mut graph);
        self.define_skeleton(&mut graph);
        self.define_highlights(&mut graph)?;
        self.define_master(&mut graph);
        self.define_fascicles(&mut graph);
        self.define_site(&mut graph);
        self.define_deliverables(&mut graph);
        debug!("Defined tasks for {} sources", self.registry.len());
        Ok(graph)
    }

    fn define_exports(&self, graph: &mut TaskGraph) -> Result<()> {
        let mut exports = Vec::new();
        for source in self.registry.files() {
            let exporter = self.handlers.exporter(&source.format)?;
            let export = self.registry.export_path(source);
            let file = source.clone();
            let config = self.config.clone();
            graph.file(
                &export,
                vec![Target::file(&source.path)],
                action(move |ctx| {
                    let exporter = exporter.clone();
                    let file = file.clone();
                    let config = config.clone();
                    async move {
                        let export = ctx.output_path()?.to_path_buf();
                        info!("Exporting {}", config.display_path(&file.path));
                        blocking(move || exporter.export(&file.path, &export, &file.format)).await
                    }
                }),
            );
            exports.push(Target::file(export));
        }
        graph.phony("export", exports, noop());
        Ok(())
    }

    fn define_signatures(&self, graph: &mut TaskGraph) -> Result<()> {
        let mut signatures = Vec::new();
        for source in self.registry.files() {
            let normalizer = self.handlers.normalizer(&source.format)?;
            let export = self.registry.export_path(source);
            let signature = self.registry.signature_path(source);
            let info = signature_info(&self.config, source, &export);
            let config = self.config.clone();
            graph.file(
                &signature,
                vec![Target::file(&export)],
                action(move |ctx| {
                    let normalizer = normalizer.clone();
                    let info = info.clone();
                    let config = config.clone();
                    async move {
                        let export = ctx.source_path()?.to_path_buf();
                        let output = ctx.output_path()?.to_path_buf();
                        blocking(move || {
                            let mut doc = read_html(&export)?;
                            normalizer.normalize(&mut doc, &config)?;
                            let signature = normalize::build_signature(&doc, &info);
                            write_xhtml(&output, &signature)?;
                            info!("Wrote signature {}", config.display_path(&output));
                            Ok(())
                        })
                        .await
                    }
                }),
            );
            signatures.push(Target::file(signature));
        }
        graph.phony("signatures", signatures, noop());
        Ok(())
    }

    fn define_spine(&self, graph: &mut TaskGraph) {
        let mut deps: Vec<Target> = self.registry.signature_paths().into_iter().map(Target::file).collect();
        let config_file = self.config.resolve(CONFIG_FILE_NAME);
        if config_file.exists() {
            deps.push(Target::file(config_file));
        }

        let config = self.config.clone();
        let registry = self.registry.clone();
        let spine = self.config.spine_path();
        graph.file(
            &spine,
            deps,
            action(move |ctx| {
                let config = config.clone();
                let registry = registry.clone();
                async move {
                    let output = ctx.output_path()?.to_path_buf();
                    blocking(move || {
                        let doc = spine::build_spine(&config, &registry);
                        write_xhtml(&output, &doc)?;
                        info!("Composed spine of {} signatures", registry.len());
                        Ok(())
                    })
                    .await
                }
            }),
        );
        graph.phony("spine", vec![Target::file(spine)], noop());
    }

    fn define_codex(&self, graph: &mut TaskGraph) {
        let config = self.config.clone();
        let xinclude = self.collaborators.xinclude.clone();
        let codex = self.config.codex_path();
        graph.file(
            &codex,
            vec![Target::file(self.config.spine_path())],
            action(move |ctx| {
                let config = config.clone();
                let xinclude = xinclude.clone();
                async move {
                    let spine = ctx.source_path()?.to_path_buf();
                    let output = ctx.output_path()?.to_path_buf();
                    blocking(move || {
                        xinclude.flatten(&spine, &output)?;
                        let mut doc = read_xhtml(&output)?;
                        let stats = codex::renumber(&mut doc, &config);
                        write_xhtml(&output, &doc)?;
                        info!(
                            "Expanded codex: {} signatures, {} toplevel elements, {} links rewritten",
                            stats.signatures, stats.toplevels, stats.links
                        );
                        Ok(())
                    })
                    .await
                }
            }),
        );
        graph.phony("codex", vec![Target::file(codex)], noop());
    }

    fn define_skeleton(&self, graph: &mut TaskGraph) {
        let config = self.config.clone();
        let listings = self.listings.clone();
        let skeleton = self.config.skeleton_path();
        graph.file(
            &skeleton,
            vec![Target::file(self.config.codex_path())],
            action(move |ctx| {
                let config = config.clone();
                let listings = listings.clone();
                async move {
                    let codex = ctx.source_path()?.to_path_buf();
                    let output = ctx.output_path()?.to_path_buf();
                    blocking(move || {
                        let mut doc = read_xhtml(&codex)?;
                        let extraction = skeleton::extract_listings(&mut doc, &config, &listings)?;
                        write_xhtml(&output, &doc)?;
                        info!(
                            "Extracted {} listings ({} new, {} distinct)",
                            extraction.listings,
                            extraction.created,
                            extraction.digests.len()
                        );
                        Ok(())
                    })
                    .await
                }
            }),
        );
        graph.phony("skeleton", vec![Target::file(skeleton)], noop());
    }

    fn define_highlights(&self, graph: &mut TaskGraph) -> Result<()> {
        let listings = self.listings.clone();
        let stamp = self.config.highlights_stamp();
        graph.file(
            &stamp,
            vec![Target::file(self.config.skeleton_path())],
            action(move |ctx| {
                let listings = listings.clone();
                async move {
                    let skeleton = ctx.source_path()?.to_path_buf();
                    let doc = blocking(move || read_xhtml(&skeleton)).await?;
                    let missing: Vec<Target> = skeleton::placeholder_digests(&doc)
                        .into_iter()
                        .filter(|digest| !listings.has_highlight(digest))
                        .map(|digest| Target::file(listings.highlight_path(&digest)))
                        .collect();
                    debug!("{} highlights to render", missing.len());
                    if !missing.is_empty() {
                        ctx.request(missing).await?;
                    }
                    touch(ctx.output_path()?)
                }
            }),
        );

        let pattern = TargetPattern::in_dir(&self.config.highlights_dir(), "*.html")?;
        let listings = self.listings.clone();
        let highlighter = self.collaborators.highlighter.clone();
        graph.rule(
            pattern,
            deps_fn(move |path| {
                let digest = listings.digest_of_highlight(path).ok_or_else(|| QuireError::Other {
                    message: format!("Not a highlight path: {}", path.display()),
                })?;
                match listings.find_listing(&digest)? {
                    Some(listing) => Ok(vec![Target::file(listing)]),
                    None => Err(QuireError::MissingSource {
                        target: listings.listings_dir().join(format!("{digest}.*")).display().to_string(),
                    }
                    .into()),
                }
            }),
            action(move |ctx| {
                let highlighter = highlighter.clone();
                async move {
                    let listing = ctx.source_path()?.to_path_buf();
                    let output = ctx.output_path()?.to_path_buf();
                    debug!("Highlighting {}", listing.display());
                    blocking(move || highlighter.highlight(&listing, &output)).await
                }
            }),
        );
        graph.phony("highlight", vec![Target::file(stamp)], noop());
        Ok(())
    }

    fn define_master(&self, graph: &mut TaskGraph) {
        let config = self.config.clone();
        let xinclude = self.collaborators.xinclude.clone();
        let master_path = self.config.master_path();
        graph.file(
            &master_path,
            vec![Target::file(self.config.skeleton_path()), Target::file(self.config.highlights_stamp())],
            action(move |_ctx| {
                let config = config.clone();
                let xinclude = xinclude.clone();
                async move {
                    blocking(move || {
                        let summary = master::assemble_master(&config, xinclude.as_ref())?;
                        if summary.missing_highlights > 0 {
                            warn!("{} listings have no highlight", summary.missing_highlights);
                        }
                        Ok(())
                    })
                    .await
                }
            }),
        );

        let config = self.config.clone();
        let linker = self.collaborators.asset_linker.clone();
        let assets_stamp = self.config.assets_stamp();
        graph.file(
            &assets_stamp,
            vec![Target::file(&master_path)],
            action(move |ctx| {
                let config = config.clone();
                let linker = linker.clone();
                async move {
                    let stamp = ctx.output_path()?.to_path_buf();
                    blocking(move || {
                        let assets = master::master_assets(&config)?;
                        let placed = master::materialize_assets(&config, linker.as_ref(), &assets)?;
                        info!("Materialized {} assets", placed);
                        touch(&stamp)
                    })
                    .await
                }
            }),
        );
        graph.phony("master", vec![Target::file(master_path), Target::file(assets_stamp)], noop());
    }

    fn define_fascicles(&self, graph: &mut TaskGraph) {
        let config = self.config.clone();
        let manifest = self.config.fascicle_manifest();
        graph.file(
            &manifest,
            vec![Target::file(self.config.master_path()), Target::file(self.config.assets_stamp())],
            action(move |_ctx| {
                let config = config.clone();
                async move { blocking(move || fascicle::split_fascicles(&config).map(|_| ())).await }
            }),
        );
        graph.phony("fascicles", vec![Target::file(manifest)], noop());
    }

    fn define_site(&self, graph: &mut TaskGraph) {
        let config = self.config.clone();
        let templates = self.templates.clone();
        graph.phony(
            "site",
            vec![Target::file(self.config.fascicle_manifest())],
            action(move |_ctx| {
                let config = config.clone();
                let templates = templates.clone();
                async move {
                    let Some(templates) = templates else {
                        warn!("No template resolver configured; skipping site generation");
                        return Ok(());
                    };
                    blocking(move || {
                        let fascicles = read_fascicles(&config)?;
                        let site = crate::templating::generate_site(&templates, &fascicles)?;
                        info!("Generated site: {} pages, {} published templates", site.pages, site.published);
                        Ok(())
                    })
                    .await
                }
            }),
        );
    }

    fn define_deliverables(&self, graph: &mut TaskGraph) {
        let mut outputs = Vec::new();
        for deliverable in &self.config.deliverables {
            let output = self.config.build_dir().join(&deliverable.output);
            let config = self.config.clone();
            let deliverable = deliverable.clone();
            graph.file(
                &output,
                vec![Target::file(self.config.master_path()), Target::file(self.config.assets_stamp())],
                action(move |ctx| {
                    let config = config.clone();
                    let deliverable = deliverable.clone();
                    async move {
                        let output = ctx.output_path()?.to_path_buf();
                        blocking(move || run_deliverable(&config, &deliverable, &output)).await
                    }
                }),
            );
            outputs.push(Target::file(output));
        }
        graph.phony("deliverables", outputs, noop());
    }
}

fn signature_info(config: &BuildConfig, source: &SourceFile, export: &Path) -> normalize::SignatureInfo {
    normalize::SignatureInfo {
        name: source.name(),
        source: config.display_path(&source.path),
        export: config.display_path(export),
    }
}

fn run_deliverable(config: &BuildConfig, deliverable: &DeliverableConfig, output: &Path) -> Result<()> {
    crate::utils::fs::ensure_parent_dir(output)?;
    info!("Building {} ({})", deliverable.name, config.display_path(output));
    ToolCommand::from_template(
        &deliverable.command,
        &[
            ("input", config.master_path().display().to_string()),
            ("output", output.display().to_string()),
            ("title", config.title.clone()),
            ("authors", config.authors.join(", ")),
            ("date", config.date.clone()),
            ("language", config.language.clone()),
        ],
    )?
    .current_dir(config.master_dir())
    .with_context(format!("deliverable {}", deliverable.name))
    .run()
    .with_context(|| format!("Failed to build deliverable '{}'", deliverable.name))?;
    Ok(())
}

fn noop() -> crate::graph::Action {
    action(|_ctx| async { Ok(()) })
}

/// Run a blocking stage function on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.context("Blocking task panicked")?
}

/// Target for a stage name, or for a path relative to the project root.
pub fn parse_target(config: &BuildConfig, name: &str) -> Target {
    if STAGES.contains(&name) {
        Target::phony(name)
    } else {
        let path = PathBuf::from(name);
        Target::file(if path.is_absolute() { path } else { config.resolve(path) })
    }
}

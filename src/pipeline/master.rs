//! Master assembly.
//!
//! The skeleton's highlight placeholders are resolved through the
//! [`XIncludeProcessor`] into `<build>/master/master.xhtml`. Placeholders
//! whose highlight is still missing keep their fallback text.
//!
//! The master lives in its own directory next to a mirror of the project's
//! assets: every local `src` in the body (resolved against the directory of
//! the signature's source file) and every stylesheet link in the head
//! (resolved against the build directory, where the spine put it) is
//! rewritten to its project-relative path, and that path is materialized
//! below `<build>/master/` by the [`AssetLinker`].

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::collaborators::{AssetLinker, XIncludeProcessor};
use crate::config::BuildConfig;
use crate::utils::fs::{is_safe_path, normalize_path};
use crate::xhtml::{Document, NodeId, read_xhtml, write_xhtml};

const MISSING_LISTING: &str = "[Missing code listing:";

/// What assembling the master produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterSummary {
    /// Project-relative asset paths the master references.
    pub assets: BTreeSet<PathBuf>,
    /// Listings still showing their fallback text.
    pub missing_highlights: usize,
}

/// Flatten the skeleton into the master document and rewrite its asset
/// references.
pub fn assemble_master(config: &BuildConfig, xinclude: &dyn XIncludeProcessor) -> Result<MasterSummary> {
    let master_path = config.master_path();
    xinclude.flatten(&config.skeleton_path(), &master_path)?;

    let mut doc = read_xhtml(&master_path)?;
    let missing_highlights = report_missing_highlights(&doc);
    let assets = rewrite_assets(&mut doc, config);
    write_xhtml(&master_path, &doc)?;

    info!("Assembled {} ({} assets)", config.display_path(&master_path), assets.len());
    Ok(MasterSummary {
        assets,
        missing_highlights,
    })
}

fn report_missing_highlights(doc: &Document) -> usize {
    let missing: Vec<NodeId> = doc.find_all(doc.root(), |d, id| {
        d.is_named(id, "div") && d.has_class(id, "listing") && d.text_content(id).trim_start().starts_with(MISSING_LISTING)
    });
    for &listing in &missing {
        warn!(
            "No highlight for listing {} ({}); keeping fallback text",
            doc.get_attr(listing, "data-digest").unwrap_or("?"),
            doc.get_attr(listing, "data-language").unwrap_or("?"),
        );
    }
    missing.len()
}

/// Rewrite local asset references to project-relative paths.
///
/// Returns the set of rewritten paths. URLs with a scheme, data URIs,
/// fragment-only references and paths escaping the project root are left
/// as they are.
pub fn rewrite_assets(doc: &mut Document, config: &BuildConfig) -> BTreeSet<PathBuf> {
    let mut assets = BTreeSet::new();
    let build_dir = config.build_dir();

    if let Some(head) = doc.head() {
        let links = doc.find_all(head, |d, id| {
            d.is_named(id, "link") && d.get_attr(id, "rel").is_some_and(|rel| rel.split_whitespace().any(|r| r == "stylesheet"))
        });
        for link in links {
            rewrite_attr(doc, link, "href", &build_dir, config, &mut assets);
        }
    }

    let scope = doc.body().unwrap_or(doc.root());
    let sourced = doc.find_all(scope, |d, id| d.get_attr(id, "src").is_some());
    for element in sourced {
        let base = signature_source_dir(doc, element, config).unwrap_or_else(|| build_dir.clone());
        rewrite_attr(doc, element, "src", &base, config, &mut assets);
    }
    assets
}

fn rewrite_attr(
    doc: &mut Document,
    element: NodeId,
    attr: &str,
    base: &Path,
    config: &BuildConfig,
    assets: &mut BTreeSet<PathBuf>,
) {
    let Some(value) = doc.get_attr(element, attr).map(str::to_string) else {
        return;
    };
    let Some(relative) = project_relative(&value, base, &config.project_root) else {
        debug!("Leaving {}=\"{}\" untouched", attr, value);
        return;
    };
    doc.set_attr(element, attr, slash_path(&relative));
    assets.insert(relative);
}

/// `reference` resolved against `base`, relative to `root`, when it is a
/// local path inside `root`.
fn project_relative(reference: &str, base: &Path, root: &Path) -> Option<PathBuf> {
    if !is_local_reference(reference) {
        return None;
    }
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    let absolute = normalize_path(&base.join(path));
    if !is_safe_path(root, &absolute) {
        return None;
    }
    absolute.strip_prefix(normalize_path(root)).ok().map(Path::to_path_buf)
}

fn is_local_reference(reference: &str) -> bool {
    !reference.is_empty() && !reference.starts_with('#') && !reference.starts_with("//") && !has_scheme(reference)
}

/// `http:`, `data:`, `mailto:` and friends.
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

fn signature_source_dir(doc: &Document, node: NodeId, config: &BuildConfig) -> Option<PathBuf> {
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        if let Some(source) = doc.get_attr(parent, "data-signature-source") {
            let source = config.resolve(source);
            return source.parent().map(Path::to_path_buf);
        }
        current = doc.parent(parent);
    }
    None
}

fn slash_path(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Every asset the master tree needs: local references in the master
/// document plus the configured cover images and extra assets.
pub fn master_assets(config: &BuildConfig) -> Result<BTreeSet<PathBuf>> {
    let master_path = config.master_path();
    let mut assets = BTreeSet::new();
    if master_path.exists() {
        let doc = read_xhtml(&master_path)?;
        let master_dir = config.master_dir();
        let referencing = doc.find_all(doc.root(), |d, id| {
            d.get_attr(id, "src").is_some() || (d.is_named(id, "link") && d.get_attr(id, "href").is_some())
        });
        for element in referencing {
            let value = doc.get_attr(element, "src").or_else(|| doc.get_attr(element, "href")).unwrap_or_default();
            // Master references are already project-relative paths.
            if let Some(relative) = project_relative(value, &master_dir, &master_dir) {
                assets.insert(relative);
            }
        }
    }

    let configured = [&config.bitmap_cover_image, &config.vector_cover_image]
        .into_iter()
        .flatten()
        .chain(config.extra_assets.iter());
    for asset in configured {
        let absolute = normalize_path(&config.resolve(asset));
        if let Ok(relative) = absolute.strip_prefix(normalize_path(&config.project_root)) {
            assets.insert(relative.to_path_buf());
        } else {
            warn!("Ignoring asset outside the project: {}", asset.display());
        }
    }
    Ok(assets)
}

/// Materialize `assets` (project-relative) below the master directory.
///
/// Missing asset sources are reported and skipped. Returns the number of
/// assets placed.
pub fn materialize_assets(config: &BuildConfig, linker: &dyn AssetLinker, assets: &BTreeSet<PathBuf>) -> Result<usize> {
    let master_dir = config.master_dir();
    let mut placed = 0;
    for asset in assets {
        let source = config.resolve(asset);
        if !source.is_file() {
            warn!("Asset not found, skipping: {}", config.display_path(&source));
            continue;
        }
        linker.materialize(&source, &master_dir.join(asset))?;
        placed += 1;
    }
    debug!("Materialized {} of {} assets", placed, assets.len());
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::collaborators::LinkingAssetLinker;
    use crate::pipeline::xinclude::XIncludeResolver;
    use crate::xhtml::serialize_document;
    use tempfile::TempDir;

    const SKELETON: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xi="http://www.w3.org/2001/XInclude">
<head><title>Book</title><link rel="stylesheet" type="text/css" href="../styles/book.css"/><link rel="schema.DC" href="http://purl.org/dc/elements/1.1/"/></head>
<body>
<div class="signature" data-signature-source="part/ch1.md">
<p><img src="images/fig.png"/><img src="http://example.com/remote.png"/><img src="data:image/png;base64,AAAA"/><img src="../../../etc/secret.png"/></p>
<div class="listing" data-language="ruby" data-digest="aaa"><xi:include href="highlights/aaa.html"><xi:fallback><p>[Missing code listing: highlights/aaa.html]</p></xi:fallback></xi:include></div>
<div class="listing" data-language="ruby" data-digest="bbb"><xi:include href="highlights/bbb.html"><xi:fallback><p>[Missing code listing: highlights/bbb.html]</p></xi:fallback></xi:include></div>
</div>
</body>
</html>
"#;

    fn project() -> (TempDir, BuildConfig) {
        let temp = TempDir::new().unwrap();
        let mut config = BuildConfig::for_project(temp.path()).unwrap();
        config.extra_assets = vec![PathBuf::from("fonts/body.otf")];
        let build = config.build_dir();
        std::fs::create_dir_all(build.join("highlights")).unwrap();
        std::fs::write(config.skeleton_path(), SKELETON).unwrap();
        std::fs::write(build.join("highlights/aaa.html"), r#"<pre class="highlight">puts 1</pre>"#).unwrap();
        std::fs::create_dir_all(temp.path().join("part/images")).unwrap();
        std::fs::write(temp.path().join("part/images/fig.png"), b"png").unwrap();
        std::fs::create_dir_all(temp.path().join("styles")).unwrap();
        std::fs::write(temp.path().join("styles/book.css"), "body {}").unwrap();
        (temp, config)
    }

    #[test]
    fn test_master_resolves_highlights_and_rewrites_assets() {
        let (_temp, config) = project();
        let summary = assemble_master(&config, &XIncludeResolver).unwrap();
        assert_eq!(summary.missing_highlights, 1);
        assert_eq!(
            summary.assets,
            BTreeSet::from([PathBuf::from("part/images/fig.png"), PathBuf::from("styles/book.css")])
        );

        let out = serialize_document(&read_xhtml(&config.master_path()).unwrap());
        assert!(out.contains(r#"<pre class="highlight">puts 1</pre>"#));
        assert!(out.contains("[Missing code listing: highlights/bbb.html]"));
        assert!(out.contains(r#"src="part/images/fig.png""#));
        assert!(out.contains(r#"href="styles/book.css""#));
        assert!(out.contains(r#"src="http://example.com/remote.png""#));
        assert!(out.contains(r#"src="../../../etc/secret.png""#));
        assert!(!out.contains("xi:include"));
    }

    #[test]
    fn test_assets_materialize_and_skip_missing() {
        let (temp, config) = project();
        assemble_master(&config, &XIncludeResolver).unwrap();

        let assets = master_assets(&config).unwrap();
        assert!(assets.contains(&PathBuf::from("fonts/body.otf")));
        let placed = materialize_assets(&config, &LinkingAssetLinker, &assets).unwrap();
        assert_eq!(placed, 2);
        assert_eq!(std::fs::read(config.master_dir().join("part/images/fig.png")).unwrap(), b"png");
        assert!(config.master_dir().join("styles/book.css").exists());
        assert!(!config.master_dir().join("fonts/body.otf").exists());
        assert!(temp.path().join("part/images/fig.png").exists());
    }
}

//! Static site generation from the fascicles.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tera::Context as TeraContext;
use tracing::{debug, info};

use super::resolver::TemplateResolver;
use crate::pipeline::Fascicle;
use crate::pipeline::spine::book_metadata;
use crate::utils::fs::{ensure_dir, write_text_file};
use crate::xhtml::{read_xhtml, serialize_children};

/// Template rendering each fascicle page.
pub const FASCICLE_TEMPLATE: &str = "site/_fascicle.html";

/// Partial rendering the book metadata shared by every page.
pub const BOOK_METADATA_TEMPLATE: &str = "site/_book_metadata.html";

/// What one site generation produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteSummary {
    /// Fascicle pages written.
    pub pages: usize,
    /// Complete templates published.
    pub published: usize,
}

#[derive(Debug, Serialize)]
struct MetadataEntry {
    name: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct FascicleLink {
    title: String,
    name: String,
    number: usize,
    href: String,
}

/// Render one page per fascicle, the table of contents partial, and every
/// complete template under `site/`.
pub fn generate_site(resolver: &TemplateResolver, fascicles: &[Fascicle]) -> Result<SiteSummary> {
    let config = resolver.config();
    let site_dir = config.site_dir();
    ensure_dir(&site_dir)?;

    let links: Vec<FascicleLink> = fascicles
        .iter()
        .map(|f| FascicleLink {
            title: f.title.clone(),
            name: f.name.clone(),
            number: f.number,
            href: format!("/fascicles/{}.html", f.numbered_name),
        })
        .collect();
    let toc = table_of_contents(&links);
    write_text_file(&site_dir.join("_toc.html"), &toc)?;

    let metadata: Vec<MetadataEntry> =
        book_metadata(config).into_iter().map(|(name, content)| MetadataEntry { name, content }).collect();

    let mut shared = TeraContext::new();
    shared.insert("fascicles", &links);
    shared.insert("toc", &toc);
    shared.insert("metadata", &metadata);
    let rendered_metadata = match resolver.find_optional(BOOK_METADATA_TEMPLATE)? {
        Some(_) => resolver.render(BOOK_METADATA_TEMPLATE, &shared)?,
        None => String::new(),
    };
    shared.insert("book_metadata", &rendered_metadata);

    let template = resolver.find(FASCICLE_TEMPLATE)?;
    let mut summary = SiteSummary::default();
    for fascicle in fascicles {
        let mut locals = shared.clone();
        locals.insert("title", &fascicle.title);
        locals.insert("name", &fascicle.name);
        locals.insert("fascicle_number", &fascicle.number);
        locals.insert("content", &fascicle_content(&fascicle.path)?);

        let output = site_dir.join("fascicles").join(format!("{}.html", fascicle.numbered_name));
        resolver.expand(&template, Some(&output), &locals, true)?;
        debug!("Rendered {}", config.display_path(&output));
        summary.pages += 1;
    }

    for entry in resolver.list_templates()? {
        if !entry.logical.starts_with("site") || entry.is_partial() {
            continue;
        }
        let mut locals = shared.clone();
        locals.insert("title", &config.title);
        resolver.expand(&entry.path, None, &locals, true)?;
        summary.published += 1;
    }

    info!("Site written to {}", config.display_path(&site_dir));
    Ok(summary)
}

/// Inner XHTML of the fascicle's signature element.
fn fascicle_content(path: &Path) -> Result<String> {
    let doc = read_xhtml(path)?;
    let signature = doc.find_first(doc.root(), |d, id| d.is_named(id, "div") && d.has_class(id, "signature"));
    let scope = signature.or_else(|| doc.body()).unwrap_or(doc.root());
    Ok(serialize_children(&doc, scope))
}

fn table_of_contents(links: &[FascicleLink]) -> String {
    links
        .iter()
        .map(|l| format!("<li><a href=\"{}\">{}</a></li>\n", escape(&l.href), escape(&l.title)))
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

//! Spine composition: one document that includes every signature.

use std::path::Path;

use crate::config::BuildConfig;
use crate::source::SourceRegistry;
use crate::utils::fs::relative_href;
use crate::xhtml::{Document, NodeId, xinclude_name};

/// Build the spine for `registry`, in registry order.
///
/// Each signature becomes an `xi:include` whose fallback names the missing
/// file, so the spine never depends on signatures being present.
pub fn build_spine(config: &BuildConfig, registry: &SourceRegistry) -> Document {
    let mut doc = Document::xhtml_shell(&config.title);
    let spine_dir = config.build_dir();

    if let Some(head) = doc.head() {
        add_stylesheets(&mut doc, head, config, &spine_dir);
        if config.metadata {
            add_metadata(&mut doc, head, config);
        }
    }

    if let Some(body) = doc.body() {
        for signature in registry.signature_paths() {
            let include = include_with_fallback(
                &mut doc,
                &relative_href(&spine_dir, &signature),
                &format!("[Missing section: {}]", config.display_path(&signature)),
            );
            doc.append(body, include);
        }
    }
    doc
}

/// `<xi:include href=".."><xi:fallback><p>message</p></xi:fallback></xi:include>`
pub fn include_with_fallback(doc: &mut Document, href: &str, message: &str) -> NodeId {
    let include = doc.create_element_qualified(xinclude_name("include"), Vec::new());
    doc.set_attr(include, "href", href);
    let fallback = doc.create_element_qualified(xinclude_name("fallback"), Vec::new());
    doc.append(include, fallback);
    let paragraph = doc.create_element("p");
    doc.append(fallback, paragraph);
    doc.set_text(paragraph, message);
    include
}

fn add_stylesheets(doc: &mut Document, head: NodeId, config: &BuildConfig, spine_dir: &Path) {
    for stylesheet in &config.stylesheets {
        let link = doc.create_element("link");
        doc.set_attr(link, "rel", "stylesheet");
        doc.set_attr(link, "type", "text/css");
        doc.set_attr(link, "href", relative_href(spine_dir, &config.resolve(stylesheet)));
        doc.append(head, link);
    }
}

fn add_metadata(doc: &mut Document, head: NodeId, config: &BuildConfig) {
    let schema = doc.create_element("link");
    doc.set_attr(schema, "rel", "schema.DC");
    doc.set_attr(schema, "href", "http://purl.org/dc/elements/1.1/");
    doc.append(head, schema);

    for (name, content) in book_metadata(config) {
        let meta = doc.create_element("meta");
        doc.set_attr(meta, "name", name);
        doc.set_attr(meta, "content", content);
        doc.append(head, meta);
    }
}

/// Named metadata entries describing the book, in document order. Empty
/// values are left out.
pub fn book_metadata(config: &BuildConfig) -> Vec<(&'static str, String)> {
    let generator = format!("quire {}", env!("CARGO_PKG_VERSION"));
    let mut entries: Vec<(&str, String)> = vec![
        ("author", config.authors.join(", ")),
        ("date", config.date.clone()),
        ("subject", config.description.clone()),
        ("generator", generator),
        ("DC.title", config.title.clone()),
    ];
    entries.extend(config.authors.iter().map(|a| ("DC.creator", a.clone())));
    entries.extend([
        ("DC.description", config.description.clone()),
        ("DC.date", config.date.clone()),
        ("DC.language", config.language.clone()),
        ("DC.rights", config.rights.clone()),
    ]);

    entries.retain(|(_, content)| !content.is_empty());
    entries
}

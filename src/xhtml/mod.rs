//! Document model shared by every pipeline stage.
//!
//! - [`dom`]: arena tree with the queries and mutations the stages need
//! - [`html`]: lenient parsing of raw exporter output (html5ever)
//! - [`xml`]: strict parsing of XHTML artifacts (quick-xml)
//! - [`serialize`]: deterministic XHTML output

pub mod dom;
pub mod html;
pub mod serialize;
pub mod xml;

use anyhow::{Context, Result};
use std::path::Path;

pub use dom::{Document, NodeData, NodeId, XHTML_NS, XINCLUDE_NS, html_name, xinclude_name};
pub use html::parse_html;
pub use serialize::{serialize_children, serialize_document, serialize_node};
pub use xml::parse_xhtml;

use crate::utils::fs::{atomic_write, read_text_file};

/// Read and parse an XHTML artifact.
pub fn read_xhtml(path: &Path) -> Result<Document> {
    let text = read_text_file(path)?;
    let doc = parse_xhtml(&text, &path.display().to_string())?;
    Ok(doc)
}

/// Read an exporter's HTML output leniently.
pub fn read_html(path: &Path) -> Result<Document> {
    let text = read_text_file(path)?;
    Ok(parse_html(&text))
}

/// Serialize and atomically write a document.
pub fn write_xhtml(path: &Path, doc: &Document) -> Result<()> {
    atomic_write(path, serialize_document(doc).as_bytes())
        .with_context(|| format!("Failed to write document: {}", path.display()))
}

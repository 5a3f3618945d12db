//! Export → signature normalization.
//!
//! A format-specific [`Normalizer`] first cleans up the converter's output.
//! [`build_signature`] then derives the title, and wraps the body in the
//! canonical signature document:
//!
//! ```text
//! <html><head><title>Title</title></head>
//!   <body>
//!     <div class="signature" data-signature-name=".." data-signature-title=".."
//!          data-signature-source=".." data-signature-export="..">
//!       <section class="chapter" ...>...</section>
//!     </div>
//!   </body>
//! </html>
//! ```

mod markdown;
mod orgmode;

pub use markdown::MarkdownNormalizer;
pub use orgmode::OrgModeNormalizer;

use anyhow::Result;

use crate::config::BuildConfig;
use crate::xhtml::{Document, NodeData, NodeId};

/// Title of a signature with no usable title or heading.
pub const UNTITLED_SIGNATURE: &str = "Untitled Signature";

/// Title of a manufactured section when the signature is untitled.
pub const UNTITLED_CHAPTER: &str = "Untitled Chapter";

/// Format-specific cleanup of an exported document.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, doc: &mut Document, config: &BuildConfig) -> Result<()>;
}

/// Provenance recorded on the signature wrapper.
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    pub name: String,
    /// Source path as displayed (project-relative).
    pub source: String,
    /// Export path as displayed (project-relative).
    pub export: String,
}

/// First non-empty heading text below `scope`.
pub fn first_heading_text(doc: &Document, scope: NodeId) -> Option<String> {
    doc.find_all(scope, |d, id| d.is_heading(id))
        .into_iter()
        .map(|h| collapse_whitespace(&doc.text_content(h)))
        .find(|text| !text.is_empty())
}

/// Title of an exported document: `<title>`, else the first heading, else
/// [`UNTITLED_SIGNATURE`].
pub fn derive_title(doc: &Document) -> String {
    let from_title = doc
        .title_element()
        .map(|t| collapse_whitespace(&doc.text_content(t)))
        .filter(|t| !t.is_empty());
    from_title
        .or_else(|| doc.body().and_then(|body| first_heading_text(doc, body)))
        .unwrap_or_else(|| UNTITLED_SIGNATURE.to_string())
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True for a missing body, a blank body, or one holding a single empty paragraph.
fn is_empty_body(doc: &Document, body: Option<NodeId>) -> bool {
    let Some(body) = body else {
        return true;
    };
    let significant: Vec<NodeId> = doc
        .children(body)
        .filter(|&c| match doc.get(c).map(|n| &n.data) {
            Some(NodeData::Text(text)) => !text.trim().is_empty(),
            Some(NodeData::Comment(_)) => false,
            _ => true,
        })
        .collect();
    match significant.as_slice() {
        [] => true,
        [only] => {
            doc.is_named(*only, "p")
                && doc.text_content(*only).trim().is_empty()
                && doc.element_children(*only).next().is_none()
        }
        _ => false,
    }
}

/// Wrap a normalized export in the signature document.
pub fn build_signature(export: &Document, info: &SignatureInfo) -> Document {
    let title = derive_title(export);
    let mut doc = Document::xhtml_shell(&title);
    let Some(body) = doc.body() else {
        return doc;
    };

    let wrapper = doc.create_element("div");
    doc.set_attr(wrapper, "class", "signature");
    doc.set_attr(wrapper, "data-signature-name", info.name.as_str());
    doc.set_attr(wrapper, "data-signature-title", title.as_str());
    doc.set_attr(wrapper, "data-signature-source", info.source.as_str());
    doc.set_attr(wrapper, "data-signature-export", info.export.as_str());
    doc.append(body, wrapper);

    let export_body = export.body();
    if is_empty_body(export, export_body) {
        let comment = doc.create_comment(format!(" No content for {} ", info.export));
        doc.append(wrapper, comment);
        return doc;
    }
    let Some(export_body) = export_body else {
        return doc;
    };

    let has_sections = export.element_children(export_body).any(|c| export.is_named(c, "section"));
    let container = if has_sections {
        wrapper
    } else {
        let section = doc.create_element("section");
        doc.set_attr(section, "class", "chapter");
        doc.set_attr(section, "data-implicit", "true");
        let section_title = if title == UNTITLED_SIGNATURE {
            UNTITLED_CHAPTER
        } else {
            title.as_str()
        };
        doc.set_attr(section, "data-title", section_title);
        doc.append(wrapper, section);
        section
    };

    let children: Vec<NodeId> = export.children(export_body).collect();
    for child in children {
        let copy = doc.import(export, child);
        doc.append(container, copy);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhtml::{parse_html, serialize_document};

    fn info() -> SignatureInfo {
        SignatureInfo {
            name: "ch1".to_string(),
            source: "ch1.md".to_string(),
            export: "build/exports/ch1.html".to_string(),
        }
    }

    #[test]
    fn test_title_fallback_chain() {
        let titled = parse_html("<html><head><title> Real  Title </title></head><body><h1>Heading</h1></body></html>");
        assert_eq!(derive_title(&titled), "Real Title");

        let headed = parse_html("<html><head><title> </title></head><body><h2></h2><h2>Second</h2></body></html>");
        assert_eq!(derive_title(&headed), "Second");

        let bare = parse_html("<p>No headings here</p>");
        assert_eq!(derive_title(&bare), UNTITLED_SIGNATURE);
    }

    #[test]
    fn test_prose_gets_implicit_chapter() {
        let export = parse_html("<h1>Title</h1><p>Body</p>");
        let doc = build_signature(&export, &info());

        let wrapper = doc.find_first(doc.root(), |d, id| d.has_class(id, "signature")).unwrap();
        assert_eq!(doc.get_attr(wrapper, "data-signature-title"), Some("Title"));
        assert_eq!(doc.get_attr(wrapper, "data-signature-export"), Some("build/exports/ch1.html"));
        let section = doc.element_children(wrapper).next().unwrap();
        assert_eq!(doc.get_attr(section, "class"), Some("chapter"));
        assert_eq!(doc.get_attr(section, "data-implicit"), Some("true"));
        assert_eq!(doc.get_attr(section, "data-title"), Some("Title"));
        assert_eq!(doc.text_content(doc.title_element().unwrap()), "Title");
    }

    #[test]
    fn test_untitled_prose_gets_untitled_chapter() {
        let doc = build_signature(&parse_html("<p>Just words</p>"), &info());
        let section = doc.first_named("section").unwrap();
        assert_eq!(doc.get_attr(section, "data-title"), Some(UNTITLED_CHAPTER));
    }

    #[test]
    fn test_existing_sections_are_kept() {
        let export = parse_html(r#"<section class="chapter"><h1>A</h1></section><section class="appendix"><h1>B</h1></section>"#);
        let doc = build_signature(&export, &info());
        let wrapper = doc.find_first(doc.root(), |d, id| d.has_class(id, "signature")).unwrap();
        let sections: Vec<_> = doc.element_children(wrapper).collect();
        assert_eq!(sections.len(), 2);
        assert!(doc.get_attr(sections[0], "data-implicit").is_none());
    }

    #[test]
    fn test_empty_bodies_become_comment() {
        for html in ["<html><body></body></html>", "<html><body><p></p></body></html>", "<p>  </p>"] {
            let doc = build_signature(&parse_html(html), &info());
            let out = serialize_document(&doc);
            assert!(out.contains("<!-- No content for build/exports/ch1.html -->"), "{html}: {out}");
            assert!(doc.first_named("section").is_none());
        }
    }
}

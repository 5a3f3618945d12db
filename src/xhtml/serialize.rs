//! Deterministic XHTML serialization.
//!
//! Output is byte-stable for a given tree: attribute order is preserved,
//! namespace declarations are hoisted onto the root element, and block
//! containers holding only elements are indented two spaces per level.
//! Whitespace-only text inside such containers is dropped and regenerated,
//! so parse→serialize→parse→serialize is a fixed point.

use quick_xml::escape::{escape, partial_escape};

use super::dom::{Document, NodeData, NodeId, XHTML_NS, XINCLUDE_NS, qualified};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track",
    "wbr",
];

const BLOCK_CONTAINERS: &[&str] = &[
    "html", "head", "body", "div", "section", "article", "nav", "aside", "header", "footer", "main", "ul",
    "ol", "dl", "table", "thead", "tbody", "tfoot", "tr", "figure", "blockquote", "include", "fallback",
];

const PRESERVE_WHITESPACE: &[&str] = &["pre", "code", "textarea", "script", "style"];

/// Serialize a whole document with XML declaration and doctype.
pub fn serialize_document(doc: &Document) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut writer = Writer {
        doc,
        out: &mut out,
    };
    for child in doc.children(doc.root()) {
        match doc.get(child).map(|n| &n.data) {
            Some(NodeData::Doctype {
                name,
            }) => {
                writer.out.push_str(&format!("<!DOCTYPE {name}>\n"));
            }
            Some(NodeData::Element {
                ..
            }) => {
                writer.element(child, 0, true);
                writer.out.push('\n');
            }
            Some(NodeData::Comment(text)) => {
                writer.out.push_str(&format!("<!--{text}-->\n"));
            }
            _ => {}
        }
    }
    out
}

/// Serialize one subtree without declarations.
pub fn serialize_node(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    let mut writer = Writer {
        doc,
        out: &mut out,
    };
    writer.node(node, 0, false);
    out
}

/// Serialize the children of a node, e.g. the inner markup of a signature.
pub fn serialize_children(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    let mut writer = Writer {
        doc,
        out: &mut out,
    };
    for child in doc.children(node) {
        writer.node(child, 0, false);
    }
    out
}

struct Writer<'a> {
    doc: &'a Document,
    out: &'a mut String,
}

impl Writer<'_> {
    fn node(&mut self, id: NodeId, depth: usize, is_root: bool) {
        match self.doc.get(id).map(|n| &n.data) {
            Some(NodeData::Element {
                ..
            }) => self.element(id, depth, is_root),
            Some(NodeData::Text(text)) => self.out.push_str(&partial_escape(text.as_str())),
            Some(NodeData::Comment(text)) => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
            _ => {}
        }
    }

    fn element(&mut self, id: NodeId, depth: usize, is_root: bool) {
        let Some(name) = self.doc.qual_name(id) else {
            return;
        };
        let tag = qualified(name);
        let local = name.local.as_ref();

        self.out.push('<');
        self.out.push_str(&tag);
        if is_root {
            self.namespace_declarations(id);
        }
        for attr in self.doc.attrs(id) {
            let attr_name = qualified(&attr.name);
            if is_root && (attr_name == "xmlns" || attr_name == "xmlns:xi") {
                continue;
            }
            self.out.push(' ');
            self.out.push_str(&attr_name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(attr.value.as_str()));
            self.out.push('"');
        }

        let has_children = self.doc.children(id).next().is_some();
        if !has_children && VOID_ELEMENTS.contains(&local) {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');

        if self.is_structural(id, local) {
            let children: Vec<NodeId> = self
                .doc
                .children(id)
                .filter(|&c| !self.is_blank_text(c))
                .collect();
            for child in &children {
                self.out.push('\n');
                self.indent(depth + 1);
                self.node(*child, depth + 1, false);
            }
            if !children.is_empty() {
                self.out.push('\n');
                self.indent(depth);
            }
        } else {
            for child in self.doc.children(id) {
                self.node(child, depth + 1, false);
            }
        }

        self.out.push_str("</");
        self.out.push_str(&tag);
        self.out.push('>');
    }

    fn namespace_declarations(&mut self, root: NodeId) {
        let default_ns = self.doc.get_attr(root, "xmlns").unwrap_or(XHTML_NS).to_string();
        self.out.push_str(&format!(" xmlns=\"{}\"", escape(default_ns.as_str())));

        let uses_xinclude = self.doc.get_attr(root, "xmlns:xi").is_some()
            || self
                .doc
                .descendants(root)
                .into_iter()
                .any(|n| self.doc.is_xinclude(n, "include") || self.doc.is_xinclude(n, "fallback"));
        if uses_xinclude {
            self.out.push_str(&format!(" xmlns:xi=\"{XINCLUDE_NS}\""));
        }
    }

    fn is_structural(&self, id: NodeId, local: &str) -> bool {
        if PRESERVE_WHITESPACE.contains(&local) || !BLOCK_CONTAINERS.contains(&local) {
            return false;
        }
        self.doc.children(id).all(|c| match self.doc.get(c).map(|n| &n.data) {
            Some(NodeData::Text(text)) => text.trim().is_empty(),
            _ => true,
        })
    }

    fn is_blank_text(&self, id: NodeId) -> bool {
        matches!(self.doc.get(id).map(|n| &n.data), Some(NodeData::Text(text)) if text.trim().is_empty())
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhtml::parse_xhtml;

    #[test]
    fn test_serialize_shell() {
        let doc = Document::xhtml_shell("A & B");
        let out = serialize_document(&doc);
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n"));
        assert!(out.contains("<html xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(out.contains("<title>A &amp; B</title>"));
        assert!(out.contains("<body></body>"));
    }

    #[test]
    fn test_serialize_is_fixed_point() {
        let source = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>T</title></head><body><div class="signature"><p>Some <em>inline</em> text</p><pre class="ruby">  indented
    code</pre></div></body></html>"#;
        let first = serialize_document(&parse_xhtml(source, "<string>").unwrap());
        let second = serialize_document(&parse_xhtml(&first, "<string>").unwrap());
        assert_eq!(first, second);
        assert!(first.contains("<p>Some <em>inline</em> text</p>"));
        assert!(first.contains("<pre class=\"ruby\">  indented\n    code</pre>"));
    }

    #[test]
    fn test_xinclude_namespace_hoisted() {
        let mut doc = Document::xhtml_shell("Spine");
        let body = doc.body().unwrap();
        let include = doc.create_element_qualified(crate::xhtml::xinclude_name("include"), Vec::new());
        doc.set_attr(include, "href", "signatures/a.xhtml");
        doc.append(body, include);
        let out = serialize_document(&doc);
        assert!(out.contains(&format!("xmlns:xi=\"{XINCLUDE_NS}\"")));
        assert!(out.contains("<xi:include href=\"signatures/a.xhtml\"></xi:include>"));
    }

    #[test]
    fn test_void_elements_self_close() {
        let mut doc = Document::new();
        let img = doc.create_element("img");
        doc.set_attr(img, "src", "a.png");
        assert_eq!(serialize_node(&doc, img), "<img src=\"a.png\"/>");
    }
}

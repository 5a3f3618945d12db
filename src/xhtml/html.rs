//! Lenient HTML parsing for raw exporter output.
//!
//! Exporters (pandoc, emacs) emit HTML that is not always well-formed XML, so
//! their output goes through html5ever with a [`TreeSink`] that writes into the
//! arena [`Document`]. Everything downstream of normalization is strict XHTML
//! and uses [`super::xml`] instead.

use std::borrow::Cow;
use std::cell::RefCell;

use html5ever::driver::ParseOpts;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as Html5Attribute, QualName, parse_document};

use super::dom::{Attribute, Document, NodeData, NodeId};

/// Parse an HTML string into a [`Document`]. Never fails; parse errors are
/// recovered the way browsers recover them.
pub fn parse_html(html: &str) -> Document {
    let sink = DocumentSink::default();
    parse_document(sink, ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes())
        .into_document()
}

#[derive(Default)]
struct DocumentSink {
    doc: RefCell<Document>,
    errors: RefCell<usize>,
}

impl DocumentSink {
    fn into_document(self) -> Document {
        let errors = self.errors.into_inner();
        if errors > 0 {
            tracing::trace!("Recovered from {} HTML parse errors", errors);
        }
        self.doc.into_inner()
    }

    fn insert(&self, parent: NodeId, child: NodeOrText<NodeId>) {
        let mut doc = self.doc.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => doc.append(parent, node),
            NodeOrText::AppendText(text) => doc.append_text(parent, &text),
        }
    }
}

impl TreeSink for DocumentSink {
    type Handle = NodeId;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {
        *self.errors.borrow_mut() += 1;
    }

    fn get_document(&self) -> Self::Handle {
        self.doc.borrow().root()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };

        let doc = self.doc.borrow();
        match doc.get(*target).map(|n| &n.data) {
            Some(NodeData::Element { name, .. }) => {
                // SAFETY: element names are never mutated or dropped while the
                // parser runs, and html5ever only holds the reference for the
                // duration of a single tree-builder step.
                unsafe { std::mem::transmute::<&QualName, &'a QualName>(name) }
            }
            _ => &EMPTY,
        }
    }

    fn create_element(&self, name: QualName, attrs: Vec<Html5Attribute>, _flags: ElementFlags) -> Self::Handle {
        let attrs = attrs
            .into_iter()
            .map(|a| Attribute {
                name: a.name,
                value: a.value.to_string(),
            })
            .collect();
        self.doc.borrow_mut().create_element_qualified(name, attrs)
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.doc.borrow_mut().create_comment(text.to_string())
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.doc.borrow_mut().create_comment(String::new())
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        self.insert(*parent, child);
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.doc.borrow().parent(*element);
        match parent {
            Some(parent) => self.insert(parent, child),
            None => self.insert(*prev_element, child),
        }
    }

    fn append_doctype_to_document(&self, name: StrTendril, _public_id: StrTendril, _system_id: StrTendril) {
        let mut doc = self.doc.borrow_mut();
        let root = doc.root();
        let doctype = doc.create_doctype(&name);
        doc.append(root, doctype);
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x == y
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut doc = self.doc.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => doc.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => {
                let text_node = doc.create_text(text.to_string());
                doc.insert_before(*sibling, text_node);
            }
        }
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Html5Attribute>) {
        let mut doc = self.doc.borrow_mut();
        if let Some(node) = doc.get_mut(*target)
            && let NodeData::Element { attrs: existing, .. } = &mut node.data
        {
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(Attribute {
                        name: attr.name,
                        value: attr.value.to_string(),
                    });
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        self.doc.borrow_mut().detach(*target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.doc.borrow_mut().move_children(*node, *new_parent);
    }
}

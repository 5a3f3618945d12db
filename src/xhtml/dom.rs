//! Arena-allocated document tree shared by every pipeline stage.
//!
//! Nodes live in one contiguous vector and link to each other by index, so a
//! whole document can be cloned cheaply (fascicle splitting clones the master
//! shell once per signature) and nodes can be moved around without fighting
//! the borrow checker. Detached nodes stay in the arena; they are simply no
//! longer reachable from the document root.

use html5ever::{LocalName, Namespace, Prefix, QualName, ns};

/// Namespace of XInclude elements (`xi:include`, `xi:fallback`).
pub const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";

/// Namespace of XHTML elements.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element {
        name: QualName,
        attrs: Vec<Attribute>,
    },
    Text(String),
    Comment(String),
    Doctype {
        name: String,
    },
}

/// Element attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Build a qualified name for an XHTML element.
pub fn html_name(local: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(local))
}

/// Build a qualified name for an XInclude element.
pub fn xinclude_name(local: &str) -> QualName {
    QualName::new(
        Some(Prefix::from("xi")),
        Namespace::from(XINCLUDE_NS),
        LocalName::from(local),
    )
}

/// Build an attribute name, splitting an optional `prefix:` off the front.
pub fn attr_name(name: &str) -> QualName {
    match name.split_once(':') {
        Some(("xml", local)) => QualName::new(Some(Prefix::from("xml")), ns!(xml), LocalName::from(local)),
        Some((prefix, local)) => {
            QualName::new(Some(Prefix::from(prefix)), ns!(), LocalName::from(local))
        }
        None => QualName::new(None, ns!(), LocalName::from(name)),
    }
}

/// Render a qualified name the way it appears in markup.
pub fn qualified(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

/// Arena-backed document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
        };
        doc.root = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    /// Create a minimal `<html><head><title/></head><body/></html>` shell.
    pub fn xhtml_shell(title: &str) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        let doctype = doc.create_doctype("html");
        doc.append(root, doctype);
        let html = doc.create_element("html");
        doc.set_attr(html, "xmlns", XHTML_NS);
        doc.append(root, html);
        let head = doc.create_element("head");
        doc.append(html, head);
        let title_elt = doc.create_element("title");
        doc.append(head, title_elt);
        doc.set_text(title_elt, title);
        let body = doc.create_element("body");
        doc.append(html, body);
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn create_element(&mut self, local: &str) -> NodeId {
        self.create_element_qualified(html_name(local), Vec::new())
    }

    pub fn create_element_qualified(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(Node::new(NodeData::Element { name, attrs }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text.into())))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text.into())))
    }

    pub fn create_doctype(&mut self, name: &str) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype {
            name: name.to_string(),
        }))
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(node) = self.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = last_child;
        }
        if let Some(last) = self.get_mut(last_child) {
            last.next_sibling = child;
        }
        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert `new_node` immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        self.detach(new_node);
        let (parent, prev) = match self.get(sibling) {
            Some(n) => (n.parent, n.prev_sibling),
            None => return,
        };

        if let Some(node) = self.get_mut(new_node) {
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = sibling;
        }
        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }
        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Append text, merging into a trailing text node when there is one.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);
        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(existing) = &mut last.data
        {
            existing.push_str(text);
            return;
        }
        let node = self.create_text(text);
        self.append(parent, node);
    }

    /// Unlink a node from its parent and siblings. The subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.get(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent)
            && p.first_child == id
        {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent)
            && p.last_child == id
        {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Put `replacement` where `old` was and detach `old`.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        self.insert_before(old, replacement);
        self.detach(old);
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children: Vec<_> = self.children(id).collect();
        for child in children {
            self.detach(child);
        }
    }

    /// Move every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) {
        let children: Vec<_> = self.children(from).collect();
        for child in children {
            self.append(to, child);
        }
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        let node = self.create_text(text);
        self.append(id, node);
    }

    pub fn children(&self, parent: NodeId) -> Children<'_> {
        let first = self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        Children {
            doc: self,
            current: first,
        }
    }

    pub fn element_children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&c| self.is_element(c))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(NodeId::is_some)
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut kids: Vec<NodeId> = self.children(current).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Elements below `root` satisfying `predicate`, in document order.
    pub fn find_all<F>(&self, root: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Self, NodeId) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.is_element(id) && predicate(self, id))
            .collect()
    }

    pub fn find_first<F>(&self, root: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Self, NodeId) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .find(|&id| self.is_element(id) && predicate(self, id))
    }

    /// Elements named `local` anywhere in the document.
    pub fn elements_named(&self, local: &str) -> Vec<NodeId> {
        self.find_all(self.root, |doc, id| doc.is_named(id, local))
    }

    pub fn first_named(&self, local: &str) -> Option<NodeId> {
        self.find_first(self.root, |doc, id| doc.is_named(id, local))
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root).next()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.first_named("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.first_named("body")
    }

    pub fn title_element(&self) -> Option<NodeId> {
        self.head().and_then(|head| self.find_first(head, |doc, id| doc.is_named(id, "title")))
    }

    /// Set the `<title>` text, creating the element when missing.
    pub fn set_title(&mut self, title: &str) {
        if let Some(title_elt) = self.title_element() {
            self.set_text(title_elt, title);
        } else if let Some(head) = self.head() {
            let title_elt = self.create_element("title");
            self.append(head, title_elt);
            self.set_text(title_elt, title);
        }
    }

    pub fn qual_name(&self, id: NodeId) -> Option<&QualName> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        })
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.qual_name(id).map(|n| n.local.as_ref())
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    pub fn is_named(&self, id: NodeId, local: &str) -> bool {
        self.qual_name(id)
            .is_some_and(|n| n.local.as_ref() == local && n.ns.as_ref() != XINCLUDE_NS && n.prefix.is_none())
    }

    /// True for `xi:<local>` elements, matched by namespace or by the `xi` prefix.
    pub fn is_xinclude(&self, id: NodeId, local: &str) -> bool {
        self.qual_name(id).is_some_and(|n| {
            n.local.as_ref() == local
                && (n.ns.as_ref() == XINCLUDE_NS || n.prefix.as_ref().is_some_and(|p| p.as_ref() == "xi"))
        })
    }

    pub fn is_heading(&self, id: NodeId) -> bool {
        self.qual_name(id).is_some_and(|n| {
            n.prefix.is_none() && matches!(n.local.as_ref(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
        })
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        match self.get(id).map(|n| &n.data) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn get_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| qualified(&a.name) == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(node) = self.get_mut(id)
            && let NodeData::Element { attrs, .. } = &mut node.data
        {
            if let Some(existing) = attrs.iter_mut().find(|a| qualified(&a.name) == name) {
                existing.value = value;
            } else {
                attrs.push(Attribute {
                    name: attr_name(name),
                    value,
                });
            }
        }
    }

    pub fn set_local_name(&mut self, id: NodeId, local: &str) {
        if let Some(node) = self.get_mut(id)
            && let NodeData::Element { name, .. } = &mut node.data
        {
            name.local = LocalName::from(local);
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.get_attr(id, "class").map(|c| c.split_whitespace().collect()).unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).contains(&class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let value = match self.get_attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", value);
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(Node {
            data: NodeData::Text(text),
            ..
        }) = self.get(id)
        {
            out.push_str(text);
            return out;
        }
        for node in self.descendants(id) {
            if let Some(Node {
                data: NodeData::Text(text),
                ..
            }) = self.get(node)
            {
                out.push_str(text);
            }
        }
        out
    }

    /// Deep-copy `node` from `source` into this arena. The copy is detached.
    pub fn import(&mut self, source: &Document, node: NodeId) -> NodeId {
        let data = match source.get(node) {
            Some(n) => n.data.clone(),
            None => return NodeId::NONE,
        };
        let copy = self.alloc(Node::new(data));
        let children: Vec<_> = source.children(node).collect();
        for child in children {
            let child_copy = self.import(source, child);
            self.append(copy, child_copy);
        }
        copy
    }
}

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.doc.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_has_title_and_body() {
        let doc = Document::xhtml_shell("Hello");
        let title = doc.title_element().unwrap();
        assert_eq!(doc.text_content(title), "Hello");
        assert!(doc.body().is_some());
    }

    #[test]
    fn test_append_and_detach() {
        let mut doc = Document::new();
        let parent = doc.create_element("div");
        let a = doc.create_element("p");
        let b = doc.create_element("p");
        let root = doc.root();
        doc.append(root, parent);
        doc.append(parent, a);
        doc.append(parent, b);
        assert_eq!(doc.children(parent).collect::<Vec<_>>(), vec![a, b]);

        doc.detach(a);
        assert_eq!(doc.children(parent).collect::<Vec<_>>(), vec![b]);
        assert!(doc.parent(a).is_none());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut doc = Document::new();
        let parent = doc.create_element("div");
        let a = doc.create_element("p");
        let b = doc.create_element("pre");
        let c = doc.create_element("p");
        doc.append(parent, a);
        doc.append(parent, b);
        doc.append(parent, c);

        let replacement = doc.create_element("span");
        doc.replace(b, replacement);
        assert_eq!(doc.children(parent).collect::<Vec<_>>(), vec![a, replacement, c]);
    }

    #[test]
    fn test_class_helpers() {
        let mut doc = Document::new();
        let pre = doc.create_element("pre");
        doc.set_attr(pre, "class", "ruby");
        doc.add_class(pre, "sourceCode");
        doc.add_class(pre, "sourceCode");
        assert_eq!(doc.classes(pre), vec!["ruby", "sourceCode"]);
    }

    #[test]
    fn test_text_merging_and_content() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append_text(p, "Hello, ");
        doc.append_text(p, "World!");
        assert_eq!(doc.children(p).count(), 1);
        assert_eq!(doc.text_content(p), "Hello, World!");
    }

    #[test]
    fn test_import_is_deep() {
        let mut source = Document::new();
        let div = source.create_element("div");
        let p = source.create_element("p");
        source.append(div, p);
        source.append_text(p, "text");

        let mut target = Document::new();
        let copy = target.import(&source, div);
        assert_eq!(target.local_name(copy), Some("div"));
        assert_eq!(target.text_content(copy), "text");
    }
}

//! Codex renumbering.
//!
//! Runs over the flattened spine in three passes:
//!
//! 1. signatures get `data-signature-number` and the id `signature-<n>`
//! 2. toplevel elements (the outermost descendants of a signature carrying
//!    a taxonomy class) get `signature-<n>-<type>-<index>` ids plus title
//!    and name metadata
//! 3. headings inside toplevel elements get `<toplevel-id>-heading-<k>`
//!
//! Every id replaced along the way is remembered, and `href="#old"` links
//! are rewritten to the new id. Links are resolved against the renames of
//! their own signature first, then against the whole book.

use std::collections::HashMap;

use super::normalize::{collapse_whitespace, first_heading_text};
use crate::config::BuildConfig;
use crate::utils::slugify;
use crate::xhtml::{Document, NodeId};

/// What a renumbering pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenumberStats {
    pub signatures: usize,
    pub toplevels: usize,
    pub headings: usize,
    pub links: usize,
}

/// Signature elements of a document in document order.
pub fn signature_elements(doc: &Document) -> Vec<NodeId> {
    let scope = doc.body().unwrap_or(doc.root());
    doc.find_all(scope, |d, id| d.is_named(id, "div") && d.has_class(id, "signature"))
}

/// Renumber signatures, toplevel elements and headings, then fix links.
pub fn renumber(doc: &mut Document, config: &BuildConfig) -> RenumberStats {
    let taxonomy = config.toplevel_classes();
    let mut stats = RenumberStats::default();
    let mut global: HashMap<String, String> = HashMap::new();
    let mut local: Vec<(NodeId, HashMap<String, String>)> = Vec::new();

    for (index, signature) in signature_elements(doc).into_iter().enumerate() {
        let number = index + 1;
        stats.signatures += 1;
        let mut renames: HashMap<String, String> = HashMap::new();

        let signature_id = format!("signature-{number}");
        doc.set_attr(signature, "data-signature-number", number.to_string());
        rename_id(doc, signature, &signature_id, &mut renames);

        let mut counters: HashMap<String, usize> = HashMap::new();
        for toplevel in toplevel_elements(doc, signature, &taxonomy) {
            let Some(kind) = toplevel_type(doc, toplevel, &taxonomy) else {
                continue;
            };
            let counter = counters.entry(kind.clone()).or_insert(0);
            *counter += 1;
            let toplevel_id = format!("{signature_id}-{kind}-{counter}");

            let title = element_title(doc, toplevel, &kind);
            doc.add_class(toplevel, "toplevel");
            doc.set_attr(toplevel, "data-toplevel-type", kind.as_str());
            doc.set_attr(toplevel, "data-toplevel-number", counter.to_string());
            doc.set_attr(toplevel, "data-name", slugify(&title));
            doc.set_attr(toplevel, "data-title", title);
            rename_id(doc, toplevel, &toplevel_id, &mut renames);
            stats.toplevels += 1;

            let headings = doc.find_all(toplevel, |d, id| d.is_heading(id));
            for (k, heading) in headings.into_iter().enumerate() {
                rename_id(doc, heading, &format!("{toplevel_id}-heading-{}", k + 1), &mut renames);
                stats.headings += 1;
            }
        }

        for (old, new) in &renames {
            global.entry(old.clone()).or_insert_with(|| new.clone());
        }
        local.push((signature, renames));
    }

    let anchors = doc.find_all(doc.root(), |d, id| d.is_named(id, "a"));
    for anchor in anchors {
        let Some(fragment) = doc.get_attr(anchor, "href").and_then(|h| h.strip_prefix('#')) else {
            continue;
        };
        let signature = enclosing_signature(doc, anchor);
        let renamed = local
            .iter()
            .find(|(sig, _)| Some(*sig) == signature)
            .and_then(|(_, renames)| renames.get(fragment))
            .or_else(|| global.get(fragment))
            .cloned();
        if let Some(new_id) = renamed {
            doc.set_attr(anchor, "href", format!("#{new_id}"));
            stats.links += 1;
        }
    }

    stats
}

fn rename_id(doc: &mut Document, node: NodeId, new_id: &str, renames: &mut HashMap<String, String>) {
    if let Some(old) = doc.get_attr(node, "id").map(str::to_string)
        && old != new_id
    {
        renames.entry(old).or_insert_with(|| new_id.to_string());
    }
    doc.set_attr(node, "id", new_id);
}

/// Outermost descendants of `signature` carrying a taxonomy class.
fn toplevel_elements(doc: &Document, signature: NodeId, taxonomy: &[String]) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = doc.element_children(signature).collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        if toplevel_type(doc, node, taxonomy).is_some() {
            found.push(node);
            continue;
        }
        let mut children: Vec<NodeId> = doc.element_children(node).collect();
        children.reverse();
        stack.extend(children);
    }
    found
}

fn toplevel_type(doc: &Document, node: NodeId, taxonomy: &[String]) -> Option<String> {
    doc.classes(node).into_iter().find(|c| taxonomy.iter().any(|t| t == c)).map(str::to_string)
}

/// `data-title`, else the first heading, else `Untitled <Type>`.
fn element_title(doc: &Document, node: NodeId, kind: &str) -> String {
    doc.get_attr(node, "data-title")
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .or_else(|| first_heading_text(doc, node))
        .unwrap_or_else(|| format!("Untitled {}", capitalize(kind)))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn enclosing_signature(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = doc.parent(node);
    while let Some(parent) = current {
        if doc.is_named(parent, "div") && doc.has_class(parent, "signature") {
            return Some(parent);
        }
        current = doc.parent(parent);
    }
    None
}

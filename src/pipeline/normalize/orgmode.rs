use anyhow::Result;
use std::collections::BTreeSet;

use super::Normalizer;
use crate::config::BuildConfig;
use crate::xhtml::{Document, NodeId};

const OUTLINE_SECTIONS: [(&str, &str); 4] = [
    ("outline-2", "chapter"),
    ("outline-3", "section"),
    ("outline-4", "subsection"),
    ("outline-5", "subsubsection"),
];

/// Reshapes Org-mode's HTML export into the structure the rest of the
/// pipeline expects: sectioning elements, `figure`s and marked listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgModeNormalizer;

impl Normalizer for OrgModeNormalizer {
    fn normalize(&self, doc: &mut Document, config: &BuildConfig) -> Result<()> {
        convert_listings(doc, &config.code_marker_class);
        convert_figures(doc);
        convert_outlines(doc);
        promote_chapter_headings(doc);
        Ok(())
    }
}

fn convert_listings(doc: &mut Document, marker: &str) {
    let containers = doc.find_all(doc.root(), |d, id| d.is_named(id, "div") && d.has_class(id, "org-src-container"));
    for container in containers {
        let Some(src) = doc.element_children(container).find(|&c| doc.is_named(c, "pre") && doc.has_class(c, "src"))
        else {
            continue;
        };
        let language = doc
            .classes(src)
            .iter()
            .find_map(|c| c.strip_prefix("src-"))
            .map(str::to_string);
        let text = doc.text_content(src);

        let pre = doc.create_element("pre");
        if let Some(language) = language {
            doc.set_attr(pre, "class", format!("{marker} {language}"));
        }
        let code = doc.create_element("code");
        doc.append(pre, code);
        doc.set_text(code, &text);
        doc.replace(container, pre);
    }
}

fn convert_figures(doc: &mut Document) {
    let figures = doc.find_all(doc.root(), |d, id| d.is_named(id, "div") && d.has_class(id, "figure"));
    for div in figures {
        let paragraphs: Vec<NodeId> = doc.element_children(div).filter(|&c| doc.is_named(c, "p")).collect();
        let figure = doc.create_element("figure");
        if let Some(id) = doc.get_attr(div, "id").map(str::to_string) {
            doc.set_attr(figure, "id", id);
        }

        if let Some(&first) = paragraphs.first() {
            let images: Vec<NodeId> = doc.find_all(first, |d, id| d.is_named(id, "img"));
            for image in images {
                doc.append(figure, image);
            }
        }
        if let Some(&second) = paragraphs.get(1) {
            let caption = doc.create_element("figcaption");
            doc.move_children(second, caption);
            doc.append(figure, caption);
        }
        doc.replace(div, figure);
    }
}

fn convert_outlines(doc: &mut Document) {
    for (outline, class) in OUTLINE_SECTIONS {
        let divs = doc.find_all(doc.root(), |d, id| d.is_named(id, "div") && d.has_class(id, outline));
        for div in divs {
            doc.set_local_name(div, "section");
            doc.set_attr(div, "class", class);
        }
    }
}

fn promote_chapter_headings(doc: &mut Document) {
    let chapters = doc.find_all(doc.root(), |d, id| d.is_named(id, "section") && d.has_class(id, "chapter"));
    let headings: BTreeSet<NodeId> = chapters
        .iter()
        .flat_map(|&chapter| doc.find_all(chapter, |d, id| d.is_heading(id)))
        .collect();

    for heading in headings {
        let level = doc
            .local_name(heading)
            .and_then(|name| name[1..].parse::<u8>().ok())
            .unwrap_or(1);
        if level > 1 {
            doc.set_local_name(heading, &format!("h{}", level - 1));
        }
    }
}

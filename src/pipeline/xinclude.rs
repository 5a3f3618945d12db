//! In-process XInclude resolution.
//!
//! Supports the subset of XInclude the pipeline emits: `xi:include` with an
//! `href` relative to the including document, optional `parse="text"`, and
//! an `xi:fallback` whose children replace the include when the target is
//! missing or unreadable. For XML targets the children of the target's
//! `<body>` are included (the document element when there is no body).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::collaborators::XIncludeProcessor;
use crate::core::QuireError;
use crate::utils::fs::normalize_path;
use crate::xhtml::{Document, NodeId, parse_html, parse_xhtml, read_xhtml, write_xhtml};

/// Counts of what one resolution pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncludeStats {
    pub resolved: usize,
    pub fallbacks: usize,
}

/// The default [`XIncludeProcessor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct XIncludeResolver;

impl XIncludeProcessor for XIncludeResolver {
    fn flatten(&self, input: &Path, output: &Path) -> Result<()> {
        let mut doc = read_xhtml(input)?;
        let base = input.parent().unwrap_or_else(|| Path::new("."));
        let stats = resolve_includes(&mut doc, base)?;
        debug!(
            "Flattened {}: {} included, {} fallbacks",
            input.display(),
            stats.resolved,
            stats.fallbacks
        );
        write_xhtml(output, &doc)
    }
}

/// Replace every `xi:include` in `doc`, resolving hrefs against `base_dir`.
pub fn resolve_includes(doc: &mut Document, base_dir: &Path) -> Result<IncludeStats> {
    let mut stats = IncludeStats::default();
    let mut stack = Vec::new();
    resolve_in(doc, base_dir, &mut stack, &mut stats)?;
    Ok(stats)
}

fn resolve_in(doc: &mut Document, base_dir: &Path, stack: &mut Vec<PathBuf>, stats: &mut IncludeStats) -> Result<()> {
    let includes = doc.find_all(doc.root(), |d, id| d.is_xinclude(id, "include"));
    for include in includes {
        if !is_attached(doc, include) {
            continue;
        }
        let Some(href) = doc.get_attr(include, "href").map(str::to_string) else {
            return Err(QuireError::InvalidDocument {
                path: base_dir.display().to_string(),
                reason: "xi:include without href".to_string(),
            }
            .into());
        };
        let target = normalize_path(&base_dir.join(&href));
        let as_text = doc.get_attr(include, "parse") == Some("text");

        match load_target(&target, as_text, stack, stats) {
            Ok(Some(Included::Text(text))) => {
                let node = doc.create_text(text);
                doc.replace(include, node);
                stats.resolved += 1;
            }
            Ok(Some(Included::Nodes(source, nodes))) => {
                for node in nodes {
                    let copy = doc.import(&source, node);
                    doc.insert_before(include, copy);
                }
                doc.detach(include);
                stats.resolved += 1;
            }
            Ok(None) => apply_fallback(doc, include, &target, None, stats)?,
            Err(e) if is_cycle(&e) => return Err(e),
            Err(e) => apply_fallback(doc, include, &target, Some(e), stats)?,
        }
    }
    Ok(())
}

enum Included {
    Text(String),
    Nodes(Document, Vec<NodeId>),
}

fn load_target(
    target: &Path,
    as_text: bool,
    stack: &mut Vec<PathBuf>,
    stats: &mut IncludeStats,
) -> Result<Option<Included>> {
    if !target.is_file() {
        return Ok(None);
    }
    if stack.iter().any(|p| p == target) {
        let mut chain: Vec<String> = stack.iter().map(|p| p.display().to_string()).collect();
        chain.push(target.display().to_string());
        return Err(QuireError::Cycle {
            chain: chain.join(" → "),
        }
        .into());
    }

    let text = std::fs::read_to_string(target).with_context(|| format!("Failed to read {}", target.display()))?;
    if as_text {
        return Ok(Some(Included::Text(text)));
    }

    let is_xml = target.extension().is_some_and(|e| e == "xhtml" || e == "xml");
    let mut source = if is_xml {
        parse_xhtml(&text, &target.display().to_string())?
    } else {
        parse_html(&text)
    };

    stack.push(target.to_path_buf());
    let nested = resolve_in(&mut source, target.parent().unwrap_or_else(|| Path::new(".")), stack, stats);
    stack.pop();
    nested?;

    let container = source.body().or_else(|| source.document_element());
    let nodes = match container {
        Some(body) if source.body().is_some() => source.children(body).collect(),
        Some(element) => vec![element],
        None => Vec::new(),
    };
    Ok(Some(Included::Nodes(source, nodes)))
}

fn apply_fallback(
    doc: &mut Document,
    include: NodeId,
    target: &Path,
    cause: Option<anyhow::Error>,
    stats: &mut IncludeStats,
) -> Result<()> {
    let fallback = doc.element_children(include).find(|&c| doc.is_xinclude(c, "fallback"));
    let Some(fallback) = fallback else {
        return Err(match cause {
            Some(e) => e.context(format!("Failed to include {}", target.display())),
            None => QuireError::MissingSource {
                target: target.display().to_string(),
            }
            .into(),
        });
    };

    if let Some(e) = cause {
        warn!("Using fallback for {}: {:#}", target.display(), e);
    } else {
        debug!("Using fallback for missing {}", target.display());
    }
    let children: Vec<NodeId> = doc.children(fallback).collect();
    for child in children {
        doc.insert_before(include, child);
    }
    doc.detach(include);
    stats.fallbacks += 1;
    Ok(())
}

fn is_attached(doc: &Document, node: NodeId) -> bool {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        current = parent;
    }
    current == doc.root()
}

fn is_cycle(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<QuireError>(), Some(QuireError::Cycle { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhtml::serialize_document;
    use tempfile::TempDir;

    const SPINE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xi="http://www.w3.org/2001/XInclude">
  <head><title>Book</title></head>
  <body>
    <xi:include href="signatures/a.xhtml"><xi:fallback><p>[Missing section: a]</p></xi:fallback></xi:include>
    <xi:include href="signatures/b.xhtml"><xi:fallback><p>[Missing section: b]</p></xi:fallback></xi:include>
  </body>
</html>
"#;

    const SIGNATURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>A</title></head>
<body><div class="signature" data-signature-name="a"><p>Alpha</p></div></body></html>
"#;

    #[test]
    fn test_present_target_replaces_include_and_missing_uses_fallback() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("signatures")).unwrap();
        std::fs::write(temp.path().join("signatures/a.xhtml"), SIGNATURE).unwrap();
        std::fs::write(temp.path().join("spine.xhtml"), SPINE).unwrap();

        XIncludeResolver.flatten(&temp.path().join("spine.xhtml"), &temp.path().join("codex.xhtml")).unwrap();
        let codex = std::fs::read_to_string(temp.path().join("codex.xhtml")).unwrap();
        assert!(codex.contains("data-signature-name=\"a\""));
        assert!(codex.contains("[Missing section: b]"));
        assert!(!codex.contains("[Missing section: a]"));
        assert!(!codex.contains("xi:include"));
        assert!(!codex.contains("xi:fallback"));
    }

    #[test]
    fn test_html_targets_contribute_body_children() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("listing.html"),
            "<div class=\"highlight\"><pre><span class=\"k\">puts</span> 1</pre></div>",
        )
        .unwrap();
        let mut doc = parse_xhtml(
            r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xi="http://www.w3.org/2001/XInclude"><body><div class="listing"><xi:include href="listing.html"/></div></body></html>"#,
            "test",
        )
        .unwrap();

        let stats = resolve_includes(&mut doc, temp.path()).unwrap();
        assert_eq!(stats, IncludeStats { resolved: 1, fallbacks: 0 });
        let out = serialize_document(&doc);
        assert!(out.contains("<div class=\"listing\">"));
        assert!(out.contains("<span class=\"k\">puts</span> 1"));
    }

    #[test]
    fn test_missing_target_without_fallback_is_error() {
        let temp = TempDir::new().unwrap();
        let mut doc = parse_xhtml(
            r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xi="http://www.w3.org/2001/XInclude"><body><xi:include href="nope.xhtml"/></body></html>"#,
            "test",
        )
        .unwrap();
        let err = resolve_includes(&mut doc, temp.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<QuireError>(), Some(QuireError::MissingSource { .. })));
    }

    #[test]
    fn test_text_includes_and_include_cycles() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("note.txt"), "a < b").unwrap();
        let xi = r#"xmlns="http://www.w3.org/1999/xhtml" xmlns:xi="http://www.w3.org/2001/XInclude""#;
        let mut doc = parse_xhtml(
            &format!(r#"<html {xi}><body><p><xi:include href="note.txt" parse="text"/></p></body></html>"#),
            "test",
        )
        .unwrap();
        resolve_includes(&mut doc, temp.path()).unwrap();
        assert!(serialize_document(&doc).contains("<p>a &lt; b</p>"));

        std::fs::write(
            temp.path().join("loop.xhtml"),
            format!(r#"<html {xi}><body><xi:include href="loop.xhtml"/></body></html>"#),
        )
        .unwrap();
        let mut doc = parse_xhtml(
            &format!(r#"<html {xi}><body><xi:include href="loop.xhtml"><xi:fallback/></xi:include></body></html>"#),
            "test",
        )
        .unwrap();
        let err = resolve_includes(&mut doc, temp.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<QuireError>(), Some(QuireError::Cycle { .. })));
    }
}

//! Fascicle splitting.
//!
//! One fascicle per signature element directly under the master's body,
//! written to `<build>/fascicles/<NNN>-<name>.xhtml`. Each fascicle keeps
//! the master's head, so stylesheet links and metadata carry over; local
//! references are re-pointed at the master asset tree.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::utils::fs::{atomic_write, ensure_dir, read_text_file};
use crate::utils::slugify;
use crate::xhtml::{Document, NodeId, read_xhtml, write_xhtml};

/// Prefix from a fascicle back to the master directory.
const MASTER_PREFIX: &str = "../master/";

/// One fascicle on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fascicle {
    pub path: PathBuf,
    pub title: String,
    /// Signature name the fascicle was cut from.
    pub name: String,
    /// 1-based position in the book.
    pub number: usize,
    /// File stem, e.g. `001-introduction`.
    pub numbered_name: String,
}

/// Signature elements directly under the body, in order.
fn signature_boundaries(doc: &Document) -> Vec<NodeId> {
    let Some(body) = doc.body() else {
        return Vec::new();
    };
    doc.element_children(body)
        .filter(|&c| doc.is_named(c, "div") && doc.has_class(c, "signature"))
        .collect()
}

/// Split the master into fascicles and write the manifest.
///
/// Fascicle files left over from an earlier split that no longer correspond
/// to a signature are removed.
pub fn split_fascicles(config: &BuildConfig) -> Result<Vec<Fascicle>> {
    let master = read_xhtml(&config.master_path())?;
    let dir = config.fascicles_dir();
    ensure_dir(&dir)?;

    let mut fascicles = Vec::new();
    for (index, signature) in signature_boundaries(&master).into_iter().enumerate() {
        let number = index + 1;
        let name = master.get_attr(signature, "data-signature-name").unwrap_or("signature").to_string();
        let title = master
            .get_attr(signature, "data-signature-title")
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());
        let numbered_name = format!("{number:03}-{}", slugify(&name));
        let path = dir.join(format!("{numbered_name}.xhtml"));

        let mut fascicle = master.clone();
        if let Some(body) = fascicle.body() {
            fascicle.clear_children(body);
            fascicle.append(body, signature);
        }
        fascicle.set_title(&title);
        repoint_references(&mut fascicle);
        write_xhtml(&path, &fascicle)?;
        debug!("Wrote fascicle {}", config.display_path(&path));

        fascicles.push(Fascicle {
            path,
            title,
            name,
            number,
            numbered_name,
        });
    }

    remove_stale(&dir, &fascicles)?;

    let manifest: String =
        fascicles.iter().map(|f| format!("{}\n", config.display_path(&f.path))).collect();
    atomic_write(&config.fascicle_manifest(), manifest.as_bytes())?;
    info!("Split master into {} fascicles", fascicles.len());
    Ok(fascicles)
}

fn repoint_references(doc: &mut Document) {
    let referencing = doc.find_all(doc.root(), |d, id| {
        d.get_attr(id, "src").is_some() || (d.is_named(id, "link") && d.get_attr(id, "href").is_some())
    });
    for element in referencing {
        for attr in ["src", "href"] {
            let Some(value) = doc.get_attr(element, attr) else {
                continue;
            };
            if is_relative_path(value) {
                let repointed = format!("{MASTER_PREFIX}{value}");
                doc.set_attr(element, attr, repointed);
            }
        }
    }
}

/// A path below the master directory. Values that already climb out of it
/// resolve the same from the sibling fascicles directory and are left alone.
fn is_relative_path(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with(['#', '/'])
        && !value.starts_with("..")
        && !value.split_once(':').is_some_and(|(scheme, _)| !scheme.contains('/'))
}

fn remove_stale(dir: &Path, keep: &[Fascicle]) -> Result<()> {
    let keep: HashSet<&Path> = keep.iter().map(|f| f.path.as_path()).collect();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "xhtml") && !keep.contains(path.as_path()) {
            debug!("Removing stale fascicle {}", path.display());
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Fascicles listed in the manifest, in book order.
pub fn read_fascicles(config: &BuildConfig) -> Result<Vec<Fascicle>> {
    let manifest = read_text_file(&config.fascicle_manifest())?;
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            let path = config.resolve(line.trim());
            let doc = read_xhtml(&path)?;
            let signature = signature_boundaries(&doc).into_iter().next();
            let name = signature
                .and_then(|s| doc.get_attr(s, "data-signature-name"))
                .unwrap_or_default()
                .to_string();
            let title = doc.title_element().map(|t| doc.text_content(t)).unwrap_or_default();
            let numbered_name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            Ok(Fascicle {
                path,
                title,
                name,
                number: index + 1,
                numbered_name,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn master(signatures: &[(&str, &str)]) -> String {
        let body: String = signatures
            .iter()
            .map(|(name, title)| {
                format!(
                    r##"<div class="signature" data-signature-name="{name}" data-signature-title="{title}"><section class="chapter"><h1>{title}</h1><img src="images/{name}.png"/><a href="#top">top</a></section></div>"##
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Book</title><link rel="stylesheet" type="text/css" href="styles/book.css"/></head><body>{body}</body></html>"#
        )
    }

    fn project(signatures: &[(&str, &str)]) -> (TempDir, BuildConfig) {
        let temp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(temp.path()).unwrap();
        std::fs::create_dir_all(config.master_dir()).unwrap();
        std::fs::write(config.master_path(), master(signatures)).unwrap();
        (temp, config)
    }

    #[test]
    fn test_one_fascicle_per_signature_with_manifest() {
        let (_temp, config) = project(&[("intro", "Introduction"), ("ch1", "Getting Started"), ("ch2", "Going Further")]);
        let fascicles = split_fascicles(&config).unwrap();

        let names: Vec<_> = fascicles.iter().map(|f| f.numbered_name.as_str()).collect();
        assert_eq!(names, vec!["001-intro", "002-ch1", "003-ch2"]);

        let manifest = std::fs::read_to_string(config.fascicle_manifest()).unwrap();
        assert_eq!(
            manifest,
            "build/fascicles/001-intro.xhtml\nbuild/fascicles/002-ch1.xhtml\nbuild/fascicles/003-ch2.xhtml\n"
        );

        let second = read_xhtml(&fascicles[1].path).unwrap();
        assert_eq!(second.text_content(second.title_element().unwrap()), "Getting Started");
        assert_eq!(signature_boundaries(&second).len(), 1);
        let img = second.first_named("img").unwrap();
        assert_eq!(second.get_attr(img, "src"), Some("../master/images/ch1.png"));
        let link = second.first_named("link").unwrap();
        assert_eq!(second.get_attr(link, "href"), Some("../master/styles/book.css"));
        let anchor = second.first_named("a").unwrap();
        assert_eq!(second.get_attr(anchor, "href"), Some("#top"));
    }

    #[test]
    fn test_repoint_leaves_escaping_and_absolute_references() {
        let mut doc = Document::xhtml_shell("Refs");
        let body = doc.body().unwrap();
        let values = [
            "images/a.png",
            "../../shared/x.png",
            "../cover.png",
            "/abs.png",
            "http://example.com/b.png",
            "data:image/png;base64,AA",
        ];
        for value in values {
            let img = doc.create_element("img");
            doc.set_attr(img, "src", value);
            doc.append(body, img);
        }

        repoint_references(&mut doc);

        let srcs: Vec<_> = doc
            .find_all(doc.root(), |d, id| d.is_named(id, "img"))
            .into_iter()
            .map(|img| doc.get_attr(img, "src").unwrap_or_default().to_string())
            .collect();
        let mut expected = values.map(str::to_string).to_vec();
        expected[0] = "../master/images/a.png".to_string();
        assert_eq!(srcs, expected);
    }

    #[test]
    fn test_resplit_removes_stale_fascicles() {
        let (_temp, config) = project(&[("a", "A"), ("b", "B")]);
        split_fascicles(&config).unwrap();
        std::fs::write(config.master_path(), master(&[("b", "B")])).unwrap();
        split_fascicles(&config).unwrap();

        let mut files: Vec<_> = std::fs::read_dir(config.fascicles_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["001-b.xhtml"]);
    }

    #[test]
    fn test_read_fascicles_from_manifest() {
        let (_temp, config) = project(&[("intro", "Introduction"), ("ch1", "Getting Started")]);
        let written = split_fascicles(&config).unwrap();
        let read = read_fascicles(&config).unwrap();
        assert_eq!(read, written);
    }
}

//! Skeleton extraction: code listings out, highlight placeholders in.
//!
//! Every `pre` carrying the code marker class is a listing. Its text goes to
//! the [`ListingCache`] and the block is replaced with
//!
//! ```text
//! <div class="listing" data-language="ruby" data-digest="…">
//!   <xi:include href="highlights/<digest>.html">
//!     <xi:fallback><p>[Missing code listing: highlights/<digest>.html]</p></xi:fallback>
//!   </xi:include>
//! </div>
//! ```
//!
//! The placeholder only depends on the digest, so extracting an unchanged
//! codex twice yields the same skeleton byte for byte.

use anyhow::Result;
use std::collections::BTreeSet;

use super::spine::include_with_fallback;
use crate::config::BuildConfig;
use crate::core::QuireError;
use crate::listing::ListingCache;
use crate::utils::fs::relative_href;
use crate::xhtml::{Document, NodeId};

/// Summary of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Listing blocks replaced.
    pub listings: usize,
    /// Listing files newly written to the cache.
    pub created: usize,
    /// Distinct digests referenced by the skeleton.
    pub digests: BTreeSet<String>,
}

/// Replace every marked code block in `doc` with a highlight placeholder.
///
/// Fails with [`QuireError::AmbiguousLanguage`] when a block names zero or
/// several languages besides the marker class.
pub fn extract_listings(doc: &mut Document, config: &BuildConfig, cache: &ListingCache) -> Result<Extraction> {
    let marker = config.code_marker_class.as_str();
    let blocks = doc.find_all(doc.root(), |d, id| d.is_named(id, "pre") && d.has_class(id, marker));
    let build_dir = config.build_dir();
    let mut extraction = Extraction::default();

    for block in blocks {
        let languages: Vec<String> =
            doc.classes(block).into_iter().filter(|c| *c != marker).map(str::to_string).collect();
        let [language] = languages.as_slice() else {
            return Err(QuireError::AmbiguousLanguage {
                source_path: listing_origin(doc, block, config),
                classes: languages.join(", "),
            }
            .into());
        };

        let stored = cache.store(language, &doc.text_content(block))?;
        let href = relative_href(&build_dir, &cache.highlight_path(&stored.digest));

        let placeholder = doc.create_element("div");
        doc.set_attr(placeholder, "class", "listing");
        doc.set_attr(placeholder, "data-language", language.as_str());
        doc.set_attr(placeholder, "data-digest", stored.digest.as_str());
        let include = include_with_fallback(doc, &href, &format!("[Missing code listing: {href}]"));
        doc.append(placeholder, include);
        doc.replace(block, placeholder);

        extraction.listings += 1;
        if stored.created {
            extraction.created += 1;
        }
        extraction.digests.insert(stored.digest);
    }
    Ok(extraction)
}

/// Digests referenced by the placeholders of an extracted skeleton.
pub fn placeholder_digests(doc: &Document) -> BTreeSet<String> {
    doc.find_all(doc.root(), |d, id| d.is_named(id, "div") && d.has_class(id, "listing"))
        .into_iter()
        .filter_map(|id| doc.get_attr(id, "data-digest").map(str::to_string))
        .collect()
}

fn listing_origin(doc: &Document, block: NodeId, config: &BuildConfig) -> String {
    let mut current = doc.parent(block);
    while let Some(node) = current {
        if let Some(source) = doc.get_attr(node, "data-signature-source") {
            return source.to_string();
        }
        current = doc.parent(node);
    }
    config.display_path(&config.codex_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhtml::{parse_xhtml, serialize_document};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<BuildConfig>, ListingCache) {
        let temp = TempDir::new().unwrap();
        let config = Arc::new(BuildConfig::for_project(temp.path()).unwrap());
        let cache = ListingCache::new(config.clone());
        (temp, config, cache)
    }

    fn codex(body: &str) -> Document {
        parse_xhtml(
            &format!(
                r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Book</title></head><body>{body}</body></html>"#
            ),
            "codex",
        )
        .unwrap()
    }

    const TWO_SIGNATURES: &str = r#"<div class="signature" data-signature-source="ch2.md"><pre class="sourceCode ruby"><code>puts 1
</code></pre></div><div class="signature" data-signature-source="ch3.md"><pre class="sourceCode ruby"><code>  puts 1</code></pre></div>"#;

    #[test]
    fn test_identical_listings_share_one_digest() {
        let (_temp, config, cache) = setup();
        let mut doc = codex(TWO_SIGNATURES);
        let extraction = extract_listings(&mut doc, &config, &cache).unwrap();

        assert_eq!(extraction.listings, 2);
        assert_eq!(extraction.created, 1);
        assert_eq!(extraction.digests.len(), 1);

        let files: Vec<_> = std::fs::read_dir(cache.listings_dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let digest = extraction.digests.iter().next().unwrap();
        assert!(cache.listing_path(digest, "ruby").ends_with(format!("{digest}.rb")));
        assert_eq!(std::fs::read_to_string(cache.listing_path(digest, "ruby")).unwrap(), "puts 1\n");

        assert!(doc.elements_named("pre").is_empty());
        assert_eq!(placeholder_digests(&doc), extraction.digests);
        let out = serialize_document(&doc);
        assert!(out.contains(&format!(r#"<xi:include href="highlights/{digest}.html">"#)));
        assert!(out.contains(&format!("[Missing code listing: highlights/{digest}.html]")));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let (_temp, config, cache) = setup();
        let mut first = codex(TWO_SIGNATURES);
        extract_listings(&mut first, &config, &cache).unwrap();

        let mut second = codex(TWO_SIGNATURES);
        let again = extract_listings(&mut second, &config, &cache).unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(serialize_document(&first), serialize_document(&second));
    }

    #[test]
    fn test_ambiguous_language_is_fatal() {
        let (_temp, config, cache) = setup();
        for classes in ["sourceCode", "sourceCode ruby python"] {
            let mut doc = codex(&format!(
                r#"<div class="signature" data-signature-source="ch1.md"><pre class="{classes}"><code>x</code></pre></div>"#
            ));
            let err = extract_listings(&mut doc, &config, &cache).unwrap_err();
            match err.downcast_ref::<QuireError>() {
                Some(QuireError::AmbiguousLanguage { source_path, .. }) => assert_eq!(source_path, "ch1.md"),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_unmarked_blocks_are_left_alone() {
        let (_temp, config, cache) = setup();
        let mut doc = codex(r#"<pre class="ruby"><code>x</code></pre><pre>plain</pre>"#);
        let extraction = extract_listings(&mut doc, &config, &cache).unwrap();
        assert_eq!(extraction.listings, 0);
        assert_eq!(doc.elements_named("pre").len(), 2);
    }
}

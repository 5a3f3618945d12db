use anyhow::Result;

use super::Normalizer;
use crate::config::BuildConfig;
use crate::xhtml::Document;

/// Cleans up pandoc's HTML5 output.
///
/// Drops the title block header pandoc emits for standalone documents and
/// marks every `pre` carrying a language class and a `code` child as an
/// extractable listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownNormalizer;

impl Normalizer for MarkdownNormalizer {
    fn normalize(&self, doc: &mut Document, config: &BuildConfig) -> Result<()> {
        if let Some(body) = doc.body() {
            let headers: Vec<_> = doc.element_children(body).filter(|&c| doc.is_named(c, "header")).collect();
            for header in headers {
                doc.detach(header);
            }
        }

        let listings = doc.find_all(doc.root(), |d, id| {
            d.is_named(id, "pre")
                && d.get_attr(id, "class").is_some_and(|c| !c.trim().is_empty())
                && d.element_children(id).any(|c| d.is_named(c, "code"))
        });
        for pre in listings {
            doc.add_class(pre, &config.code_marker_class);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xhtml::{parse_html, serialize_node};

    #[test]
    fn test_marks_listings_and_drops_title_header() {
        let mut doc = parse_html(
            r#"<html><head><title>Ch 1</title></head><body>
<header id="title-block-header"><h1 class="title">Ch 1</h1></header>
<h1>Intro</h1>
<pre class="ruby"><code>puts 1</code></pre>
<pre><code>plain</code></pre>
</body></html>"#,
        );
        let config = BuildConfig::default();
        MarkdownNormalizer.normalize(&mut doc, &config).unwrap();

        assert!(doc.elements_named("header").is_empty());
        let pres = doc.elements_named("pre");
        assert_eq!(doc.classes(pres[0]), vec!["ruby", "sourceCode"]);
        assert!(doc.get_attr(pres[1], "class").is_none());
        assert!(serialize_node(&doc, pres[0]).starts_with("<pre class=\"ruby sourceCode\">"));
    }
}

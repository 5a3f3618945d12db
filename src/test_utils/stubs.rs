//! In-process collaborators for tests.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::SourceFormat;
use crate::pipeline::{Exporter, Highlighter};
use crate::utils::fs::{read_text_file, write_text_file};

/// Converts a tiny Markdown subset to HTML the way pandoc lays it out.
///
/// Supported: `#` headings, fenced code blocks with an optional language,
/// and paragraphs (one per non-blank line). A line `!fail` makes the export
/// fail.
#[derive(Debug, Default)]
pub struct StubExporter {
    calls: AtomicUsize,
}

impl StubExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exports run so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Exporter for StubExporter {
    fn export(&self, source: &Path, export: &Path, _format: &SourceFormat) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = read_text_file(source)?;
        let body = markdown_to_html(&text).with_context(|| format!("stub export of {}", source.display()))?;
        write_text_file(
            export,
            &format!("<!DOCTYPE html>\n<html>\n<head><title></title></head>\n<body>\n{body}</body>\n</html>\n"),
        )
    }
}

fn markdown_to_html(text: &str) -> Result<String> {
    let mut html = String::new();
    let mut fence: Option<(String, Vec<String>)> = None;

    for line in text.lines() {
        if let Some((language, code)) = fence.as_mut() {
            if line.trim_start().starts_with("```") {
                let class = if language.is_empty() { String::new() } else { format!(" class=\"{language}\"") };
                html.push_str(&format!("<pre{class}><code>{}</code></pre>\n", escape(&code.join("\n"))));
                fence = None;
            } else {
                code.push(line.to_string());
            }
            continue;
        }

        let trimmed = line.trim();
        if let Some(info) = trimmed.strip_prefix("```") {
            fence = Some((info.trim().to_string(), Vec::new()));
        } else if trimmed == "!fail" {
            anyhow::bail!("stub exporter asked to fail");
        } else if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|c| *c == '#').count().min(6);
            let title = trimmed[level..].trim();
            html.push_str(&format!("<h{level}>{}</h{level}>\n", escape(title)));
        } else if !trimmed.is_empty() {
            html.push_str(&format!("<p>{}</p>\n", escape(trimmed)));
        }
    }

    if fence.is_some() {
        anyhow::bail!("unterminated code fence");
    }
    Ok(html)
}

/// Wraps each listing in `<pre class="highlight">`.
#[derive(Debug, Default)]
pub struct StubHighlighter {
    calls: AtomicUsize,
}

impl StubHighlighter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of highlights rendered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Highlighter for StubHighlighter {
    fn highlight(&self, listing: &Path, highlight: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = read_text_file(listing)?;
        write_text_file(highlight, &format!("<pre class=\"highlight\">{}</pre>\n", escape(code.trim_end())))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_subset() {
        let html = markdown_to_html("# Title\n\nSome text\n\n```ruby\nputs 1 < 2\n```\n```\nplain\n```").unwrap();
        assert_eq!(
            html,
            "<h1>Title</h1>\n<p>Some text</p>\n<pre class=\"ruby\"><code>puts 1 &lt; 2</code></pre>\n<pre><code>plain</code></pre>\n"
        );
    }

    #[test]
    fn test_unterminated_fence_fails() {
        assert!(markdown_to_html("```ruby\nputs 1").is_err());
    }
}

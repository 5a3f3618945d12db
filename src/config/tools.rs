use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Argument templates for the external collaborators.
///
/// Placeholders: `{input}` and `{output}` everywhere, plus `{language}` in
/// the org-mode exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Exporter command per source format.
    pub export: BTreeMap<String, Vec<String>>,
    /// Syntax highlighter command.
    pub highlight: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let mut export = BTreeMap::new();
        export.insert(
            "markdown".to_string(),
            strings(&["pandoc", "--no-highlight", "-w", "html5", "--standalone", "-o", "{output}", "{input}"]),
        );
        export.insert(
            "orgmode".to_string(),
            strings(&[
                "emacs",
                "--batch",
                "--file",
                "{input}",
                "--eval",
                "(progn (setq org-html-htmlize-output-type 'css) (org-mode) \
                 (org-export-to-file 'html \"{output}\" nil nil nil t \
                 '(:with-toc nil :headline-levels 6 :section-numbers nil :language \"{language}\" \
                 :html-postamble nil :with-sub-superscript nil)) (kill-emacs))",
            ]),
        );
        Self {
            export,
            highlight: strings(&["pygmentize", "-f", "html", "-o", "{output}", "{input}"]),
        }
    }
}

/// A deliverable produced from the master document by an external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableConfig {
    /// Short name used in logs.
    pub name: String,
    /// Output path relative to the build directory.
    pub output: String,
    /// Argument template; `{input}` is the master document, `{output}` the
    /// deliverable path, `{title}`, `{authors}`, `{date}` and `{language}`
    /// come from the book metadata.
    pub command: Vec<String>,
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

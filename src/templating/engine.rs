//! Rendering engines keyed by template file extension.
//!
//! A template named `index.html.tera` is rendered by the engine registered
//! for `tera`, producing `index.html`. An extension with no engine is
//! *final*: files ending in it are published as they are.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};

use crate::core::QuireError;

/// Renders template source text.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &Path, source: &str, context: &TeraContext) -> Result<String>;
}

/// One-off Tera rendering.
///
/// Every render uses a fresh `Tera` instance, so templates cannot reach
/// each other through `include` or `extends`; layouts are applied by the
/// resolver instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeraEngine;

impl TemplateEngine for TeraEngine {
    fn render(&self, template: &Path, source: &str, context: &TeraContext) -> Result<String> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.render_str(source, context).map_err(|e| {
            QuireError::TemplateRenderFailed {
                template: template.display().to_string(),
                reason: format_tera_error(&e),
            }
            .into()
        })
    }
}

/// Flatten a Tera error chain into one readable message, without the
/// internal one-off template name.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut current: Option<&dyn Error> = error.source();
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }

    let cleaned: Vec<String> = messages
        .into_iter()
        .map(|msg| {
            msg.replace("while rendering '__tera_one_off'", "")
                .replace("Failed to render '__tera_one_off'", "")
                .replace("Failed to parse '__tera_one_off'", "")
                .replace("'__tera_one_off'", "template")
                .trim()
                .to_string()
        })
        .filter(|msg| !msg.is_empty())
        .collect();

    if cleaned.is_empty() {
        "Template syntax error".to_string()
    } else {
        cleaned.join(" → ")
    }
}

/// Engines by extension.
#[derive(Clone, Default)]
pub struct TemplateEngines {
    engines: BTreeMap<String, Arc<dyn TemplateEngine>>,
}

impl TemplateEngines {
    /// No engines: every template is published verbatim.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in engines (`tera`).
    pub fn with_defaults() -> Self {
        let mut engines = Self::empty();
        engines.register("tera", Arc::new(TeraEngine));
        engines
    }

    pub fn register(&mut self, extension: impl Into<String>, engine: Arc<dyn TemplateEngine>) -> &mut Self {
        self.engines.insert(extension.into(), engine);
        self
    }

    pub fn engine_for(&self, extension: &str) -> Option<&Arc<dyn TemplateEngine>> {
        self.engines.get(extension)
    }

    /// Engine for the last extension of `path`.
    pub fn engine_for_path(&self, path: &Path) -> Option<&Arc<dyn TemplateEngine>> {
        path.extension().and_then(|e| self.engine_for(&e.to_string_lossy()))
    }

    /// True when no engine processes files with this extension.
    pub fn is_final(&self, extension: Option<&str>) -> bool {
        extension.is_none_or(|e| !self.engines.contains_key(e))
    }

    /// Render `source` through every engine extension of `path`, outermost
    /// first: `page.html.tera` runs Tera once.
    pub fn render_chain(&self, path: &Path, source: &str, context: &TeraContext) -> Result<String> {
        let mut text = source.to_string();
        let mut current = path.to_path_buf();
        while let Some(engine) = self.engine_for_path(&current) {
            text = engine
                .render(path, &text, context)
                .with_context(|| format!("Failed to expand {}", path.display()))?;
            current = current.with_extension("");
        }
        Ok(text)
    }
}

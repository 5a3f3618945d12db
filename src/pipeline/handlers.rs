//! Format → handler dispatch.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use super::collaborators::{CommandExporter, Exporter};
use super::normalize::{MarkdownNormalizer, Normalizer, OrgModeNormalizer};
use crate::config::BuildConfig;
use crate::core::{QuireError, SourceFormat};

/// Exporter and normalizer registered per source format.
#[derive(Clone, Default)]
pub struct FormatHandlers {
    exporters: HashMap<SourceFormat, Arc<dyn Exporter>>,
    normalizers: HashMap<SourceFormat, Arc<dyn Normalizer>>,
}

impl FormatHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command exporters for every format in `tools.export`, plus the
    /// built-in Markdown and Org-mode normalizers.
    pub fn from_config(config: &BuildConfig) -> Self {
        let mut handlers = Self::new();
        for (format, template) in &config.tools.export {
            handlers.register_exporter(
                SourceFormat::new(format.as_str()),
                Arc::new(CommandExporter::new(template.clone(), config.language.clone(), &config.project_root)),
            );
        }
        handlers.register_normalizer(SourceFormat::markdown(), Arc::new(MarkdownNormalizer));
        handlers.register_normalizer(SourceFormat::orgmode(), Arc::new(OrgModeNormalizer));
        handlers
    }

    pub fn register_exporter(&mut self, format: SourceFormat, exporter: Arc<dyn Exporter>) -> &mut Self {
        self.exporters.insert(format, exporter);
        self
    }

    pub fn register_normalizer(&mut self, format: SourceFormat, normalizer: Arc<dyn Normalizer>) -> &mut Self {
        self.normalizers.insert(format, normalizer);
        self
    }

    pub fn exporter(&self, format: &SourceFormat) -> Result<Arc<dyn Exporter>> {
        self.exporters.get(format).cloned().ok_or_else(|| {
            QuireError::NoHandlerRegistered {
                role: "exporter".to_string(),
                format: format.to_string(),
            }
            .into()
        })
    }

    pub fn normalizer(&self, format: &SourceFormat) -> Result<Arc<dyn Normalizer>> {
        self.normalizers.get(format).cloned().ok_or_else(|| {
            QuireError::NoHandlerRegistered {
                role: "normalizer".to_string(),
                format: format.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_builtin_formats() {
        let handlers = FormatHandlers::from_config(&BuildConfig::default());
        assert!(handlers.exporter(&SourceFormat::markdown()).is_ok());
        assert!(handlers.normalizer(&SourceFormat::orgmode()).is_ok());
    }

    #[test]
    fn test_unknown_format_has_no_handler() {
        let handlers = FormatHandlers::from_config(&BuildConfig::default());
        let err = handlers.exporter(&SourceFormat::new("asciidoc")).err().unwrap();
        match err.downcast_ref::<QuireError>() {
            Some(QuireError::NoHandlerRegistered { role, format }) => {
                assert_eq!(role, "exporter");
                assert_eq!(format, "asciidoc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! Source format tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Format of a source file, e.g. `markdown` or `orgmode`.
///
/// Formats are open-ended: the project configuration maps extensions to
/// format names and registers a handler per name, so this is a string
/// newtype rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceFormat(String);

impl SourceFormat {
    pub const MARKDOWN: &'static str = "markdown";
    pub const ORGMODE: &'static str = "orgmode";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn markdown() -> Self {
        Self::new(Self::MARKDOWN)
    }

    pub fn orgmode() -> Self {
        Self::new(Self::ORGMODE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceFormat {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

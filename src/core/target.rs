use std::fmt;
use std::path::{Path, PathBuf};

/// A node of the build graph.
///
/// File targets are artifacts on disk and are rebuilt only when stale.
/// Phony targets are named aggregates whose action runs once per build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    File(PathBuf),
    Phony(String),
}

impl Target {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn phony(name: impl Into<String>) -> Self {
        Self::Phony(name.into())
    }

    /// Path of a file target.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Phony(_) => None,
        }
    }

    pub fn is_phony(&self) -> bool {
        matches!(self, Self::Phony(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Phony(name) => write!(f, "{name}"),
        }
    }
}

impl From<PathBuf> for Target {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for Target {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

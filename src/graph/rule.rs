//! Declarations and pattern rules.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use super::session::ActionContext;
use crate::core::Target;

/// The work that materializes a target.
pub type Action = Arc<dyn Fn(ActionContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Computes the dependencies of a path matched by a rule.
pub type DepsFn = Arc<dyn Fn(&Path) -> Result<Vec<Target>> + Send + Sync>;

/// Wrap an async closure as an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wrap a closure as a [`DepsFn`].
pub fn deps_fn<F>(f: F) -> DepsFn
where
    F: Fn(&Path) -> Result<Vec<Target>> + Send + Sync + 'static,
{
    Arc::new(f)
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Which file paths a rule produces.
#[derive(Debug, Clone)]
pub enum TargetPattern {
    Glob(Pattern),
    Regex(Regex),
}

impl TargetPattern {
    /// Glob matching `<dir>/<file_glob>`; `dir` is taken literally.
    pub fn in_dir(dir: &Path, file_glob: &str) -> Result<Self> {
        let escaped = Pattern::escape(&dir.to_string_lossy());
        let pattern = format!("{escaped}/{file_glob}");
        Ok(Self::Glob(
            Pattern::new(&pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?,
        ))
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        Ok(Self::Glob(
            Pattern::new(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?,
        ))
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(
            Regex::new(pattern).with_context(|| format!("Invalid rule pattern: {pattern}"))?,
        ))
    }

    pub fn matches(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        match self {
            Self::Glob(pattern) => pattern.matches_with(&text, MATCH_OPTIONS),
            Self::Regex(regex) => regex.is_match(&text),
        }
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glob(pattern) => write!(f, "{}", pattern.as_str()),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// An explicitly declared target.
#[derive(Clone)]
pub struct Declaration {
    pub deps: Vec<Target>,
    pub action: Action,
}

/// A generator for every file path matching a pattern.
#[derive(Clone)]
pub struct Rule {
    pub pattern: TargetPattern,
    pub deps: DepsFn,
    pub action: Action,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("pattern", &self.pattern.to_string()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_in_dir_escapes_directory() {
        let pattern = TargetPattern::in_dir(Path::new("/tmp/book [draft]/build/highlights"), "*.html").unwrap();
        assert!(pattern.matches(Path::new("/tmp/book [draft]/build/highlights/abc.html")));
        assert!(!pattern.matches(Path::new("/tmp/book [draft]/build/highlights/sub/abc.html")));
        assert!(!pattern.matches(Path::new("/tmp/book d/build/highlights/abc.html")));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = TargetPattern::regex(r"\.xhtml$").unwrap();
        assert!(pattern.matches(&PathBuf::from("build/signatures/ch1.xhtml")));
        assert!(!pattern.matches(&PathBuf::from("build/exports/ch1.html")));
        assert_eq!(pattern.to_string(), r"/\.xhtml$/");
    }
}

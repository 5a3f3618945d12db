//! Path normalization, containment checks and relative hrefs.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// ```rust,no_run
/// use quire::utils::fs::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(normalize_path(Path::new("/foo/./bar/../baz")), PathBuf::from("/foo/baz"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// True when `path` (relative paths are taken relative to `base`) stays inside `base`.
#[must_use]
pub fn is_safe_path(base: &Path, path: &Path) -> bool {
    let normalized_base = normalize_path(base);
    let normalized_path = if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    };

    normalized_path.starts_with(normalized_base)
}

/// Href from a document in `from_dir` to `target`, with `/` separators.
///
/// Both paths must be relative to the same root (or both absolute).
#[must_use]
pub fn relative_href(from_dir: &Path, target: &Path) -> String {
    let from = normalize_path(from_dir);
    let to = normalize_path(target);
    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_parts.iter().zip(to_parts.iter()).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_parts.len() {
        parts.push("..".to_string());
    }
    for part in &to_parts[common..] {
        parts.push(part.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/foo/./bar/../baz")), PathBuf::from("/foo/baz"));
        assert_eq!(normalize_path(Path::new("../src/./lib.rs")), PathBuf::from("../src/lib.rs"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_is_safe_path() {
        let base = Path::new("/project");
        assert!(is_safe_path(base, Path::new("images/cover.png")));
        assert!(!is_safe_path(base, Path::new("../etc/passwd")));
        assert!(!is_safe_path(base, Path::new("/etc/passwd")));
    }

    #[test]
    fn test_relative_href() {
        assert_eq!(
            relative_href(Path::new("build"), Path::new("build/signatures/ch1.xhtml")),
            "signatures/ch1.xhtml"
        );
        assert_eq!(
            relative_href(Path::new("build/master"), Path::new("build/highlights/abc.html")),
            "../highlights/abc.html"
        );
        assert_eq!(relative_href(Path::new("build"), Path::new("styles/book.css")), "../styles/book.css");
    }
}

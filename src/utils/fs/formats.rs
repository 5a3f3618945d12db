//! Reading and writing text-based files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub fn read_text_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    super::atomic::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Read and deserialize a TOML file.
pub fn read_toml_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = read_text_file(path)?;
    toml::from_str(&content).with_context(|| format!("Failed to parse TOML from: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Sample {
        title: String,
    }

    #[test]
    fn test_read_toml_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sample.toml");
        write_text_file(&path, "title = \"Book\"\n").unwrap();

        let sample: Sample = read_toml_file(&path).unwrap();
        assert_eq!(sample.title, "Book");
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.txt");
        let err = read_text_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}

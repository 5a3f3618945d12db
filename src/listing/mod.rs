//! Content-addressed store of code listings and their highlights.
//!
//! A listing is identified by the SHA-256 of its normalized text. Two code
//! blocks that normalize to the same text therefore share one digest and one
//! file under `<build>/listings/`, no matter how often the book repeats them.
//! Highlights rendered from a listing live under `<build>/highlights/` with
//! the same digest and an `.html` extension.
//!
//! Writes go through [`create_new`], so concurrent extractions of the same
//! listing race harmlessly: exactly one of them creates the file, the others
//! observe it and leave it untouched.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::BuildConfig;
use crate::utils::fs::create_new;

/// Width of a tab stop when normalizing listings.
const TAB_WIDTH: usize = 2;

/// A listing as recorded in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredListing {
    pub digest: String,
    pub language: String,
    /// `<build>/listings/<digest>.<ext>`
    pub path: PathBuf,
    /// Whether this call wrote the file.
    pub created: bool,
}

/// Normalize the text of a code block.
///
/// Tabs become two spaces, blank lines at either end are dropped, the
/// indentation shared by every non-blank line is removed, and trailing
/// whitespace at the very end is trimmed.
pub fn normalize_listing(text: &str) -> String {
    let expanded = text.replace('\t', &" ".repeat(TAB_WIDTH));
    let lines: Vec<&str> = expanded.lines().collect();

    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let lines = &lines[first..=last];

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    let dedented: Vec<&str> = lines
        .iter()
        .map(|l| if l.trim().is_empty() { "" } else { &l[indent..] })
        .collect();
    dedented.join("\n").trim_end().to_string()
}

/// Hex SHA-256 of already normalized listing text.
pub fn listing_digest(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store for listings and the highlights rendered from them.
#[derive(Debug, Clone)]
pub struct ListingCache {
    config: Arc<BuildConfig>,
}

impl ListingCache {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    pub fn listings_dir(&self) -> PathBuf {
        self.config.listings_dir()
    }

    pub fn highlights_dir(&self) -> PathBuf {
        self.config.highlights_dir()
    }

    pub fn listing_path(&self, digest: &str, language: &str) -> PathBuf {
        self.listings_dir().join(format!("{digest}.{}", self.config.listing_extension(language)))
    }

    pub fn highlight_path(&self, digest: &str) -> PathBuf {
        self.highlights_dir().join(format!("{digest}.html"))
    }

    pub fn has_highlight(&self, digest: &str) -> bool {
        self.highlight_path(digest).is_file()
    }

    /// Normalize `text`, and write it under its digest unless a listing with
    /// that digest already exists.
    ///
    /// The digest covers only the text, so the same code tagged with another
    /// language reuses the existing entry and keeps its extension.
    pub fn store(&self, language: &str, text: &str) -> Result<StoredListing> {
        let normalized = normalize_listing(text);
        let digest = listing_digest(&normalized);

        if let Some(path) = self.find_listing(&digest)? {
            trace!("Listing {} already cached as {}", digest, path.display());
            return Ok(StoredListing {
                digest,
                language: language.to_string(),
                path,
                created: false,
            });
        }

        let path = self.listing_path(&digest, language);
        let mut content = normalized;
        content.push('\n');
        let created = create_new(&path, content.as_bytes())
            .with_context(|| format!("Failed to store {language} listing {digest}"))?;
        if created {
            debug!("Stored {} listing {}", language, digest);
        } else {
            trace!("Listing {} already cached", digest);
        }

        Ok(StoredListing {
            digest,
            language: language.to_string(),
            path,
            created,
        })
    }

    /// The listing file for `digest`, whatever its extension.
    pub fn find_listing(&self, digest: &str) -> Result<Option<PathBuf>> {
        let dir = self.listings_dir();
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut matches: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read listings directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.file_stem().is_some_and(|stem| stem == digest))
            .collect();
        matches.sort();
        Ok(matches.into_iter().next())
    }

    /// Digest encoded in a highlight path, if the path is inside the
    /// highlight directory.
    pub fn digest_of_highlight(&self, path: &Path) -> Option<String> {
        if path.parent()? != self.highlights_dir() || path.extension()? != "html" {
            return None;
        }
        path.file_stem().map(|s| s.to_string_lossy().into_owned())
    }
}

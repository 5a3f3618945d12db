//! File system utilities shared by the build graph and pipeline stages.
//!
//! - [`atomic`]: temp-and-rename writes, plus exclusive create for
//!   content-addressed files
//! - [`dirs`]: directory creation, removal and copying
//! - [`formats`]: text and TOML file reading
//! - [`metadata`]: modification times and timestamp files for staleness checks
//! - [`paths`]: normalization, containment checks and relative hrefs
//!
//! # Examples
//!
//! ```rust,no_run
//! use quire::utils::fs::{atomic_write, ensure_dir, modified_time};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("build/exports"))?;
//! atomic_write(Path::new("build/spine.xhtml"), b"<html/>")?;
//! let mtime = modified_time(Path::new("build/spine.xhtml"))?;
//! assert!(mtime.is_some());
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod dirs;
pub mod formats;
pub mod metadata;
pub mod paths;

pub use atomic::{atomic_write, create_new};
pub use dirs::{copy_file, ensure_dir, ensure_parent_dir, remove_dir_all};
pub use formats::{read_text_file, read_toml_file, write_text_file};
pub use metadata::{modified_time, newest_modified_time, touch};
pub use paths::{is_safe_path, normalize_path, relative_href};

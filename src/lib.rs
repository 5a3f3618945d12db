//! quire - incremental book builder
//!
//! quire turns a tree of lightweight-markup manuscripts (Markdown, Org-mode)
//! into a set of composed book artifacts. Each stage of the transformation is
//! a target in a file-based dependency graph, so a rebuild only redoes the
//! work whose inputs changed.
//!
//! # Pipeline
//!
//! ```text
//! source ──export──▶ export ──normalize──▶ signature ─┐
//!                                                     ├─▶ spine ──▶ codex ──▶ skeleton
//! source ──export──▶ export ──normalize──▶ signature ─┘                         │
//!                                                            listings ◀─────────┤
//!                                                            highlights ────────┤
//!                                                                               ▼
//!                                                     fascicles ◀── master ──▶ deliverables
//!                                                         │
//!                                                         └──▶ site
//! ```
//!
//! - A **signature** is one source file's normalized XHTML, wrapped in
//!   `div.signature`.
//! - The **spine** lists the signatures in reading order through XInclude.
//! - The **codex** is the spine with includes resolved and every toplevel
//!   element, heading and signature renumbered.
//! - The **skeleton** is the codex with code listings extracted into
//!   content-addressed files and replaced by includes of their highlights.
//! - The **master** is the skeleton with highlights included and asset
//!   references rewritten.
//! - **Fascicles** are per-signature slices of the master.
//!
//! # Core Modules
//!
//! - [`core`] - Errors, targets and source formats
//! - [`config`] - Project configuration (`quire.toml`)
//! - [`source`] - Source discovery and the path conventions derived from it
//! - [`graph`] - The task graph: declarations, planning and concurrent execution
//! - [`xhtml`] - The document model every stage works on
//! - [`listing`] - Content-addressed code listing cache
//! - [`pipeline`] - The stages above, wired into a task graph
//! - [`templating`] - Template lookup, expansion and site generation
//! - [`cli`] - The `quire` command
//! - [`utils`] - File system, locking, process and slug helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use quire::config::BuildConfig;
//! use quire::core::Target;
//! use quire::pipeline::Pipeline;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(BuildConfig::load(Path::new("."))?);
//! let pipeline = Pipeline::from_config(config)?;
//! let report = pipeline.build(&[Target::phony("fascicles")]).await?;
//! println!("{} targets built", report.built().count());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod graph;
pub mod listing;
pub mod pipeline;
pub mod source;
pub mod templating;
pub mod utils;
pub mod xhtml;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

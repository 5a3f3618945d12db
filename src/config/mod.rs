//! Project configuration.
//!
//! A project is configured by an optional `quire.toml` at its root. The file
//! is read once at startup into a [`BuildConfig`], which is then shared as an
//! `Arc<BuildConfig>` with every component that needs it. There is no
//! process-wide configuration state.
//!
//! ```toml
//! title = "The Book"
//! authors = ["Avdi Grimm"]
//! stylesheets = ["styles/book.css"]
//!
//! [formats]
//! md = "markdown"
//! org = "orgmode"
//!
//! [tools]
//! highlight = ["pygmentize", "-f", "html", "-o", "{output}", "{input}"]
//!
//! [[deliverables]]
//! name = "latex"
//! output = "deliverables/book.latex"
//! command = ["pandoc", "--standalone", "-o", "{output}", "{input}"]
//! ```

mod build;
mod tools;

pub use build::{BuildConfig, CONFIG_FILE_NAME};
pub use tools::{DeliverableConfig, ToolsConfig};

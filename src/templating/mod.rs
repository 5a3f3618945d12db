//! Templates for auxiliary artifacts: site pages and similar.
//!
//! Templates live in two roots, the project's `templates/` directory and
//! the system defaults shipped with quire; a template in the user root
//! shadows the system one with the same logical path. The logical path of
//! `site/index.html.tera` is `site/index.html`: each trailing extension
//! with a registered [`TemplateEngine`] is one rendering stage, and the
//! first extension without an engine is the final form.
//!
//! - [`engine`]: engines by extension, Tera built in
//! - [`resolver`]: lookup, metamorphosis chains, expansion with layouts
//! - [`site`]: fascicle pages, table of contents and published templates
//!
//! # Layouts
//!
//! An HTML output below `<build>/a/b/` is wrapped by the first of
//! `a/b/_layout.html`, `a/_layout.html`, `_layout.html` that resolves, with
//! the rendered page in `content`. Finding none is not an error.

pub mod engine;
pub mod resolver;
pub mod site;

pub use engine::{TemplateEngine, TemplateEngines, TeraEngine, format_tera_error};
pub use resolver::{LAYOUT_NAME, TemplateEntry, TemplateResolver};
pub use site::{BOOK_METADATA_TEMPLATE, FASCICLE_TEMPLATE, SiteSummary, generate_site};

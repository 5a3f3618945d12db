//! Test utilities for quire
//!
//! Helpers shared by unit tests and the integration suites in `tests/`:
//!
//! - [`project`]: temporary book projects with a stub-backed pipeline
//! - [`stubs`]: in-process exporter and highlighter standing in for pandoc
//!   and pygmentize, with call counters
//!
//! # Example
//!
//! ```rust,no_run
//! use quire::test_utils::ProjectFixture;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let project = ProjectFixture::new()?;
//! project.write("ch1.md", "# One\n\nHello")?;
//! let build = project.stub_pipeline()?;
//! build.pipeline.build(&[quire::core::Target::phony("fascicles")]).await?;
//! assert_eq!(build.exporter.calls(), 1);
//! # Ok(())
//! # }
//! ```

pub mod project;
pub mod stubs;

pub use project::{ProjectFixture, StubBuild};
pub use stubs::{StubExporter, StubHighlighter};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `None`, logging is enabled only
/// when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=quire=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

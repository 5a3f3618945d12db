//! Utility modules shared across the crate.
//!
//! - [`fs`]: atomic writes, directories, modification times, paths
//! - [`lock`]: exclusive build-directory lock
//! - [`process`]: external tool invocation
//! - [`slug`]: URL-safe names for fascicles and toplevel elements

pub mod fs;
pub mod lock;
pub mod process;
pub mod slug;

pub use lock::BuildLock;
pub use process::{ToolCommand, ToolOutput};
pub use slug::slugify;

//! Core types shared by every subsystem.
//!
//! - [`QuireError`] and [`ErrorContext`]: the error taxonomy and its
//!   terminal presentation
//! - [`SourceFormat`]: the format tag attached to each source file
//! - [`Target`]: a node of the build graph

pub mod error;
pub mod format;
pub mod target;

pub use error::{ErrorContext, QuireError, user_friendly_error};
pub use format::SourceFormat;
pub use target::Target;

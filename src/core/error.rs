//! Error handling for quire
//!
//! Two layers, as everywhere else in the crate:
//! 1. [`QuireError`] is the strongly-typed failure taxonomy. Code that needs
//!    to react to a specific failure (the CLI, tests, the build session)
//!    recovers it with `anyhow::Error::downcast_ref::<QuireError>()`, which
//!    sees through any `.context(...)` layers added on the way up.
//! 2. [`ErrorContext`] wraps an error with a suggestion and details for the
//!    terminal. [`user_friendly_error`] maps any `anyhow::Error` to one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use quire::core::{QuireError, user_friendly_error};
//!
//! let error = anyhow::Error::from(QuireError::MissingSource {
//!     target: "build/signatures/intro.xhtml".to_string(),
//! });
//! user_friendly_error(error).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Every failure mode the build can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuireError {
    /// `quire.toml` exists but could not be parsed or validated.
    #[error("Invalid configuration in {file}: {reason}")]
    ConfigError {
        /// Configuration file
        file: String,
        /// Parser or validation message
        reason: String,
    },

    /// A target was requested that no rule produces and that does not exist on disk.
    #[error("Don't know how to build '{target}'")]
    MissingSource {
        /// The unresolvable target
        target: String,
    },

    /// Two or more targets depend on each other.
    #[error("Circular dependency detected: {chain}")]
    Cycle {
        /// Targets forming the cycle, joined with arrows
        chain: String,
    },

    /// A source file has an extension no format is registered for.
    #[error("No source format registered for '{path}' (extension '{extension}')")]
    UnregisteredExtension {
        /// Source path
        path: String,
        /// Extension that failed to map
        extension: String,
    },

    /// A source format has no exporter or normalizer registered.
    #[error("No {role} registered for format '{format}'")]
    NoHandlerRegistered {
        /// "exporter" or "normalizer"
        role: String,
        /// Format name
        format: String,
    },

    /// An external command could not be started or exited unsuccessfully.
    #[error("External tool '{tool}' failed ({status}){}", format_output(.stdout, .stderr))]
    ExternalToolFailure {
        /// Program name
        tool: String,
        /// Exit status, or the spawn error when the program never started
        status: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A code listing marked for extraction does not name exactly one language.
    #[error("Ambiguous listing language in '{source_path}': expected one language class, found [{classes}]")]
    AmbiguousLanguage {
        /// Signature the listing came from
        source_path: String,
        /// Classes found besides the marker class
        classes: String,
    },

    /// No template matched a name in either template root.
    #[error("Unable to find template '{name}' (searched {searched})")]
    UnresolvedTemplate {
        /// Template name as requested
        name: String,
        /// Template roots that were searched
        searched: String,
    },

    /// A template engine failed to render.
    #[error("Failed to render template '{template}': {reason}")]
    TemplateRenderFailed {
        /// Template path
        template: String,
        /// Engine error chain
        reason: String,
    },

    /// An XHTML artifact could not be parsed.
    #[error("Invalid document '{path}': {reason}")]
    InvalidDocument {
        /// Document path, or `<string>` for in-memory input
        path: String,
        /// Parser message
        reason: String,
    },

    /// Another build holds the lock on the build directory.
    #[error("Build directory is locked by another process: {path}")]
    BuildLocked {
        /// Lock file path
        path: String,
    },

    /// A build action did not run because an earlier action failed.
    #[error("Build cancelled before '{target}' could run")]
    Cancelled {
        /// Target whose action was skipped
        target: String,
    },

    /// Catch-all for failures without a dedicated variant.
    #[error("{message}")]
    Other {
        /// Message
        message: String,
    },
}

/// An error plus the hints shown alongside it on the terminal.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: QuireError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: QuireError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Map any error to an [`ErrorContext`] suitable for the terminal.
///
/// Typed [`QuireError`]s get tailored suggestions. I/O and TOML errors get
/// generic ones. Everything else is shown with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(quire_error) = error.downcast_ref::<QuireError>() {
        let mut context = create_error_context(quire_error.clone());
        let typed = quire_error.to_string();
        let outer: Vec<String> =
            error.chain().map(std::string::ToString::to_string).filter(|m| *m != typed).collect();
        if !outer.is_empty() {
            let trail = outer.join("\n  ");
            context.details = Some(match context.details.take() {
                Some(details) => format!("{details}\nWhile:\n  {trail}"),
                None => format!("While:\n  {trail}"),
            });
        }
        return context;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(QuireError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check ownership and permissions of the project and build directories");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(QuireError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(QuireError::ConfigError {
            file: "quire.toml".to_string(),
            reason: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in quire.toml. Verify quotes, brackets, and table names");
    }

    let mut message = error.to_string();
    let chain = cause_chain(&error);
    if !chain.is_empty() {
        message.push_str("\n\n");
        message.push_str(&chain);
    }

    ErrorContext::new(QuireError::Other {
        message,
    })
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str(&format!("\nstdout:\n{}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        out.push_str(&format!("\nstderr:\n{}", stderr.trim_end()));
    }
    out
}

fn cause_chain(error: &anyhow::Error) -> String {
    let causes: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();
    if causes.is_empty() {
        return String::new();
    }
    let mut out = String::from("Caused by:");
    for (i, cause) in causes.iter().enumerate() {
        out.push_str(&format!("\n  {}: {}", i + 1, cause));
    }
    out
}

fn create_error_context(error: QuireError) -> ErrorContext {
    match &error {
        QuireError::ConfigError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax and field names in quire.toml"),
        QuireError::MissingSource {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check that the source file exists and that the target path is spelled correctly")
            .with_details("Targets are either produced by a build rule or must already exist on disk"),
        QuireError::Cycle {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Break the cycle by removing one of the dependencies between these targets"),
        QuireError::UnregisteredExtension {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Use a .md, .markdown or .org extension, or exclude the file from the sources"),
        QuireError::NoHandlerRegistered {
            ..
        } => ErrorContext::new(error)
            .with_details("Each source format needs both an exporter and a normalizer"),
        QuireError::ExternalToolFailure {
            tool,
            ..
        } => {
            let suggestion = format!("Make sure '{tool}' is installed and on PATH, then rerun with --verbose");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        QuireError::AmbiguousLanguage {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Give each fenced code block exactly one language, e.g. ```ruby"),
        QuireError::UnresolvedTemplate {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Add the template to the project's templates directory"),
        QuireError::TemplateRenderFailed {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check template syntax: variables use {{ var }} and control flow uses {% %}"),
        QuireError::InvalidDocument {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run `quire clean` and rebuild; intermediate files may be stale or truncated"),
        QuireError::BuildLocked {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Wait for the other build to finish"),
        QuireError::Cancelled {
            ..
        }
        | QuireError::Other {
            ..
        } => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let error = QuireError::Cycle {
            chain: "a → b → a".to_string(),
        };
        assert_eq!(error.to_string(), "Circular dependency detected: a → b → a");
    }

    #[test]
    fn test_downcast_through_context() {
        let error = anyhow::Error::from(QuireError::MissingSource {
            target: "missing.md".to_string(),
        })
        .context("Failed to build signatures");

        let typed = error.downcast_ref::<QuireError>().unwrap();
        assert!(matches!(typed, QuireError::MissingSource { .. }));
    }

    #[test]
    fn test_user_friendly_error_adds_suggestion() {
        let error = anyhow::Error::from(QuireError::ExternalToolFailure {
            tool: "pandoc".to_string(),
            status: "exit status: 1".to_string(),
            stdout: String::new(),
            stderr: "pandoc: unknown option".to_string(),
        });
        let context = user_friendly_error(error);
        assert!(context.suggestion.unwrap().contains("pandoc"));
    }

    #[test]
    fn test_external_tool_failure_shows_output() {
        let error = QuireError::ExternalToolFailure {
            tool: "pygmentize".to_string(),
            status: "exit status: 2".to_string(),
            stdout: String::new(),
            stderr: "no lexer for alias 'rubyy'".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.starts_with("External tool 'pygmentize' failed (exit status: 2)"));
        assert!(rendered.contains("stderr:\nno lexer for alias 'rubyy'"));
        assert!(!rendered.contains("stdout:"));
    }

    #[test]
    fn test_user_friendly_error_generic_includes_chain() {
        let error: anyhow::Result<()> =
            Err(anyhow::anyhow!("root cause")).context("while exporting");
        let context = user_friendly_error(error.unwrap_err());
        let rendered = context.to_string();
        assert!(rendered.contains("while exporting"));
        assert!(rendered.contains("root cause"));
    }

    #[test]
    fn test_error_context_display() {
        let context = ErrorContext::new(QuireError::BuildLocked {
            path: "build/.quire.lock".to_string(),
        })
        .with_suggestion("wait")
        .with_details("locked");
        let rendered = context.to_string();
        assert!(rendered.contains("Details: locked"));
        assert!(rendered.contains("Suggestion: wait"));
    }
}

//! Running external tools (pandoc, emacs, pygmentize, ...).
//!
//! Tools are configured as argument templates such as
//! `["pandoc", "--output", "{output}", "{input}"]`; [`ToolCommand::from_template`]
//! substitutes the placeholders and [`ToolCommand::run`] executes the result,
//! turning a non-zero exit into [`QuireError::ExternalToolFailure`] with the
//! captured output. Runs are blocking; async callers wrap them in
//! `spawn_blocking`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::QuireError;

/// Builder for one external command invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    context: Option<String>,
}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Build a command from an argument template, replacing `{name}` with the
    /// matching value. The first template element is the program.
    pub fn from_template(template: &[String], vars: &[(&str, String)]) -> Result<Self> {
        let Some((program, rest)) = template.split_first() else {
            return Err(QuireError::ConfigError {
                file: "quire.toml".to_string(),
                reason: "tool command template is empty".to_string(),
            }
            .into());
        };
        let substitute = |s: &str| {
            vars.iter()
                .fold(s.to_string(), |acc, (name, value)| acc.replace(&format!("{{{name}}}"), value))
        };
        Ok(Self::new(substitute(program)).args(rest.iter().map(|a| substitute(a))))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Label included in log lines.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn run(&self) -> Result<ToolOutput> {
        let start = std::time::Instant::now();
        let context = self.context.as_deref().unwrap_or(&self.program);
        tracing::debug!(target: "tool", "({}) Executing: {} {}", context, self.program, self.args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| QuireError::ExternalToolFailure {
            tool: self.program.clone(),
            status: format!("failed to start: {e}"),
            stdout: String::new(),
            stderr: String::new(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!(target: "tool", "({}) Command failed with exit code: {:?}", context, output.status.code());
            return Err(QuireError::ExternalToolFailure {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stdout,
                stderr,
            }
            .into());
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(target: "tool", "({}) {}", context, stderr.trim());
        }
        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::debug!(target: "tool::perf", "({}) {} took {:.2}s", context, self.program, elapsed.as_secs_f64());
        }

        Ok(ToolOutput {
            stdout,
            stderr,
        })
    }
}

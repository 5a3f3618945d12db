//! Incremental, dependency-aware task graph.
//!
//! A [`TaskGraph`] holds three kinds of knowledge about targets:
//!
//! - explicit declarations ([`TaskGraph::file`], [`TaskGraph::phony`]),
//!   consulted first
//! - pattern rules ([`TaskGraph::rule`]), scanned in registration order;
//!   the first rule whose pattern matches a file path wins
//! - everything else is a *source*: a file that must already exist
//!
//! Building happens in a [`BuildSession`]. The session first plans the
//! requested targets (recursive resolution into a petgraph graph, failing on
//! cycles), then executes them: dependencies first and concurrently where
//! independent, each node's action at most once per session. A file target
//! runs when it is missing or older than its newest file dependency; a
//! phony target always runs.
//!
//! ```rust,no_run
//! use quire::core::Target;
//! use quire::graph::{BuildSession, TaskGraph, action};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut graph = TaskGraph::new();
//! graph.file("build/out.txt", vec![Target::file("in.txt")], action(|ctx| async move {
//!     let output = ctx.output_path()?;
//!     std::fs::write(output, "built")?;
//!     Ok(())
//! }));
//!
//! let session = BuildSession::new(Arc::new(graph), 4);
//! let report = session.build(&[Target::file("build/out.txt")]).await?;
//! assert_eq!(report.built().count(), 1);
//! # Ok(())
//! # }
//! ```

mod plan;
mod rule;
mod session;

pub use plan::BuildPlan;
pub use rule::{Action, Declaration, DepsFn, Rule, TargetPattern, action, deps_fn};
pub use session::{ActionContext, BuildReport, BuildSession, Outcome};

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::trace;

use crate::core::{QuireError, Target};

/// How a target gets produced.
#[derive(Clone)]
pub(crate) enum Resolution {
    /// Declared explicitly or generated by a rule.
    Task {
        deps: Vec<Target>,
        action: Action,
    },
    /// A file nothing produces.
    Source,
}

impl Resolution {
    pub(crate) fn deps(&self) -> &[Target] {
        match self {
            Self::Task { deps, .. } => deps,
            Self::Source => &[],
        }
    }
}

/// Declarations and rules for one project.
#[derive(Default, Clone)]
pub struct TaskGraph {
    declarations: HashMap<Target, Declaration>,
    rules: Vec<Rule>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare how to produce a file. A later declaration of the same path
    /// replaces the earlier one.
    pub fn file(&mut self, path: impl Into<PathBuf>, deps: Vec<Target>, action: Action) -> &mut Self {
        self.declarations.insert(
            Target::File(path.into()),
            Declaration {
                deps,
                action,
            },
        );
        self
    }

    /// Declare a named aggregate target.
    pub fn phony(&mut self, name: impl Into<String>, deps: Vec<Target>, action: Action) -> &mut Self {
        self.declarations.insert(
            Target::Phony(name.into()),
            Declaration {
                deps,
                action,
            },
        );
        self
    }

    /// Register a rule for every file path matching `pattern`.
    pub fn rule(&mut self, pattern: TargetPattern, deps: DepsFn, action: Action) -> &mut Self {
        self.rules.push(Rule {
            pattern,
            deps,
            action,
        });
        self
    }

    /// Whether anything produces `target`.
    pub fn is_declared(&self, target: &Target) -> bool {
        self.declarations.contains_key(target)
            || target.as_path().is_some_and(|path| self.rules.iter().any(|r| r.pattern.matches(path)))
    }

    /// Every explicitly declared phony target name, sorted.
    pub fn phony_targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .declarations
            .keys()
            .filter_map(|t| match t {
                Target::Phony(name) => Some(name.clone()),
                Target::File(_) => None,
            })
            .collect();
        names.sort();
        names
    }

    pub(crate) fn resolve(&self, target: &Target) -> Result<Resolution> {
        if let Some(declaration) = self.declarations.get(target) {
            return Ok(Resolution::Task {
                deps: declaration.deps.clone(),
                action: declaration.action.clone(),
            });
        }

        match target {
            Target::Phony(name) => Err(QuireError::MissingSource {
                target: name.clone(),
            }
            .into()),
            Target::File(path) => {
                if let Some(rule) = self.rules.iter().find(|r| r.pattern.matches(path)) {
                    trace!("Rule {} matches {}", rule.pattern, path.display());
                    let deps = (rule.deps)(path)?;
                    return Ok(Resolution::Task {
                        deps,
                        action: rule.action.clone(),
                    });
                }
                Ok(Resolution::Source)
            }
        }
    }
}

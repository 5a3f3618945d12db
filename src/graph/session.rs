//! Execute phase: one build invocation over a [`TaskGraph`].

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::plan::BuildPlan;
use super::{Resolution, TaskGraph};
use crate::core::{QuireError, Target};
use crate::utils::fs::{modified_time, newest_modified_time};

/// What happened to one target during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action ran and succeeded.
    Built,
    /// Nothing to do: the file is newer than its dependencies, or a source.
    UpToDate,
    /// Not attempted because a dependency failed or the build was cancelled.
    Skipped,
    /// The action (or resolution) failed.
    Failed,
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Built | Self::UpToDate)
    }
}

/// Per-target outcomes of a build, in completion order.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    outcomes: Vec<(Target, Outcome)>,
}

impl BuildReport {
    pub fn outcomes(&self) -> &[(Target, Outcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, target: &Target) -> Option<Outcome> {
        self.outcomes.iter().find(|(t, _)| t == target).map(|(_, o)| *o)
    }

    /// Targets whose action ran.
    pub fn built(&self) -> impl Iterator<Item = &Target> {
        self.outcomes.iter().filter(|(_, o)| *o == Outcome::Built).map(|(t, _)| t)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

struct SessionState {
    graph: Arc<TaskGraph>,
    nodes: DashMap<Target, Arc<OnceCell<Outcome>>>,
    semaphore: Arc<Semaphore>,
    cancelled: AtomicBool,
    failures: Mutex<Vec<anyhow::Error>>,
    outcomes: Mutex<Vec<(Target, Outcome)>>,
}

/// One build invocation. Memoisation lives as long as the session, so a
/// target's action runs at most once no matter how many paths reach it.
#[derive(Clone)]
pub struct BuildSession {
    state: Arc<SessionState>,
}

impl BuildSession {
    /// `jobs` bounds how many actions run at once.
    pub fn new(graph: Arc<TaskGraph>, jobs: usize) -> Self {
        Self {
            state: Arc::new(SessionState {
                graph,
                nodes: DashMap::new(),
                semaphore: Arc::new(Semaphore::new(jobs.max(1))),
                cancelled: AtomicBool::new(false),
                failures: Mutex::new(Vec::new()),
                outcomes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build `targets` and everything they depend on.
    ///
    /// On failure the first error is returned; errors from other actions
    /// that failed while it was in flight are attached as context.
    pub async fn build(&self, targets: &[Target]) -> Result<BuildReport> {
        let plan = BuildPlan::new(&self.state.graph, targets)?;
        debug!("Planned {} targets", plan.len());

        let chain = Arc::new(Vec::new());
        let outcomes =
            join_all(targets.iter().map(|t| self.state.clone().build_node(t.clone(), chain.clone()))).await;

        let mut failures = match self.state.failures.lock() {
            Ok(mut failures) => std::mem::take(&mut *failures),
            Err(_) => return Err(anyhow!("Build state poisoned")),
        };
        if !failures.is_empty() {
            let first = failures.remove(0);
            if failures.is_empty() {
                return Err(first);
            }
            let others = failures.iter().map(|e| format!("  {e:#}")).collect::<Vec<_>>().join("\n");
            return Err(first.context(format!("Build failed; additional failures:\n{others}")));
        }

        if let Some((target, _)) = targets.iter().zip(&outcomes).find(|(_, o)| !o.is_ok()) {
            return Err(QuireError::Cancelled {
                target: target.to_string(),
            }
            .into());
        }

        Ok(self.report())
    }

    /// Outcomes recorded so far.
    pub fn report(&self) -> BuildReport {
        BuildReport {
            outcomes: self.state.outcomes.lock().map(|o| o.clone()).unwrap_or_default(),
        }
    }
}

impl SessionState {
    fn build_node(self: Arc<Self>, target: Target, chain: Arc<Vec<Target>>) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            if chain.contains(&target) {
                let mut cycle: Vec<String> =
                    chain.iter().skip_while(|t| **t != target).map(ToString::to_string).collect();
                cycle.push(target.to_string());
                self.record_failure(
                    QuireError::Cycle {
                        chain: cycle.join(" → "),
                    }
                    .into(),
                );
                return Outcome::Failed;
            }

            let cell = self.nodes.entry(target.clone()).or_default().clone();
            let state = self.clone();
            *cell.get_or_init(|| state.run_node(target, chain)).await
        })
    }

    fn run_node(self: Arc<Self>, target: Target, chain: Arc<Vec<Target>>) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            let outcome = self.clone().execute(&target, chain).await;
            debug!("{} -> {:?}", target, outcome);
            if let Ok(mut outcomes) = self.outcomes.lock() {
                outcomes.push((target, outcome));
            }
            outcome
        })
    }

    async fn execute(self: Arc<Self>, target: &Target, chain: Arc<Vec<Target>>) -> Outcome {
        let (deps, action) = match self.graph.resolve(target) {
            Ok(Resolution::Task {
                deps,
                action,
            }) => (deps, action),
            Ok(Resolution::Source) => return self.check_source(target),
            Err(e) => {
                self.record_failure(e.context(format!("Failed to resolve '{target}'")));
                return Outcome::Failed;
            }
        };

        let mut child_chain = (*chain).clone();
        child_chain.push(target.clone());
        let child_chain = Arc::new(child_chain);

        let results =
            join_all(deps.iter().map(|d| self.clone().build_node(d.clone(), child_chain.clone()))).await;
        if results.iter().any(|o| !o.is_ok()) {
            debug!("Skipping {}: a dependency did not build", target);
            return Outcome::Skipped;
        }
        if self.is_cancelled() {
            return Outcome::Skipped;
        }

        let forced = deps.iter().zip(&results).any(|(d, o)| d.is_phony() && *o == Outcome::Built);
        match needs_build(target, &deps, forced) {
            Ok(false) => {
                debug!("{} is up to date", target);
                return Outcome::UpToDate;
            }
            Ok(true) => {}
            Err(e) => {
                self.record_failure(e);
                return Outcome::Failed;
            }
        }

        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            return Outcome::Skipped;
        };
        if self.is_cancelled() {
            return Outcome::Skipped;
        }

        debug!("Running action for {}", target);
        let ctx = ActionContext {
            target: target.clone(),
            dependencies: deps,
            state: self.clone(),
            chain: child_chain,
            permit: Arc::new(Mutex::new(Some(permit))),
        };
        match (action)(ctx).await {
            Ok(()) => Outcome::Built,
            Err(e) if is_cancellation(&e) => Outcome::Skipped,
            Err(e) => {
                self.record_failure(e.context(format!("Failed to build '{target}'")));
                Outcome::Failed
            }
        }
    }

    fn check_source(&self, target: &Target) -> Outcome {
        if target.as_path().is_some_and(Path::exists) {
            Outcome::UpToDate
        } else {
            self.record_failure(
                QuireError::MissingSource {
                    target: target.to_string(),
                }
                .into(),
            );
            Outcome::Failed
        }
    }

    /// Stop scheduling new actions. Running actions finish.
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record_failure(&self, error: anyhow::Error) {
        debug!("Build failure: {:#}", error);
        self.cancel();
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(error);
        }
    }
}

fn needs_build(target: &Target, deps: &[Target], forced: bool) -> Result<bool> {
    let Some(path) = target.as_path() else {
        return Ok(true);
    };
    let Some(built_at) = modified_time(path)? else {
        return Ok(true);
    };
    if forced {
        return Ok(true);
    }
    let newest = newest_modified_time(deps.iter().filter_map(Target::as_path))?;
    Ok(newest.is_some_and(|newest| newest > built_at))
}

fn is_cancellation(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<QuireError>(), Some(QuireError::Cancelled { .. }))
}

/// Handle given to an action while it runs.
pub struct ActionContext {
    target: Target,
    dependencies: Vec<Target>,
    state: Arc<SessionState>,
    chain: Arc<Vec<Target>>,
    permit: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
}

impl ActionContext {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Path of the file being built.
    pub fn output_path(&self) -> Result<&Path> {
        self.target.as_path().ok_or_else(|| {
            QuireError::Other {
                message: format!("'{}' is not a file target", self.target),
            }
            .into()
        })
    }

    pub fn dependencies(&self) -> &[Target] {
        &self.dependencies
    }

    pub fn file_dependencies(&self) -> impl Iterator<Item = &Path> {
        self.dependencies.iter().filter_map(Target::as_path)
    }

    /// The first file dependency, conventionally the primary input.
    pub fn source_path(&self) -> Result<&Path> {
        self.file_dependencies().next().ok_or_else(|| {
            QuireError::Other {
                message: format!("'{}' has no file dependency", self.target),
            }
            .into()
        })
    }

    /// Build further targets from inside an action.
    ///
    /// The action's concurrency slot is released while waiting. Fails with
    /// [`QuireError::Cancelled`] when any requested target did not build,
    /// which marks the calling target as skipped rather than failed.
    pub async fn request(&self, targets: Vec<Target>) -> Result<Vec<Outcome>> {
        let released = self.permit.lock().ok().and_then(|mut slot| slot.take());
        drop(released);

        let outcomes = join_all(
            targets.iter().map(|t| self.state.clone().build_node(t.clone(), self.chain.clone())),
        )
        .await;

        let permit = self.state.semaphore.clone().acquire_owned().await.map_err(|_| QuireError::Cancelled {
            target: self.target.to_string(),
        })?;
        if let Ok(mut slot) = self.permit.lock() {
            *slot = Some(permit);
        }

        if outcomes.iter().any(|o| !o.is_ok()) {
            return Err(QuireError::Cancelled {
                target: self.target.to_string(),
            }
            .into());
        }
        Ok(outcomes)
    }
}

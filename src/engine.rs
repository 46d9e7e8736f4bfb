//! The update engine: decides which steps are outstanding, orders them and
//! runs them one at a time, checkpointing into the version ledger.
//!
//! Ordering is global across data types:
//!
//! 1. target version, ascending;
//! 2. scope: global, then namespace, then repository;
//! 3. origin: core steps before plugin steps;
//! 4. registration order.
//!
//! Relevance is decided once against the ledger as it stands when the pass
//! starts, so a global and a repository step for the same data type and
//! version both run. Only exact duplicates (same data type, version and
//! scope) are dropped. A step's version is recorded only after every scoped
//! invocation has succeeded. The first failure ends the pass.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::catalog::{NamespaceIterator, RepositoryIterator, Visitor};
use crate::ledger::VersionLedger;
use crate::step::{
    MigrationStep, NamespaceUpdateContext, RepositoryUpdateContext, StepOrigin, StepScope,
};
use crate::version::Version;
use crate::{UpdateError, UpdateResult};

/// A relevant step, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub data_type: String,
    pub target_version: Version,
    pub scope: StepScope,
    pub origin: StepOrigin,
    /// Position in the registration list.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutedStep {
    pub data_type: String,
    pub target_version: Version,
    pub scope: StepScope,
    pub invocations: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub executed: Vec<ExecutedStep>,
    /// Steps whose data type was already at or past their target version.
    pub skipped: usize,
}

impl UpdateSummary {
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    /// Total number of step bodies run, counting every scoped owner.
    pub fn invocations(&self) -> usize {
        self.executed.iter().map(|step| step.invocations).sum()
    }
}

enum Owner<'a> {
    Namespace(&'a str),
    Repository(&'a str),
}

/// Yields exactly one owner, for single-repository or single-namespace passes.
struct SingleOwner<'a>(&'a str);

impl NamespaceIterator for SingleOwner<'_> {
    fn for_each_namespace(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        visit(self.0)
    }
}

impl RepositoryIterator for SingleOwner<'_> {
    fn for_each_repository(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        visit(self.0)
    }
}

#[derive(Debug, Default)]
pub struct UpdateEngine {
    steps: Vec<MigrationStep>,
}

impl UpdateEngine {
    pub fn new(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Relevant steps in execution order. Nothing runs.
    pub fn plan(&self, ledger: &dyn VersionLedger) -> UpdateResult<Vec<PlannedStep>> {
        Ok(self.plan_for(ledger, None)?.0)
    }

    /// Runs every outstanding step. Namespace and repository steps run once
    /// per owner the iterators enumerate at the time the step starts.
    pub fn run_pending_migrations(
        &self,
        ledger: &mut dyn VersionLedger,
        namespaces: &dyn NamespaceIterator,
        repositories: &dyn RepositoryIterator,
    ) -> UpdateResult<UpdateSummary> {
        self.run_pass(ledger, namespaces, repositories, None)
    }

    /// Runs the outstanding repository steps for a single repository against
    /// a ledger that belongs to that repository.
    pub fn update_repository(
        &self,
        repository_id: &str,
        ledger: &mut dyn VersionLedger,
    ) -> UpdateResult<UpdateSummary> {
        let owner = SingleOwner(repository_id);
        self.run_pass(ledger, &owner, &owner, Some(StepScope::Repository))
    }

    /// Runs the outstanding namespace steps for a single namespace.
    pub fn update_namespace(
        &self,
        namespace: &str,
        ledger: &mut dyn VersionLedger,
    ) -> UpdateResult<UpdateSummary> {
        let owner = SingleOwner(namespace);
        self.run_pass(ledger, &owner, &owner, Some(StepScope::Namespace))
    }

    fn plan_for(
        &self,
        ledger: &dyn VersionLedger,
        only: Option<StepScope>,
    ) -> UpdateResult<(Vec<PlannedStep>, usize)> {
        let mut planned = Vec::new();
        let mut skipped = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if only.is_some_and(|scope| scope != step.scope()) {
                continue;
            }
            if is_relevant(step, ledger)? {
                planned.push(PlannedStep {
                    data_type: step.affected_data_type().to_string(),
                    target_version: step.target_version(),
                    scope: step.scope(),
                    origin: step.origin(),
                    index,
                });
            } else {
                skipped += 1;
            }
        }
        planned.sort_by(|a, b| {
            a.target_version
                .cmp(&b.target_version)
                .then(a.scope.cmp(&b.scope))
                .then(a.origin.cmp(&b.origin))
                .then(a.index.cmp(&b.index))
        });

        let mut seen = BTreeSet::new();
        planned.retain(|step| {
            let first = seen.insert((
                step.data_type.clone(),
                step.target_version.clone(),
                step.scope,
            ));
            if !first {
                info!(
                    target: "scm_update",
                    event = "update_step_skip",
                    data_type = %step.data_type,
                    target_version = %step.target_version,
                    scope = step.scope.as_str(),
                    reason = "duplicate"
                );
                skipped += 1;
            }
            first
        });
        Ok((planned, skipped))
    }

    fn run_pass(
        &self,
        ledger: &mut dyn VersionLedger,
        namespaces: &dyn NamespaceIterator,
        repositories: &dyn RepositoryIterator,
        only: Option<StepScope>,
    ) -> UpdateResult<UpdateSummary> {
        let started = Instant::now();
        let (planned, skipped) = self.plan_for(&*ledger, only)?;
        info!(
            target: "scm_update",
            event = "update_plan",
            registered = self.steps.len(),
            relevant = planned.len(),
            skipped,
            only = only.map(StepScope::as_str).unwrap_or("all")
        );

        let mut summary = UpdateSummary {
            executed: Vec::with_capacity(planned.len()),
            skipped,
        };

        for entry in &planned {
            let step = &self.steps[entry.index];
            info!(
                target: "scm_update",
                event = "update_step_start",
                data_type = %entry.data_type,
                target_version = %entry.target_version,
                scope = entry.scope.as_str(),
                origin = entry.origin.as_str()
            );
            let step_started = Instant::now();
            let invocations = match execute(step, namespaces, repositories) {
                Ok(invocations) => invocations,
                Err(err) => {
                    error!(
                        target: "scm_update",
                        event = "update_step_failed",
                        data_type = %entry.data_type,
                        target_version = %entry.target_version,
                        scope = entry.scope.as_str(),
                        code = %err.code(),
                        error = %err
                    );
                    return Err(err);
                }
            };

            ledger
                .record(&entry.data_type, &entry.target_version)
                .map_err(|err| {
                    UpdateError::new(
                        UpdateError::LEDGER_FAILED,
                        format!(
                            "could not record version {} for type {}",
                            entry.target_version, entry.data_type
                        ),
                    )
                    .with_context("data_type", entry.data_type.clone())
                    .with_context("target_version", entry.target_version.to_string())
                    .with_cause(err)
                })?;

            let duration_ms = step_started.elapsed().as_millis() as u64;
            info!(
                target: "scm_update",
                event = "update_step_applied",
                data_type = %entry.data_type,
                target_version = %entry.target_version,
                scope = entry.scope.as_str(),
                invocations,
                duration_ms
            );
            summary.executed.push(ExecutedStep {
                data_type: entry.data_type.clone(),
                target_version: entry.target_version.clone(),
                scope: entry.scope,
                invocations,
                duration_ms,
            });
        }

        info!(
            target: "scm_update",
            event = "update_pass_complete",
            executed = summary.executed_count(),
            invocations = summary.invocations(),
            skipped = summary.skipped,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(summary)
    }
}

/// Convenience wrapper for hosts that do not keep the engine around.
pub fn run_pending_migrations(
    steps: Vec<MigrationStep>,
    ledger: &mut dyn VersionLedger,
    namespaces: &dyn NamespaceIterator,
    repositories: &dyn RepositoryIterator,
) -> UpdateResult<UpdateSummary> {
    UpdateEngine::new(steps).run_pending_migrations(ledger, namespaces, repositories)
}

fn is_relevant(step: &MigrationStep, ledger: &dyn VersionLedger) -> UpdateResult<bool> {
    let data_type = step.affected_data_type();
    let recorded = ledger.get(data_type).map_err(|err| {
        UpdateError::new(
            UpdateError::LEDGER_FAILED,
            format!("could not read recorded version for type {data_type}"),
        )
        .with_context("data_type", data_type.to_string())
        .with_cause(err)
    })?;
    Ok(match recorded {
        Some(recorded) => step.target_version().is_newer(&recorded),
        None => true,
    })
}

fn execute(
    step: &MigrationStep,
    namespaces: &dyn NamespaceIterator,
    repositories: &dyn RepositoryIterator,
) -> UpdateResult<usize> {
    match step {
        MigrationStep::Global(global) => {
            global
                .do_update()
                .map_err(|err| step_failure(step, None, err))?;
            Ok(1)
        }
        MigrationStep::Namespace(scoped) => {
            let mut invocations = 0;
            namespaces
                .for_each_namespace(&mut |namespace| {
                    debug!(
                        target: "scm_update",
                        event = "update_step_invoke",
                        data_type = %step.affected_data_type(),
                        namespace = %namespace
                    );
                    scoped
                        .do_update(&NamespaceUpdateContext::new(namespace))
                        .map_err(|err| step_failure(step, Some(Owner::Namespace(namespace)), err))?;
                    invocations += 1;
                    Ok(())
                })
                .map_err(|err| iteration_failure(step, err))?;
            Ok(invocations)
        }
        MigrationStep::Repository(scoped) => {
            let mut invocations = 0;
            repositories
                .for_each_repository(&mut |repository_id| {
                    debug!(
                        target: "scm_update",
                        event = "update_step_invoke",
                        data_type = %step.affected_data_type(),
                        repository = %repository_id
                    );
                    scoped
                        .do_update(&RepositoryUpdateContext::new(repository_id))
                        .map_err(|err| {
                            step_failure(step, Some(Owner::Repository(repository_id)), err)
                        })?;
                    invocations += 1;
                    Ok(())
                })
                .map_err(|err| iteration_failure(step, err))?;
            Ok(invocations)
        }
    }
}

fn step_context(step: &MigrationStep, error: UpdateError) -> UpdateError {
    error
        .with_context("data_type", step.affected_data_type().to_string())
        .with_context("target_version", step.target_version().to_string())
        .with_context("scope", step.scope().as_str())
}

fn step_failure(step: &MigrationStep, owner: Option<Owner<'_>>, cause: anyhow::Error) -> UpdateError {
    let mut message = format!(
        "could not execute update for type {} to version {}",
        step.affected_data_type(),
        step.target_version()
    );
    let mut context = Vec::new();
    match owner {
        Some(Owner::Namespace(namespace)) => {
            message.push_str(&format!(" for namespace {namespace}"));
            context.push(("namespace", namespace.to_string()));
        }
        Some(Owner::Repository(repository_id)) => {
            message.push_str(&format!(" for repository id {repository_id}"));
            context.push(("repository", repository_id.to_string()));
        }
        None => {}
    }
    let error = UpdateError::new(UpdateError::STEP_FAILED, message).with_contexts(context);
    step_context(step, error).with_cause(cause)
}

fn iteration_failure(step: &MigrationStep, error: UpdateError) -> UpdateError {
    if error.code() == UpdateError::STEP_FAILED {
        return error;
    }
    let message = format!(
        "could not enumerate {} owners for type {} to version {}",
        step.scope(),
        step.affected_data_type(),
        step.target_version()
    );
    step_context(step, UpdateError::new(UpdateError::ITERATION_FAILED, message)).with_cause(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryVersionLedger;
    use crate::step::{GlobalUpdateStep, RepositoryUpdateStep, UpdateStepTarget};

    struct Fixed {
        data_type: &'static str,
        version: Version,
        origin: StepOrigin,
    }

    impl Fixed {
        fn new(data_type: &'static str, major: u32) -> Self {
            Self {
                data_type,
                version: Version::new(major, 0, 0),
                origin: StepOrigin::Plugin,
            }
        }

        fn core(mut self) -> Self {
            self.origin = StepOrigin::Core;
            self
        }
    }

    impl UpdateStepTarget for Fixed {
        fn target_version(&self) -> Version {
            self.version.clone()
        }

        fn affected_data_type(&self) -> &str {
            self.data_type
        }

        fn origin(&self) -> StepOrigin {
            self.origin
        }
    }

    impl GlobalUpdateStep for Fixed {
        fn do_update(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl RepositoryUpdateStep for Fixed {
        fn do_update(&self, _context: &RepositoryUpdateContext) -> anyhow::Result<()> {
            anyhow::bail!("not writable")
        }
    }

    fn order(plan: &[PlannedStep]) -> Vec<&str> {
        plan.iter().map(|step| step.data_type.as_str()).collect()
    }

    #[test]
    fn plan_breaks_ties_by_scope_then_origin_then_registration() {
        let engine = UpdateEngine::new(vec![
            MigrationStep::repository(Fixed::new("repo", 1)),
            MigrationStep::global(Fixed::new("plugin-b", 1)),
            MigrationStep::global(Fixed::new("plugin-a", 1)),
            MigrationStep::global(Fixed::new("core", 1).core()),
            MigrationStep::global(Fixed::new("early", 0)),
        ]);
        let plan = engine.plan(&InMemoryVersionLedger::new()).unwrap();
        assert_eq!(order(&plan), vec!["early", "core", "plugin-b", "plugin-a", "repo"]);
    }

    #[test]
    fn plan_skips_recorded_versions() {
        let engine = UpdateEngine::new(vec![
            MigrationStep::global(Fixed::new("a", 1)),
            MigrationStep::global(Fixed::new("b", 2)),
        ]);
        let ledger = InMemoryVersionLedger::new()
            .with_entry("a", Version::new(1, 0, 0))
            .with_entry("b", Version::new(1, 5, 0));
        let plan = engine.plan(&ledger).unwrap();
        assert_eq!(order(&plan), vec!["b"]);
    }

    #[test]
    fn plan_keeps_each_scope_but_drops_exact_duplicates() {
        let engine = UpdateEngine::new(vec![
            MigrationStep::repository(Fixed::new("xml", 1)),
            MigrationStep::global(Fixed::new("xml", 1)),
            MigrationStep::global(Fixed::new("xml", 1)),
        ]);
        let (plan, skipped) = engine.plan_for(&InMemoryVersionLedger::new(), None).unwrap();
        let scopes: Vec<StepScope> = plan.iter().map(|step| step.scope).collect();
        assert_eq!(scopes, vec![StepScope::Global, StepScope::Repository]);
        assert_eq!(plan[0].index, 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn single_repository_failure_names_the_repository() {
        let engine = UpdateEngine::new(vec![
            MigrationStep::global(Fixed::new("global", 1)),
            MigrationStep::repository(Fixed::new("repo", 1)),
        ]);
        let mut ledger = InMemoryVersionLedger::new();
        let err = engine
            .update_repository("42", &mut ledger)
            .expect_err("repository step fails");

        assert_eq!(err.code(), UpdateError::STEP_FAILED);
        assert_eq!(
            err.message(),
            "could not execute update for type repo to version 1.0.0 for repository id 42"
        );
        assert_eq!(err.context_value("repository"), Some("42"));
        assert_eq!(err.context_value("scope"), Some("repository"));
        assert_eq!(err.cause().map(|c| c.message()), Some("not writable"));
        assert!(ledger.entries().is_empty());
    }
}

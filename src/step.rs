//! Update step contracts.
//!
//! A step declares which data type it touches and the version it migrates
//! that data type to. The three shapes only differ in how often they run:
//! once per pass, once per namespace, or once per repository. Hosts hand the
//! engine a list of [`MigrationStep`] values; nothing is discovered here.

use std::fmt;

use serde::Serialize;

use crate::version::Version;

/// Facts every step declares, independent of its scope.
pub trait UpdateStepTarget {
    /// The version the affected data type has after this step ran.
    fn target_version(&self) -> Version;

    /// Opaque, usually dotted, identifier of the migrated data.
    fn affected_data_type(&self) -> &str;

    /// Core steps run before plugin steps sharing version and scope.
    fn origin(&self) -> StepOrigin {
        StepOrigin::Plugin
    }
}

/// Runs once per pass.
pub trait GlobalUpdateStep: UpdateStepTarget {
    fn do_update(&self) -> anyhow::Result<()>;
}

/// Runs once for every namespace in the catalog.
pub trait NamespaceUpdateStep: UpdateStepTarget {
    fn do_update(&self, context: &NamespaceUpdateContext) -> anyhow::Result<()>;
}

/// Runs once for every repository in the catalog.
pub trait RepositoryUpdateStep: UpdateStepTarget {
    fn do_update(&self, context: &RepositoryUpdateContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceUpdateContext {
    namespace: String,
}

impl NamespaceUpdateContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryUpdateContext {
    repository_id: String,
}

impl RepositoryUpdateContext {
    pub fn new(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
        }
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }
}

/// Breadth at which a step executes. The declaration order is the tie-break
/// order for steps sharing a target version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    Global,
    Namespace,
    Repository,
}

impl StepScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            StepScope::Global => "global",
            StepScope::Namespace => "namespace",
            StepScope::Repository => "repository",
        }
    }
}

impl fmt::Display for StepScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who ships a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOrigin {
    Core,
    Plugin,
}

impl StepOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            StepOrigin::Core => "core",
            StepOrigin::Plugin => "plugin",
        }
    }
}

/// A registered step, tagged with its scope.
pub enum MigrationStep {
    Global(Box<dyn GlobalUpdateStep>),
    Namespace(Box<dyn NamespaceUpdateStep>),
    Repository(Box<dyn RepositoryUpdateStep>),
}

impl MigrationStep {
    pub fn global(step: impl GlobalUpdateStep + 'static) -> Self {
        MigrationStep::Global(Box::new(step))
    }

    pub fn namespace(step: impl NamespaceUpdateStep + 'static) -> Self {
        MigrationStep::Namespace(Box::new(step))
    }

    pub fn repository(step: impl RepositoryUpdateStep + 'static) -> Self {
        MigrationStep::Repository(Box::new(step))
    }

    pub fn scope(&self) -> StepScope {
        match self {
            MigrationStep::Global(_) => StepScope::Global,
            MigrationStep::Namespace(_) => StepScope::Namespace,
            MigrationStep::Repository(_) => StepScope::Repository,
        }
    }

    pub fn affected_data_type(&self) -> &str {
        match self {
            MigrationStep::Global(step) => step.affected_data_type(),
            MigrationStep::Namespace(step) => step.affected_data_type(),
            MigrationStep::Repository(step) => step.affected_data_type(),
        }
    }

    pub fn target_version(&self) -> Version {
        match self {
            MigrationStep::Global(step) => step.target_version(),
            MigrationStep::Namespace(step) => step.target_version(),
            MigrationStep::Repository(step) => step.target_version(),
        }
    }

    pub fn origin(&self) -> StepOrigin {
        match self {
            MigrationStep::Global(step) => step.origin(),
            MigrationStep::Namespace(step) => step.origin(),
            MigrationStep::Repository(step) => step.origin(),
        }
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("scope", &self.scope())
            .field("data_type", &self.affected_data_type())
            .field("target_version", &self.target_version().to_string())
            .field("origin", &self.origin())
            .finish()
    }
}

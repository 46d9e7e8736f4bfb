//! Data migration engine for the SCM server.
//!
//! Every persisted data type carries a version. Core and plugins register
//! [`MigrationStep`]s that move a data type to a newer version; the
//! [`UpdateEngine`] runs the outstanding ones at startup, in version order,
//! and records progress in a [`VersionLedger`] so nothing runs twice.

pub mod catalog;
pub mod config;
pub mod engine;
mod error;
pub mod ledger;
pub mod legacy;
pub mod logging;
pub mod migration_guard;
pub mod step;
pub mod store;
pub mod time;
pub mod version;

pub use catalog::{DirectoryCatalog, NamespaceIterator, RepositoryIterator, StaticCatalog};
pub use config::UpdateConfig;
pub use engine::{run_pending_migrations, ExecutedStep, PlannedStep, UpdateEngine, UpdateSummary};
pub use error::{UpdateError, UpdateResult};
pub use ledger::{InMemoryVersionLedger, JsonFileVersionLedger, VersionLedger};
pub use step::{
    GlobalUpdateStep, MigrationStep, NamespaceUpdateContext, NamespaceUpdateStep,
    RepositoryUpdateContext, RepositoryUpdateStep, StepOrigin, StepScope, UpdateStepTarget,
};
pub use version::{Qualifier, Version};

/// Commit the binary was built from, or `unknown`.
pub const GIT_HASH: &str = env!("SCM_UPDATE_GIT_HASH");

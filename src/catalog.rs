//! Namespace and repository enumeration for scoped steps.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::UpdateConfig;
use crate::store::fs_ops::write_atomic;
use crate::{UpdateError, UpdateResult};

/// File inside every repository directory describing the repository.
pub const METADATA_FILE_NAME: &str = "metadata.json";

pub type Visitor<'a> = dyn FnMut(&str) -> UpdateResult<()> + 'a;

/// Enumerates the namespaces present at call time, in a stable order.
/// An error returned by `visit` stops the enumeration and is propagated.
pub trait NamespaceIterator {
    fn for_each_namespace(&self, visit: &mut Visitor<'_>) -> UpdateResult<()>;
}

/// Enumerates the repository ids present at call time, in a stable order.
pub trait RepositoryIterator {
    fn for_each_repository(&self, visit: &mut Visitor<'_>) -> UpdateResult<()>;
}

/// Fixed lists, for tests and hosts that already hold the catalog in memory.
/// Entries added while a pass is running are seen by the next enumeration.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    namespaces: Mutex<Vec<String>>,
    repositories: Mutex<Vec<String>>,
}

impl StaticCatalog {
    pub fn new<N, R>(namespaces: N, repositories: R) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            namespaces: Mutex::new(namespaces.into_iter().map(Into::into).collect()),
            repositories: Mutex::new(repositories.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add_namespace(&self, namespace: impl Into<String>) {
        self.namespaces.lock().expect("namespace list lock").push(namespace.into());
    }

    pub fn add_repository(&self, repository_id: impl Into<String>) {
        self.repositories.lock().expect("repository list lock").push(repository_id.into());
    }
}

impl NamespaceIterator for StaticCatalog {
    fn for_each_namespace(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        let snapshot = self.namespaces.lock().expect("namespace list lock").clone();
        snapshot.iter().try_for_each(|namespace| visit(namespace.as_str()))
    }
}

impl RepositoryIterator for StaticCatalog {
    fn for_each_repository(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        let snapshot = self.repositories.lock().expect("repository list lock").clone();
        snapshot.iter().try_for_each(|repository_id| visit(repository_id.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub id: String,
    pub namespace: String,
    pub name: String,
}

impl RepositoryMetadata {
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn read(repository_dir: &Path) -> UpdateResult<Self> {
        let path = repository_dir.join(METADATA_FILE_NAME);
        let bytes = fs::read(&path).map_err(|err| {
            UpdateError::from(err).with_context("path", path.display().to_string())
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|err| UpdateError::from(err).with_context("path", path.display().to_string()))
    }

    /// Writes `metadata.json` into `repository_dir`, creating the directory.
    pub fn write(&self, repository_dir: &Path) -> UpdateResult<()> {
        fs::create_dir_all(repository_dir).map_err(|err| {
            UpdateError::from(err).with_context("path", repository_dir.display().to_string())
        })?;
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(&repository_dir.join(METADATA_FILE_NAME), &bytes)
    }
}

/// Catalog backed by `<home>/repositories/<id>/metadata.json`. The directory
/// is re-read on every call.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            root: config.repositories_dir(),
        }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repositories sorted by id. Directories without metadata are ignored.
    pub fn repositories(&self) -> UpdateResult<Vec<RepositoryMetadata>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(UpdateError::from(err)
                    .with_context("operation", "list_repositories")
                    .with_context("path", self.root.display().to_string()))
            }
        };

        let mut repositories = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                UpdateError::from(err).with_context("path", self.root.display().to_string())
            })?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            if !dir.join(METADATA_FILE_NAME).is_file() {
                warn!(
                    target: "scm_update",
                    event = "repository_metadata_missing",
                    path = %dir.display()
                );
                continue;
            }
            repositories.push(RepositoryMetadata::read(&dir)?);
        }
        repositories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(repositories)
    }
}

impl NamespaceIterator for DirectoryCatalog {
    fn for_each_namespace(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        let namespaces: BTreeSet<String> = self
            .repositories()?
            .into_iter()
            .map(|repository| repository.namespace)
            .collect();
        namespaces.iter().try_for_each(|namespace| visit(namespace.as_str()))
    }
}

impl RepositoryIterator for DirectoryCatalog {
    fn for_each_repository(&self, visit: &mut Visitor<'_>) -> UpdateResult<()> {
        self.repositories()?
            .iter()
            .try_for_each(|repository| visit(repository.id.as_str()))
    }
}

use std::path::PathBuf;

use tracing::{debug, info};

use super::fs_ops::{move_path, remove_path};
use super::{store_path, validate_component, StoreOwner, StoreType};
use crate::config::UpdateConfig;
use crate::{UpdateError, UpdateResult};

/// Collects the coordinates of one store; see [`StoreRelocation::build`].
///
/// ```ignore
/// StoreRelocation::new(&config)
///     .for_type(StoreType::Data)
///     .for_name("acl")
///     .for_repository("42")
///     .build()?
///     .rename_store("permissions")?;
/// ```
#[derive(Debug, Clone)]
pub struct StoreRelocation<'c> {
    config: &'c UpdateConfig,
    store_type: Option<StoreType>,
    name: Option<String>,
    repository_id: Option<String>,
    namespace: Option<String>,
}

impl<'c> StoreRelocation<'c> {
    pub fn new(config: &'c UpdateConfig) -> Self {
        Self {
            config,
            store_type: None,
            name: None,
            repository_id: None,
            namespace: None,
        }
    }

    pub fn for_type(mut self, store_type: StoreType) -> Self {
        self.store_type = Some(store_type);
        self
    }

    pub fn for_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn for_repository(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    pub fn for_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Type and name are required; at most one of repository and namespace
    /// may be set. Without either the store is global.
    pub fn build(self) -> UpdateResult<StoreUpdater> {
        let store_type = self.store_type.ok_or_else(|| {
            UpdateError::new("STORE/MISSING_TYPE", "Store type must be set.")
        })?;
        let name = self
            .name
            .ok_or_else(|| UpdateError::new("STORE/MISSING_NAME", "Store name must be set."))?;
        validate_component("store name", &name)?;

        let owner = match (self.repository_id, self.namespace) {
            (Some(repository_id), Some(namespace)) => {
                return Err(UpdateError::new(
                    "STORE/AMBIGUOUS_SCOPE",
                    "A store belongs to a repository or a namespace, not both.",
                )
                .with_context("repository", repository_id)
                .with_context("namespace", namespace))
            }
            (Some(repository_id), None) => {
                validate_component("repository id", &repository_id)?;
                StoreOwner::Repository(repository_id)
            }
            (None, Some(namespace)) => {
                validate_component("namespace", &namespace)?;
                StoreOwner::Namespace(namespace)
            }
            (None, None) => StoreOwner::Global,
        };

        Ok(StoreUpdater {
            config: self.config.clone(),
            store_type,
            name,
            owner,
        })
    }
}

/// Rename or delete one store.
#[derive(Debug, Clone)]
pub struct StoreUpdater {
    config: UpdateConfig,
    store_type: StoreType,
    name: String,
    owner: StoreOwner,
}

impl StoreUpdater {
    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &StoreOwner {
        &self.owner
    }

    pub fn path(&self) -> PathBuf {
        store_path(&self.config, self.store_type, &self.name, &self.owner)
    }

    /// A store that does not exist is left alone. Renaming onto an existing
    /// store fails.
    pub fn rename_store(&self, new_name: &str) -> UpdateResult<()> {
        validate_component("store name", new_name)?;
        let from = self.path();
        let to = store_path(&self.config, self.store_type, new_name, &self.owner);

        if !from.exists() {
            debug!(
                target: "scm_update",
                event = "store_rename_skipped",
                store_type = self.store_type.as_str(),
                store = %self.name,
                owner = %self.owner,
                path = %from.display()
            );
            return Ok(());
        }
        if to.exists() {
            return Err(UpdateError::new(
                "STORE/TARGET_EXISTS",
                format!("Cannot rename store {} to {new_name}: target exists.", self.name),
            )
            .with_context("from", from.display().to_string())
            .with_context("to", to.display().to_string()));
        }

        move_path(&from, &to).map_err(|err| {
            UpdateError::new(
                "STORE/RENAME",
                format!("Could not rename store {} to {new_name}.", self.name),
            )
            .with_context("store_type", self.store_type.as_str())
            .with_context("owner", self.owner.to_string())
            .with_cause(err)
        })?;
        info!(
            target: "scm_update",
            event = "store_renamed",
            store_type = self.store_type.as_str(),
            store = %self.name,
            new_name = %new_name,
            owner = %self.owner
        );
        Ok(())
    }

    /// Returns whether anything was removed.
    pub fn delete_store(&self) -> UpdateResult<bool> {
        let path = self.path();
        let removed = remove_path(&path).map_err(|err| {
            UpdateError::new(
                "STORE/DELETE",
                format!("Could not delete store {}.", self.name),
            )
            .with_context("store_type", self.store_type.as_str())
            .with_context("owner", self.owner.to_string())
            .with_cause(err)
        })?;
        info!(
            target: "scm_update",
            event = "store_deleted",
            store_type = self.store_type.as_str(),
            store = %self.name,
            owner = %self.owner,
            removed
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn build_requires_type_and_name() {
        let config = UpdateConfig::new("/srv/scm");
        let err = StoreRelocation::new(&config).for_name("acl").build().unwrap_err();
        assert_eq!(err.code(), "STORE/MISSING_TYPE");
        let err = StoreRelocation::new(&config)
            .for_type(StoreType::Data)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "STORE/MISSING_NAME");
    }

    #[test]
    fn build_rejects_two_owners() {
        let config = UpdateConfig::new("/srv/scm");
        let err = StoreRelocation::new(&config)
            .for_type(StoreType::Data)
            .for_name("acl")
            .for_repository("42")
            .for_namespace("hitchhiker")
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "STORE/AMBIGUOUS_SCOPE");
    }

    #[test]
    fn rename_global_config_store() {
        let dir = tempdir().unwrap();
        let config = UpdateConfig::new(dir.path());
        fs::create_dir_all(config.config_dir()).unwrap();
        fs::write(config.config_dir().join("old.json"), b"{}").unwrap();

        StoreRelocation::new(&config)
            .for_type(StoreType::Config)
            .for_name("old")
            .build()
            .unwrap()
            .rename_store("new")
            .unwrap();

        assert!(!config.config_dir().join("old.json").exists());
        assert!(config.config_dir().join("new.json").exists());
    }

    #[test]
    fn rename_missing_store_is_noop() {
        let dir = tempdir().unwrap();
        let config = UpdateConfig::new(dir.path());
        let updater = StoreRelocation::new(&config)
            .for_type(StoreType::Blob)
            .for_name("ghost")
            .for_namespace("hitchhiker")
            .build()
            .unwrap();
        updater.rename_store("spirit").unwrap();
        assert!(!updater.path().exists());
        assert!(!updater.delete_store().unwrap());
    }
}

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::fs_ops::move_path;
use super::{
    repository_store_dir, validate_component, StoreType, BACKUP_SUFFIX, STORE_FILE_EXTENSION,
};
use crate::config::UpdateConfig;
use crate::{UpdateError, UpdateResult};

/// File moves for configuration files and file-per-owner data stores.
#[derive(Debug, Clone, Copy)]
pub struct PropertyFileAccess<'c> {
    config: &'c UpdateConfig,
}

impl<'c> PropertyFileAccess<'c> {
    pub fn new(config: &'c UpdateConfig) -> Self {
        Self { config }
    }

    /// Renames `config/<old_name>.json` to `config/<new_name>.json`. Returns
    /// `false` when there was nothing to rename.
    pub fn rename_global_configuration_file(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> UpdateResult<bool> {
        validate_component("configuration name", old_name)?;
        validate_component("configuration name", new_name)?;
        let from = self.configuration_file(old_name);
        if !from.exists() {
            return Ok(false);
        }
        let to = self.configuration_file(new_name);
        move_path(&from, &to)?;
        log_moved(&from, &to);
        Ok(true)
    }

    /// Moves `config/<file_name>` aside to `config/<file_name>.v1.backup`
    /// once its content has been migrated.
    pub fn backup_legacy_file(&self, file_name: &str) -> UpdateResult<Option<PathBuf>> {
        validate_component("file name", file_name)?;
        let from = self.config.config_dir().join(file_name);
        if !from.exists() {
            return Ok(None);
        }
        let to = self
            .config
            .config_dir()
            .join(format!("{file_name}{BACKUP_SUFFIX}"));
        move_path(&from, &to).map_err(|err| {
            UpdateError::new("STORE/BACKUP", format!("Could not back up legacy file {file_name}."))
                .with_cause(err)
        })?;
        log_moved(&from, &to);
        Ok(Some(to))
    }

    pub fn for_store_name(&self, store_name: &str) -> StoreFileTools<'c> {
        StoreFileTools {
            config: self.config,
            store_name: store_name.to_string(),
        }
    }

    fn configuration_file(&self, name: &str) -> PathBuf {
        self.config
            .config_dir()
            .join(format!("{name}.{STORE_FILE_EXTENSION}"))
    }
}

/// Files of one global data store, `var/data/<store>/<owner id>.json`.
#[derive(Debug, Clone)]
pub struct StoreFileTools<'c> {
    config: &'c UpdateConfig,
    store_name: String,
}

impl StoreFileTools<'_> {
    pub fn store_directory(&self) -> PathBuf {
        self.config
            .var_dir()
            .join(StoreType::Data.as_str())
            .join(&self.store_name)
    }

    pub fn has_store_directory(&self) -> bool {
        self.store_directory().is_dir()
    }

    /// Visits every `*.json` file in the store with its owner id (the file
    /// stem), sorted by file name.
    pub fn for_store_files<F>(&self, mut visit: F) -> UpdateResult<()>
    where
        F: FnMut(&Path, &str) -> UpdateResult<()>,
    {
        let dir = self.store_directory();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(UpdateError::from(err).with_context("path", dir.display().to_string()))
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| UpdateError::from(err).with_context("path", dir.display().to_string()))?
                .path();
            let is_store_file = path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(STORE_FILE_EXTENSION);
            if is_store_file {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let Some(owner_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            visit(&path, owner_id)?;
        }
        Ok(())
    }

    /// Moves one store file into the data store of `repository_id`, keeping
    /// its file name.
    pub fn move_as_repository_store(
        &self,
        store_file: &Path,
        repository_id: &str,
    ) -> UpdateResult<PathBuf> {
        validate_component("repository id", repository_id)?;
        let file_name = store_file.file_name().ok_or_else(|| {
            UpdateError::new("STORE/INVALID_FILE", "Store file has no file name.")
                .with_context("path", store_file.display().to_string())
        })?;
        let target = repository_store_dir(self.config, repository_id, StoreType::Data)
            .join(&self.store_name)
            .join(file_name);
        move_path(store_file, &target)?;
        log_moved(store_file, &target);
        Ok(target)
    }
}

fn log_moved(from: &Path, to: &Path) {
    info!(
        target: "scm_update",
        event = "store_file_moved",
        from = %from.display(),
        to = %to.display()
    );
}

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::fs_ops::move_path;
use super::{repository_store_dir, validate_component, StoreType};
use crate::config::UpdateConfig;
use crate::{UpdateError, UpdateResult};

/// Global blob stores, one directory each under `var/blob`.
#[derive(Debug, Clone, Copy)]
pub struct BlobDirectoryAccess<'c> {
    config: &'c UpdateConfig,
}

impl<'c> BlobDirectoryAccess<'c> {
    pub fn new(config: &'c UpdateConfig) -> Self {
        Self { config }
    }

    pub fn blob_root(&self) -> PathBuf {
        self.config.var_dir().join(StoreType::Blob.as_str())
    }

    /// Visits every blob directory, sorted by name.
    pub fn for_blob_directories<F>(&self, mut visit: F) -> UpdateResult<()>
    where
        F: FnMut(&Path) -> UpdateResult<()>,
    {
        let root = self.blob_root();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(UpdateError::from(err).with_context("path", root.display().to_string()))
            }
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| UpdateError::from(err).with_context("path", root.display().to_string()))?
                .path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        dirs.iter().try_for_each(|dir| visit(dir))
    }

    /// Moves a blob directory to `repositories/<id>/store/blob/<new_name>`.
    pub fn move_to_repository_blob_store(
        &self,
        blob_directory: &Path,
        new_name: &str,
        repository_id: &str,
    ) -> UpdateResult<PathBuf> {
        validate_component("blob store name", new_name)?;
        validate_component("repository id", repository_id)?;
        let target = repository_store_dir(self.config, repository_id, StoreType::Blob).join(new_name);
        move_path(blob_directory, &target)?;
        info!(
            target: "scm_update",
            event = "store_file_moved",
            from = %blob_directory.display(),
            to = %target.display()
        );
        Ok(target)
    }
}

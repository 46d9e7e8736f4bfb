//! Physical layout of persisted stores and the file moves migration steps
//! use to restructure it.
//!
//! | owner      | config                                   | data / blob                                   |
//! |------------|------------------------------------------|-----------------------------------------------|
//! | global     | `config/<name>.json`                     | `var/<type>/<name>/`                          |
//! | repository | `repositories/<id>/store/config/<name>.json` | `repositories/<id>/store/<type>/<name>/`  |
//! | namespace  | `var/namespaces/<ns>/config/<name>.json` | `var/namespaces/<ns>/<type>/<name>/`          |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::UpdateConfig;
use crate::{UpdateError, UpdateResult};

mod blob_dirs;
pub mod fs_ops;
mod property_files;
mod relocation;

pub use blob_dirs::BlobDirectoryAccess;
pub use property_files::{PropertyFileAccess, StoreFileTools};
pub use relocation::{StoreRelocation, StoreUpdater};

pub const STORE_DIRECTORY_NAME: &str = "store";
pub const NAMESPACES_DIRECTORY_NAME: &str = "namespaces";
pub const STORE_FILE_EXTENSION: &str = "json";
pub const BACKUP_SUFFIX: &str = ".v1.backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// A single configuration document.
    Config,
    /// A directory of key/value entries.
    Data,
    /// A directory of binary blobs.
    Blob,
}

impl StoreType {
    pub const fn as_str(self) -> &'static str {
        match self {
            StoreType::Config => "config",
            StoreType::Data => "data",
            StoreType::Blob => "blob",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "config" => Ok(StoreType::Config),
            "data" => Ok(StoreType::Data),
            "blob" => Ok(StoreType::Blob),
            _ => Err(UpdateError::new(
                "STORE/UNKNOWN_TYPE",
                format!("Unknown store type '{s}'."),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOwner {
    Global,
    Repository(String),
    Namespace(String),
}

impl fmt::Display for StoreOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOwner::Global => f.write_str("global"),
            StoreOwner::Repository(id) => write!(f, "repository {id}"),
            StoreOwner::Namespace(namespace) => write!(f, "namespace {namespace}"),
        }
    }
}

/// Location of a store of the given type, name and owner.
pub fn store_path(
    config: &UpdateConfig,
    store_type: StoreType,
    name: &str,
    owner: &StoreOwner,
) -> PathBuf {
    let file_name = match store_type {
        StoreType::Config => format!("{name}.{STORE_FILE_EXTENSION}"),
        StoreType::Data | StoreType::Blob => name.to_string(),
    };
    match (owner, store_type) {
        (StoreOwner::Global, StoreType::Config) => config.config_dir().join(file_name),
        (StoreOwner::Global, _) => config.var_dir().join(store_type.as_str()).join(file_name),
        (StoreOwner::Repository(id), _) => repository_store_dir(config, id, store_type).join(file_name),
        (StoreOwner::Namespace(namespace), _) => config
            .var_dir()
            .join(NAMESPACES_DIRECTORY_NAME)
            .join(namespace)
            .join(store_type.as_str())
            .join(file_name),
    }
}

/// `repositories/<id>/store/<type>`.
pub fn repository_store_dir(config: &UpdateConfig, repository_id: &str, store_type: StoreType) -> PathBuf {
    config
        .repository_dir(repository_id)
        .join(STORE_DIRECTORY_NAME)
        .join(store_type.as_str())
}

/// Store names and owner ids become path components, so they must be plain
/// single components.
pub(crate) fn validate_component(kind: &str, value: &str) -> UpdateResult<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0');
    if invalid {
        return Err(UpdateError::new(
            "STORE/INVALID_NAME",
            format!("Invalid {kind} '{value}'."),
        )
        .with_context("kind", kind.to_string())
        .with_context("value", value.to_string()));
    }
    Ok(())
}

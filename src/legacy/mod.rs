//! Read access to the pre-rewrite property bags of repositories, users and
//! groups. Only one-time upgrade steps use this.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::UpdateConfig;
use crate::store::fs_ops::write_atomic;
use crate::{UpdateError, UpdateResult};

mod reader;

pub use reader::{
    GroupV1PropertyReader, Instance, RepositoryV1PropertyReader, UserV1PropertyReader,
    V1PropertyReader,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Property {
    pub key: String,
    pub value: String,
}

impl V1Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered key/value pairs of one legacy owner. Keys may repeat; lookups
/// return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct V1Properties {
    properties: Vec<V1Property>,
}

/// Owner id to property bag, as stored by a legacy store.
pub type LegacyPropertyMap = BTreeMap<String, V1Properties>;

impl V1Properties {
    pub fn new(properties: Vec<V1Property>) -> Self {
        Self { properties }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| property.key == key)
            .map(|property| property.value.as_str())
    }

    /// `true` only for a case-insensitive `"true"`.
    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.get(key).map(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Parses the value with `E::from_str`. An unknown value is an error, not
    /// an absent one.
    pub fn get_enum<E>(&self, key: &str) -> UpdateResult<Option<E>>
    where
        E: FromStr,
        E::Err: fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value.parse::<E>().map(Some).map_err(|err| {
            UpdateError::new(
                "LEGACY/UNKNOWN_ENUM",
                format!("Unknown value '{value}' for legacy property '{key}'."),
            )
            .with_context("key", key.to_string())
            .with_context("value", value.to_string())
            .with_cause(err.to_string())
        })
    }

    /// `false` for an empty key list.
    pub fn has_any<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().any(|key| self.contains_key(key.as_ref()))
    }

    /// `true` for an empty key list.
    pub fn has_all<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().all(|key| self.contains_key(key.as_ref()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.iter().any(|property| property.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|property| property.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &V1Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for V1Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(key, value)| V1Property::new(key, value))
                .collect(),
        )
    }
}

/// `<config>/<store name>.json`.
pub fn legacy_store_path(config: &UpdateConfig, store_name: &str) -> PathBuf {
    config.config_dir().join(format!("{store_name}.json"))
}

/// Reads the raw mapping a reader's instance is built from. A store that was
/// never written yields an empty mapping.
pub fn load_legacy_store(
    config: &UpdateConfig,
    reader: &dyn V1PropertyReader,
) -> UpdateResult<LegacyPropertyMap> {
    let path = legacy_store_path(config, reader.store_name());
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(
                target: "scm_update",
                event = "legacy_store_missing",
                store = reader.store_name(),
                path = %path.display()
            );
            return Ok(LegacyPropertyMap::new());
        }
        Err(err) => {
            return Err(UpdateError::from(err)
                .with_context("store", reader.store_name())
                .with_context("path", path.display().to_string()))
        }
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        UpdateError::new("LEGACY/READ", "Legacy property store is not valid JSON.")
            .with_context("store", reader.store_name())
            .with_context("path", path.display().to_string())
            .with_cause(err)
    })
}

/// Writes a legacy store. Used to seed fixtures and by repair tooling.
pub fn save_legacy_store(
    config: &UpdateConfig,
    store_name: &str,
    all: &LegacyPropertyMap,
) -> UpdateResult<()> {
    let path = legacy_store_path(config, store_name);
    fs::create_dir_all(config.config_dir()).map_err(|err| {
        UpdateError::from(err).with_context("path", config.config_dir().display().to_string())
    })?;
    let bytes = serde_json::to_vec_pretty(all)?;
    write_atomic(&path, &bytes)
}

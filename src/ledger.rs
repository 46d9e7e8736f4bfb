//! Version ledger: the last applied version per data type.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::fs_ops::write_atomic;
use crate::time::now_ms;
use crate::version::Version;
use crate::{UpdateError, UpdateResult};

/// Storage for applied versions. The engine owns the ledger exclusively for
/// the duration of a pass.
pub trait VersionLedger {
    fn get(&self, data_type: &str) -> UpdateResult<Option<Version>>;
    fn record(&mut self, data_type: &str, version: &Version) -> UpdateResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryVersionLedger {
    entries: BTreeMap<String, Version>,
}

impl InMemoryVersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, data_type: impl Into<String>, version: Version) -> Self {
        self.entries.insert(data_type.into(), version);
        self
    }

    pub fn entries(&self) -> &BTreeMap<String, Version> {
        &self.entries
    }
}

impl VersionLedger for InMemoryVersionLedger {
    fn get(&self, data_type: &str) -> UpdateResult<Option<Version>> {
        Ok(self.entries.get(data_type).cloned())
    }

    fn record(&mut self, data_type: &str, version: &Version) -> UpdateResult<()> {
        self.entries.insert(data_type.to_string(), version.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: String,
    pub applied_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: BTreeMap<String, LedgerEntry>,
}

/// Ledger persisted as a single JSON document, rewritten atomically on every
/// record.
#[derive(Debug)]
pub struct JsonFileVersionLedger {
    path: PathBuf,
    file: LedgerFile,
}

impl JsonFileVersionLedger {
    /// Loads the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> UpdateResult<Self> {
        let path = path.into();
        let file = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<LedgerFile>(&bytes).map_err(|err| {
                UpdateError::new("LEDGER/READ", "Version ledger is not valid JSON.")
                    .with_context("path", path.display().to_string())
                    .with_cause(err)
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target: "scm_update",
                    event = "ledger_missing",
                    path = %path.display()
                );
                LedgerFile::default()
            }
            Err(err) => {
                return Err(UpdateError::new("LEDGER/READ", "Unable to read version ledger.")
                    .with_context("path", path.display().to_string())
                    .with_cause(err))
            }
        };
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw entries as stored, including versions that no longer parse.
    pub fn entries(&self) -> &BTreeMap<String, LedgerEntry> {
        &self.file.entries
    }

    fn persist(&self) -> UpdateResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        write_atomic(&self.path, &bytes).map_err(|err| {
            UpdateError::new("LEDGER/WRITE", "Unable to write version ledger.")
                .with_context("path", self.path.display().to_string())
                .with_cause(err)
        })
    }
}

impl VersionLedger for JsonFileVersionLedger {
    fn get(&self, data_type: &str) -> UpdateResult<Option<Version>> {
        let Some(entry) = self.file.entries.get(data_type) else {
            return Ok(None);
        };
        let version = Version::parse(&entry.version);
        if version.is_none() {
            warn!(
                target: "scm_update",
                event = "ledger_entry_unparseable",
                data_type = %data_type,
                stored = %entry.version
            );
        }
        Ok(version)
    }

    fn record(&mut self, data_type: &str, version: &Version) -> UpdateResult<()> {
        let previous = self.file.entries.insert(
            data_type.to_string(),
            LedgerEntry {
                version: version.to_string(),
                applied_at: now_ms(),
            },
        );
        if let Err(err) = self.persist() {
            match previous {
                Some(entry) => self.file.entries.insert(data_type.to_string(), entry),
                None => self.file.entries.remove(data_type),
            };
            return Err(err);
        }
        Ok(())
    }
}

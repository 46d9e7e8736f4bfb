use std::fs;
use std::path::{Path, PathBuf};

use crate::{UpdateError, UpdateResult};

/// Overrides the server home directory.
pub const HOME_ENV: &str = "SCM_HOME";
/// Directory for the rolling log file; file logging is off when unset.
pub const LOG_DIR_ENV: &str = "SCM_UPDATE_LOG_DIR";

pub const CONFIG_DIRECTORY_NAME: &str = "config";
pub const VAR_DIRECTORY_NAME: &str = "var";
pub const REPOSITORIES_DIRECTORY_NAME: &str = "repositories";
pub const LEDGER_FILE_NAME: &str = "update-steps.json";

const DEFAULT_HOME_DIRECTORY_NAME: &str = ".scm";

/// On-disk layout of the server home the update engine works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    home: PathBuf,
    log_dir: Option<PathBuf>,
}

impl UpdateConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            log_dir: None,
        }
    }

    /// Resolves the home directory from an explicit value, then `SCM_HOME`,
    /// then `~/.scm`. The log directory is taken from `SCM_UPDATE_LOG_DIR`.
    pub fn resolve(explicit_home: Option<PathBuf>) -> UpdateResult<Self> {
        let home = match explicit_home {
            Some(home) => home,
            None => match std::env::var_os(HOME_ENV) {
                Some(home) if !home.is_empty() => PathBuf::from(home),
                _ => dirs::home_dir()
                    .map(|dir| dir.join(DEFAULT_HOME_DIRECTORY_NAME))
                    .ok_or_else(|| {
                        UpdateError::new(
                            "CONFIG/NO_HOME",
                            "Unable to determine the server home directory.",
                        )
                        .with_context("env", HOME_ENV)
                    })?,
            },
        };

        let log_dir = std::env::var_os(LOG_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Self { home, log_dir })
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home.join(CONFIG_DIRECTORY_NAME)
    }

    pub fn var_dir(&self) -> PathBuf {
        self.home.join(VAR_DIRECTORY_NAME)
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.home.join(REPOSITORIES_DIRECTORY_NAME)
    }

    /// Default location of a repository's directory.
    pub fn repository_dir(&self, repository_id: &str) -> PathBuf {
        self.repositories_dir().join(repository_id)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config_dir().join(LEDGER_FILE_NAME)
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Creates the directories the engine writes into.
    pub fn ensure_layout(&self) -> UpdateResult<()> {
        for dir in [self.config_dir(), self.var_dir(), self.repositories_dir()] {
            fs::create_dir_all(&dir).map_err(|err| {
                UpdateError::from(err)
                    .with_context("operation", "ensure_layout")
                    .with_context("path", dir.display().to_string())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_home_wins() {
        let config = UpdateConfig::resolve(Some(PathBuf::from("/srv/scm"))).expect("resolve");
        assert_eq!(config.home(), Path::new("/srv/scm"));
        assert_eq!(config.ledger_path(), Path::new("/srv/scm/config/update-steps.json"));
        assert_eq!(config.repository_dir("42"), Path::new("/srv/scm/repositories/42"));
    }

    #[test]
    fn ensure_layout_creates_directories() {
        let dir = tempdir().unwrap();
        let config = UpdateConfig::new(dir.path().join("home"));
        config.ensure_layout().expect("layout");
        assert!(config.config_dir().is_dir());
        assert!(config.var_dir().is_dir());
        assert!(config.repositories_dir().is_dir());
    }
}

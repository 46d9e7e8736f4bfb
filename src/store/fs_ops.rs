use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{UpdateError, UpdateResult};

#[cfg(unix)]
const EXDEV: i32 = 18;

fn sync_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

fn ensure_parent(path: &Path, operation: &str) -> UpdateResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            UpdateError::from(err)
                .with_context("operation", operation.to_string())
                .with_context("path", parent.display().to_string())
        })?;
    }
    Ok(())
}

/// Write `contents` to `path` through a synced temp file in the same
/// directory, so readers see either the old or the new file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> UpdateResult<()> {
    let parent = path.parent().ok_or_else(|| {
        UpdateError::new("FS/NO_PARENT", "Path does not have a parent directory")
            .with_context("path", path.display().to_string())
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| {
        UpdateError::from(err)
            .with_context("operation", "write_atomic_create_tmp")
            .with_context("path", parent.display().to_string())
    })?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|err| {
            UpdateError::from(err)
                .with_context("operation", "write_atomic_write_tmp")
                .with_context("path", tmp.path().display().to_string())
        })?;
    tmp.persist(path).map_err(|err| {
        UpdateError::from(err.error)
            .with_context("operation", "write_atomic_rename")
            .with_context("to", path.display().to_string())
    })?;
    sync_dir(parent).map_err(|err| {
        UpdateError::from(err)
            .with_context("operation", "write_atomic_sync_parent")
            .with_context("path", parent.display().to_string())
    })?;
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_file() {
        fs::copy(from, to)?;
        return Ok(());
    }
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a file or directory. Refuses to overwrite an existing target. A move
/// across file systems falls back to copy-then-delete.
pub fn move_path(from: &Path, to: &Path) -> UpdateResult<()> {
    if to.exists() {
        return Err(UpdateError::new(
            "FS/TARGET_EXISTS",
            "Destination already exists.",
        )
        .with_context("from", from.display().to_string())
        .with_context("to", to.display().to_string()));
    }
    ensure_parent(to, "move_create_parent")?;

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        #[cfg(unix)]
        Err(err) if err.raw_os_error() == Some(EXDEV) => {
            copy_tree(from, to)
                .and_then(|_| remove_existing(from))
                .map_err(|err| {
                    UpdateError::from(err)
                        .with_context("operation", "move_copy_fallback")
                        .with_context("from", from.display().to_string())
                        .with_context("to", to.display().to_string())
                })
        }
        Err(err) => Err(UpdateError::from(err)
            .with_context("operation", "move")
            .with_context("from", from.display().to_string())
            .with_context("to", to.display().to_string())),
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Remove a file or directory tree. Returns `false` when nothing was there.
pub fn remove_path(path: &Path) -> UpdateResult<bool> {
    match remove_existing(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(UpdateError::from(err)
            .with_context("operation", "remove")
            .with_context("path", path.display().to_string())),
    }
}

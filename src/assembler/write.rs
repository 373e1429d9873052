//! All-or-nothing file output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::util::{Error, Result};

/// What happens to an existing destination directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryPolicy {
    /// Remove it and start from an empty directory.
    #[default]
    Fresh,
    /// Keep existing contents, creating the directory if needed.
    Reuse,
}

/// Make sure `dir` exists according to `policy`.
pub fn prepare_directory(dir: &Path, policy: DirectoryPolicy) -> Result<()> {
    if policy == DirectoryPolicy::Fresh && dir.exists() {
        debug!(dir = %dir.display(), "clearing destination directory");
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Removes the partial file unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial file");
            }
        }
    }
}

fn partial_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::invalid(format!("destination has no file name: {}", path.display())))?;
    let mut partial = name.to_os_string();
    partial.push(".partial");
    Ok(path.with_file_name(partial))
}

/// Write `bytes` to `path` so the destination is either untouched or complete.
///
/// Data goes to `<file>.partial` next to the destination, is synced, then
/// renamed over it. Missing parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = partial_path(path)?;
    let mut guard = PartialFile {
        path: tmp.clone(),
        armed: true,
    };

    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    guard.armed = false;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("World").join("wmo").join("hut.wmo");
        write_atomic(&path, b"REVM").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"REVM");
        assert!(!dir.path().join("World").join("wmo").join("hut.wmo.partial").exists());
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the destination makes the final rename fail.
        let path = dir.path().join("taken");
        fs::create_dir_all(path.join("inner")).unwrap();
        assert!(write_atomic(&path, b"data").is_err());
        assert!(!dir.path().join("taken.partial").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_prepare_directory_policies() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), b"x").unwrap();

        prepare_directory(&target, DirectoryPolicy::Reuse).unwrap();
        assert!(target.join("old.txt").exists());

        prepare_directory(&target, DirectoryPolicy::Fresh).unwrap();
        assert!(target.is_dir());
        assert!(!target.join("old.txt").exists());
    }

    #[test]
    fn test_no_file_name() {
        assert!(write_atomic(Path::new("/"), b"x").is_err());
    }
}

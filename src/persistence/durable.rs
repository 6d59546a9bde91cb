//! Durable file primitives: fsync helpers and atomic JSON replacement.
//!
//! Whole-file state (progress counters, dedup stores, exports) is replaced
//! with write-to-temp, fsync, rename, fsync-directory. Readers therefore see
//! either the previous contents or the new contents, never a torn write.
//!
//! On POSIX systems a rename only updates the directory entry; without an
//! fsync of the directory the rename may not survive power loss even though
//! the file contents did.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::PersistenceError;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created or renamed in it are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Returns the temp path used while atomically replacing `path`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replaces `path` with `bytes`, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// Atomically replaces `path` with the pretty-printed JSON of `value`.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Reads JSON from `path`, returning `None` if the file does not exist.
///
/// Malformed JSON and other IO errors are propagated.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fsync_dir_fails_on_nonexistent() {
        assert!(fsync_dir(Path::new("/nonexistent/path/that/does/not/exist")).is_err());
    }

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        let loaded: Option<Vec<u32>> = read_json_optional(&path).unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn write_atomic_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, "first").unwrap();
        write_json_atomic(&path, "second").unwrap();

        let loaded: Option<String> = read_json_optional(&path).unwrap();
        assert_eq!(loaded.as_deref(), Some("second"));
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<u32> = read_json_optional(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn read_malformed_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let result: Result<Option<u32>, _> = read_json_optional(&path);
        assert!(matches!(result, Err(PersistenceError::Json(_))));
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/a/b/progress.json")),
            PathBuf::from("/a/b/progress.json.tmp")
        );
    }
}

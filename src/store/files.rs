//! File helpers for persisted maps and segments

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};

/// Writes `path` by filling a sibling temporary file, syncing it, and
/// renaming it over the target. A crash mid-write leaves the old file intact.
pub fn write_atomically<F>(path: &Path, fill: F) -> StoreResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::write_failed(
                format!("Failed to create directory: {}", parent.display()),
                e,
            )
        })?;
    }

    let tmp_path = temp_path_for(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| {
            StoreError::write_failed(format!("Failed to create {}", tmp_path.display()), e)
        })?;

    let mut writer = BufWriter::new(file);
    fill(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| StoreError::write_failed(format!("Failed to write {}", path.display()), e))?;

    let file = writer.into_inner().map_err(|e| {
        StoreError::write_failed(format!("Failed to flush {}", path.display()), e.into_error())
    })?;
    file.sync_all().map_err(|e| {
        StoreError::write_failed(format!("fsync failed for {}", path.display()), e)
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        StoreError::write_failed(format!("Failed to rename into {}", path.display()), e)
    })
}

/// Opens `path` for buffered reading; `Ok(None)` if it does not exist.
pub fn open_if_exists(path: &Path) -> StoreResult<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::read_failed(
            format!("Failed to open {}", path.display()),
            e,
        )),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomically_creates_parent_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("file.map");

        write_atomically(&path, |w| w.write_all(b"first")).unwrap();
        write_atomically(&path, |w| w.write_all(b"second")).unwrap();

        let mut contents = String::new();
        open_if_exists(&path)
            .unwrap()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_open_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(open_if_exists(&temp_dir.path().join("absent")).unwrap().is_none());
    }
}

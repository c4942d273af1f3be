// 📁 Directory-backed storage
// Writes go to a `.<name>.partial` sibling and are renamed into place, so a
// reader never sees a half-written manifest.

use super::{is_staging_name, nesting_conflict, validate_path, Storage, STAGING_SUFFIX};
use crate::error::{ContainerError, OperationContext, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    /// Open (and create if missing) a directory container root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).op_context(|| format!("creating {}", root.display()))?;
        Ok(DirectoryStorage { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(path.split('/').fold(self.root.clone(), |acc, seg| acc.join(seg)))
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).op_context(|| format!("listing {}", dir.display()))?;
        for entry in entries {
            let entry = entry.op_context(|| format!("listing {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let file_type = entry
                .file_type()
                .op_context(|| format!("inspecting {}", rel))?;
            if file_type.is_dir() {
                self.collect(&entry.path(), &rel, out)?;
            } else if !is_staging_name(rel.rsplit('/').next().unwrap_or(&rel)) {
                out.push(rel);
            }
        }
        Ok(())
    }
}

impl Storage for DirectoryStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        // Directories and paths below a blob are not blobs
        if !full.is_file() {
            return Err(ContainerError::not_found(path));
        }
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContainerError::not_found(path)),
            Err(e) => Err(ContainerError::failed(format!("reading {}", path), e)),
        }
    }

    fn write(&mut self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        nesting_conflict(path, |parent| Ok(self.resolve(parent)?.is_file()), full.is_dir())?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).op_context(|| format!("creating parent of {}", path))?;
        }

        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ContainerError::contract(format!("storage path '{}' names no file", path)))?;
        let staging = full.with_file_name(format!(".{}{}", name, STAGING_SUFFIX));

        fs::write(&staging, content).op_context(|| format!("writing {}", path))?;
        if let Err(e) = fs::rename(&staging, &full) {
            let _ = fs::remove_file(&staging);
            return Err(ContainerError::failed(format!("committing {}", path), e));
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(ContainerError::not_found(path));
        }
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContainerError::not_found(path)),
            Err(e) => Err(ContainerError::failed(format!("removing {}", path), e)),
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn list_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        self.collect(&self.root, "", &mut paths)?;
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DirectoryStorage::open(dir.path()).unwrap();

        storage.write("entities/1.json", b"{}").unwrap();
        assert!(storage.exists("entities/1.json").unwrap());
        assert_eq!(storage.read("entities/1.json").unwrap(), b"{}");

        // create-or-replace
        storage.write("entities/1.json", b"[]").unwrap();
        assert_eq!(storage.read("entities/1.json").unwrap(), b"[]");

        storage.remove("entities/1.json").unwrap();
        assert!(!storage.exists("entities/1.json").unwrap());
    }

    #[test]
    fn test_missing_entries_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DirectoryStorage::open(dir.path()).unwrap();

        assert!(storage.read("nope.bin").unwrap_err().is_not_found());
        assert!(storage.remove("nope.bin").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_paths_is_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DirectoryStorage::open(dir.path()).unwrap();

        storage.write("values/2/0.bin", b"b").unwrap();
        storage.write("manifest.json", b"m").unwrap();
        storage.write("values/1/0.bin", b"a").unwrap();

        assert_eq!(
            storage.list_paths().unwrap(),
            vec!["manifest.json", "values/1/0.bin", "values/2/0.bin"]
        );
    }

    #[test]
    fn test_staging_files_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DirectoryStorage::open(dir.path()).unwrap();

        storage.write("manifest.json", b"m").unwrap();
        fs::write(dir.path().join(".manifest.json.partial"), b"torn").unwrap();

        assert_eq!(storage.list_paths().unwrap(), vec!["manifest.json"]);
        assert_eq!(storage.read("manifest.json").unwrap(), b"m");
    }

    #[test]
    fn test_write_file_copies_local_content() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("evidence.img");
        fs::write(&local, b"disk image").unwrap();

        let mut storage = DirectoryStorage::open(dir.path().join("c")).unwrap();
        storage.write_file("values/1/0.bin", &local).unwrap();
        assert_eq!(storage.read("values/1/0.bin").unwrap(), b"disk image");
    }
}

//! Path opener
//!
//! The core never touches final artifact paths directly; it goes through a
//! [`Store`], which abstracts where archives and indexes live. The crate
//! ships a local-filesystem implementation; remote backends plug in behind
//! the same four operations.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A readable, seekable byte source
pub trait SeekRead: Read + Seek {}
impl<T: Read + Seek> SeekRead for T {}

/// Capability set for opening, promoting and removing artifacts
pub trait Store {
    /// Open an existing artifact for reading
    fn open_read(&self, path: &Path) -> Result<Box<dyn SeekRead>>;

    /// Create (or truncate) an artifact for writing
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write>>;

    /// Atomically promote a temporary artifact over the final path
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove an artifact; missing paths are not an error
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Local filesystem store
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl Store for LocalStore {
    fn open_read(&self, path: &Path) -> Result<Box<dyn SeekRead>> {
        Ok(Box::new(File::open(path)?))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Removes a temporary path on drop unless it was committed.
///
/// Guards every exit path of a run: on success the caller promotes the
/// temporary file and calls [`commit`](TempGuard::commit); on error or panic
/// the drop removes the partial output.
pub struct TempGuard<'a, S: Store> {
    store: &'a S,
    path: PathBuf,
    committed: bool,
}

impl<'a, S: Store> TempGuard<'a, S> {
    pub fn new(store: &'a S, path: PathBuf) -> Self {
        Self { store, path, committed: false }
    }

    /// The guarded temporary path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Promote the temporary file over `target` and disarm the guard
    pub fn promote(mut self, target: &Path) -> Result<()> {
        self.store.rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl<S: Store> Drop for TempGuard<'_, S> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.store.remove(&self.path);
        }
    }
}

/// Derive the temporary sibling of a final artifact path
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_guard_removes_uncommitted() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore;
        let path = dir.path().join("artifact.tmp");
        std::fs::write(&path, b"partial").unwrap();

        {
            let _guard = TempGuard::new(&store, path.clone());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_promotes() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore;
        let tmp = dir.path().join("artifact.tmp");
        let target = dir.path().join("artifact");
        std::fs::write(&tmp, b"done").unwrap();

        let guard = TempGuard::new(&store, tmp.clone());
        guard.promote(&target).unwrap();

        assert!(!tmp.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"done");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore;
        store.remove(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn test_temp_sibling() {
        assert_eq!(
            temp_sibling(Path::new("/data/archive.gz")),
            Path::new("/data/archive.gz.tmp")
        );
    }
}

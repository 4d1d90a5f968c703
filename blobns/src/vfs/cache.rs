//! Local cache mirror: an on-disk tree addressed by the same path strings
//! as the virtual namespace. Whatever exists here wins over remote state.

use crate::vfs::error::{NamespaceError, Result};
use crate::vfs::path::blob_key;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// One entry of a cached directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

pub struct CacheMirror {
    root: PathBuf,
    dir_mode: u32,
}

impl CacheMirror {
    pub fn new(root: impl Into<PathBuf>, dir_mode: u32) -> Self {
        Self {
            root: root.into(),
            dir_mode,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of a virtual path.
    pub fn path_of(&self, path: &str) -> PathBuf {
        let key = blob_key(path);
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    /// `lstat` of the cached copy; `None` when nothing is cached.
    pub async fn probe(&self, path: &str) -> Result<Option<Metadata>> {
        let local = self.path_of(path);
        match fs::symlink_metadata(&local).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NamespaceError::cache(local, e)),
        }
    }

    /// Create every missing ancestor directory of `full_path`, root to leaf,
    /// with the configured mode. A directory created concurrently by another
    /// caller counts as success; the first other failure is returned.
    pub async fn ensure_parents(&self, full_path: &Path) -> Result<()> {
        let Some(parent) = full_path.parent() else {
            return Ok(());
        };
        self.create_chain(parent).await
    }

    /// Like `ensure_parents`, but also creates the directory for `path`.
    pub async fn provision_dir(&self, path: &str) -> Result<()> {
        self.create_chain(&self.path_of(path)).await
    }

    async fn create_chain(&self, dir: &Path) -> Result<()> {
        let mut chain: Vec<&Path> = dir
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty() && p.parent().is_some())
            .collect();
        chain.reverse();
        for component in chain {
            if fs::metadata(component).await.is_ok() {
                continue;
            }
            debug!(dir = %component.display(), "making cache directory");
            match fs::DirBuilder::new()
                .mode(self.dir_mode)
                .create(component)
                .await
            {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(NamespaceError::cache(component, e)),
            }
        }
        Ok(())
    }

    /// Non-hidden entries of a cached directory. A directory that is not
    /// cached has no entries.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<LocalEntry>> {
        let local = self.path_of(path);
        let mut stream = match fs::read_dir(&local).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NamespaceError::cache(local, e)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = stream
            .next_entry()
            .await
            .map_err(|e| NamespaceError::cache(&local, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| NamespaceError::cache(entry.path(), e))?;
            entries.push(LocalEntry {
                name,
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
            });
        }
        Ok(entries)
    }

    /// Remove a cached directory. Returns whether anything was removed.
    pub async fn remove_dir(&self, path: &str) -> Result<bool> {
        let local = self.path_of(path);
        match fs::remove_dir(&local).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NamespaceError::cache(local, e)),
        }
    }

    /// Delete everything below the cache root, keeping the root itself.
    pub async fn purge(&self) -> Result<()> {
        let mut stream = match fs::read_dir(&self.root).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NamespaceError::cache(&self.root, e)),
        };
        while let Some(entry) = stream
            .next_entry()
            .await
            .map_err(|e| NamespaceError::cache(&self.root, e))?
        {
            let target = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| NamespaceError::cache(&target, e))?;
            let removed = if file_type.is_dir() {
                fs::remove_dir_all(&target).await
            } else {
                fs::remove_file(&target).await
            };
            removed.map_err(|e| NamespaceError::cache(&target, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ensure_parents_creates_chain_with_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheMirror::new(tmp.path().join("root"), 0o750);
        let leaf = cache.path_of("/a/b/c/file.txt");
        cache.ensure_parents(&leaf).await.unwrap();

        let c = cache.path_of("/a/b/c");
        let meta = std::fs::metadata(&c).unwrap();
        assert!(meta.is_dir());
        let mode = meta.permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
        assert_eq!(mode & 0o007, 0);
        assert!(!leaf.exists());

        // Idempotent.
        cache.ensure_parents(&leaf).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_parents_on_overlapping_paths() {
        for _ in 0..20 {
            let tmp = tempfile::tempdir().unwrap();
            let cache = Arc::new(CacheMirror::new(tmp.path().join("root"), 0o770));
            let mut tasks = Vec::new();
            for leaf in ["/x/y/z/one", "/x/y/z/two", "/x/y/w/three", "/x/y/z/four"] {
                let cache = cache.clone();
                tasks.push(tokio::spawn(async move {
                    let full = cache.path_of(leaf);
                    cache.ensure_parents(&full).await
                }));
            }
            for task in tasks {
                task.await.unwrap().unwrap();
            }
            assert!(cache.path_of("/x/y/z").is_dir());
            assert!(cache.path_of("/x/y/w").is_dir());
        }
    }

    #[tokio::test]
    async fn test_ensure_parents_reports_blocking_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheMirror::new(tmp.path(), 0o770);
        std::fs::write(tmp.path().join("f"), b"x").unwrap();
        let err = cache
            .ensure_parents(&cache.path_of("/f/g/h"))
            .await
            .unwrap_err();
        assert_eq!(err.errno(), libc::ENOTDIR);
    }

    #[tokio::test]
    async fn test_probe_read_dir_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheMirror::new(tmp.path(), 0o770);
        assert!(cache.probe("/d").await.unwrap().is_none());
        assert!(cache.read_dir("/d").await.unwrap().is_empty());

        cache.provision_dir("/d/sub").await.unwrap();
        std::fs::write(cache.path_of("/d/file"), b"abc").unwrap();
        std::fs::write(cache.path_of("/d/.hidden"), b"").unwrap();

        let meta = cache.probe("/d/file").await.unwrap().unwrap();
        assert_eq!(meta.len(), 3);

        let mut entries = cache.read_dir("/d").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
        assert_eq!(names, vec![("file", false), ("sub", true)]);

        assert!(cache.remove_dir("/d/sub").await.unwrap());
        assert!(!cache.remove_dir("/d/sub").await.unwrap());
        let err = cache.remove_dir("/d").await.unwrap_err();
        assert_eq!(err.errno(), libc::ENOTEMPTY);
    }

    #[tokio::test]
    async fn test_purge_keeps_root() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheMirror::new(tmp.path().join("root"), 0o770);
        cache.provision_dir("/a/b").await.unwrap();
        std::fs::write(cache.path_of("/a/b/f"), b"x").unwrap();
        std::fs::write(cache.path_of("/top"), b"x").unwrap();
        cache.purge().await.unwrap();
        assert!(cache.root().is_dir());
        assert_eq!(std::fs::read_dir(cache.root()).unwrap().count(), 0);
    }
}

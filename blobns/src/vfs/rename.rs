//! Directory rename by merging what the cache mirror holds with what the
//! store lists, plus the directory listing and removal built on the same
//! merge.
//!
//! A failed directory rename is not rolled back: entries already moved stay
//! moved. Only the exact path being moved is locked; concurrent operations
//! inside a subtree that is being renamed are not guarded.

use crate::cadapter::client::lookup_blob;
use crate::vfs::context::MountContext;
use crate::vfs::error::{NamespaceError, Result};
use crate::vfs::lister::DirectoryState;
use crate::vfs::markers::{
    LEGACY_DIRECTORY_SUFFIX, is_directory_blob, is_directory_item, is_symlink_blob,
    legacy_marker_key,
};
use crate::vfs::path::{DELIMITER, bare_name, blob_key, child_prefix, is_root, join};
use crate::vfs::resolver::{FileType, PathResolver};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info};

/// Moves a single namespace entry. Directory renames are built from these.
#[async_trait]
pub trait EntryMover: Send + Sync {
    /// Move one file or symlink: its cached copy and its remote copy.
    async fn rename_file(&self, src: &str, dst: &str) -> Result<()>;

    /// Move one remote object only, keyed by blob key.
    async fn rename_blob(&self, src_key: &str, dst_key: &str) -> Result<()>;
}

/// Default mover: local rename inside the cache mirror plus server-side
/// copy and delete in the store.
pub struct CacheStoreMover {
    ctx: Arc<MountContext>,
}

impl CacheStoreMover {
    pub fn new(ctx: Arc<MountContext>) -> Self {
        Self { ctx }
    }

    /// Copy then delete. `Ok(false)` when the source blob does not exist.
    async fn move_remote(&self, src_key: &str, dst_key: &str) -> Result<bool> {
        let container = self.ctx.container();
        match self.ctx.store.copy_blob(container, src_key, dst_key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(self.ctx.store_error(src_key, e)),
        }
        match self.ctx.store.delete_blob(container, src_key).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(self.ctx.store_error(src_key, e)),
        }
    }
}

#[async_trait]
impl EntryMover for CacheStoreMover {
    async fn rename_file(&self, src: &str, dst: &str) -> Result<()> {
        let lock = self.ctx.locks.acquire(src);
        let _guard = lock.lock().await;

        let cache = &self.ctx.cache;
        let moved_local = if cache.probe(src).await?.is_some() {
            let from = cache.path_of(src);
            let to = cache.path_of(dst);
            cache.ensure_parents(&to).await?;
            match tokio::fs::rename(&from, &to).await {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(NamespaceError::cache(from, e)),
            }
        } else {
            false
        };
        let moved_remote = self.move_remote(blob_key(src), blob_key(dst)).await?;

        if !moved_local && !moved_remote {
            return Err(NamespaceError::not_found(src));
        }
        debug!(src, dst, moved_local, moved_remote, "moved entry");
        Ok(())
    }

    async fn rename_blob(&self, src_key: &str, dst_key: &str) -> Result<()> {
        if self.move_remote(src_key, dst_key).await? {
            debug!(src_key, dst_key, "moved blob");
            Ok(())
        } else {
            Err(NamespaceError::not_found(src_key))
        }
    }
}

/// Where a merged child entry was discovered. Local wins on a name clash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntrySource {
    LocalOnly,
    RemoteOnly,
    Both,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedEntry {
    /// Bare name relative to the parent directory.
    pub name: String,
    pub kind: FileType,
    pub source: EntrySource,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

pub struct RenameReconciler {
    ctx: Arc<MountContext>,
    resolver: PathResolver,
    mover: Arc<dyn EntryMover>,
}

impl RenameReconciler {
    pub fn new(ctx: Arc<MountContext>) -> Self {
        let mover = Arc::new(CacheStoreMover::new(ctx.clone()));
        Self::with_mover(ctx, mover)
    }

    pub fn with_mover(ctx: Arc<MountContext>, mover: Arc<dyn EntryMover>) -> Self {
        Self {
            resolver: PathResolver::new(ctx.clone()),
            ctx,
            mover,
        }
    }

    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        if is_root(src) {
            return Err(NamespaceError::InvalidPath { path: src.into() });
        }
        if is_root(dst) {
            return Err(NamespaceError::InvalidPath { path: dst.into() });
        }
        let attr = self.resolver.resolve(src).await?;
        info!(src, dst, kind = ?attr.kind, "rename");
        match attr.kind {
            FileType::Dir => self.rename_directory(src, dst).await,
            FileType::File | FileType::Symlink => self.mover.rename_file(src, dst).await,
        }
    }

    /// Move the subtree at `src` to `dst`, every child exactly once.
    pub fn rename_directory<'a>(
        &'a self,
        src: &'a str,
        dst: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let src_key = blob_key(src);
            let marker = lookup_blob(self.ctx.store.as_ref(), self.ctx.container(), src_key)
                .await
                .map_err(|e| self.ctx.store_error(src_key, e))?;
            if marker.is_some_and(|p| is_directory_blob(p.size, &p.metadata)) {
                self.mover.rename_blob(src_key, blob_key(dst)).await?;
            }

            // A cached source directory gets a cached destination, even when empty.
            let cache = &self.ctx.cache;
            if cache.probe(src).await?.is_some_and(|meta| meta.is_dir()) {
                cache.provision_dir(dst).await?;
            } else {
                cache.ensure_parents(&cache.path_of(dst)).await?;
            }

            for entry in self.merge_children(src).await? {
                let from = join(src, &entry.name);
                let to = join(dst, &entry.name);
                debug!(from = %from, to = %to, source = ?entry.source, "moving child");
                match entry.kind {
                    FileType::Dir => self.rename_directory(&from, &to).await?,
                    FileType::File | FileType::Symlink => {
                        self.mover.rename_file(&from, &to).await?
                    }
                }
            }

            let lock = self.ctx.locks.acquire(src);
            let _guard = lock.lock().await;
            self.remove_directory_locked(src, true).await
        })
    }

    /// Children of `dir` from the cache mirror (hidden names skipped) and
    /// from the store, tagged by origin. A remote name already seen locally
    /// is not processed again.
    pub async fn merge_children(&self, dir: &str) -> Result<Vec<MergedEntry>> {
        let local = self.ctx.cache.read_dir(dir).await?;
        let prefix = child_prefix(dir);
        let remote = self
            .ctx
            .lister()
            .list(
                self.ctx.container(),
                DELIMITER,
                &prefix,
                self.ctx.config.list_page_size,
            )
            .collect_unique()
            .await
            .map_err(|e| self.ctx.store_error(&prefix, e))?;

        let mut entries: Vec<MergedEntry> = local
            .into_iter()
            .map(|entry| MergedEntry {
                kind: if entry.is_dir {
                    FileType::Dir
                } else if entry.is_symlink {
                    FileType::Symlink
                } else {
                    FileType::File
                },
                name: entry.name,
                source: EntrySource::LocalOnly,
            })
            .collect();
        let handled: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.name.clone(), idx))
            .collect();

        for item in &remote {
            let Some(name) = bare_name(&item.name, &prefix) else {
                continue;
            };
            if let Some(&idx) = handled.get(name) {
                entries[idx].source = EntrySource::Both;
                continue;
            }
            let kind = if is_directory_item(item) {
                FileType::Dir
            } else if is_symlink_blob(&item.metadata) {
                FileType::Symlink
            } else {
                FileType::File
            };
            entries.push(MergedEntry {
                name: name.to_string(),
                kind,
                source: EntrySource::RemoteOnly,
            });
        }
        Ok(entries)
    }

    /// Visible entries of the directory at `path`.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let attr = self.resolver.resolve(path).await?;
        if attr.kind != FileType::Dir {
            return Err(NamespaceError::NotADirectory { path: path.into() });
        }
        let mut seen = HashSet::new();
        Ok(self
            .merge_children(path)
            .await?
            .into_iter()
            .filter(|entry| entry.name != LEGACY_DIRECTORY_SUFFIX)
            .filter(|entry| seen.insert(entry.name.clone()))
            .map(|entry| DirEntry {
                name: entry.name,
                kind: entry.kind,
            })
            .collect())
    }

    /// `rmdir`: the directory must be empty both in the cache and remotely.
    pub async fn remove_directory(&self, path: &str) -> Result<()> {
        if is_root(path) {
            return Err(NamespaceError::InvalidPath { path: path.into() });
        }
        let attr = self.resolver.resolve(path).await?;
        if attr.kind != FileType::Dir {
            return Err(NamespaceError::NotADirectory { path: path.into() });
        }
        let lock = self.ctx.locks.acquire(path);
        let _guard = lock.lock().await;
        self.remove_directory_locked(path, false).await
    }

    async fn remove_directory_locked(&self, path: &str, allow_absent: bool) -> Result<()> {
        let key = blob_key(path);
        let container = self.ctx.container();
        let remote_present = match self.ctx.lister().is_directory_empty(container, key).await {
            DirectoryState::NotEmpty => {
                return Err(NamespaceError::NotEmpty { path: path.into() });
            }
            DirectoryState::Error(e) => return Err(self.ctx.store_error(key, e)),
            DirectoryState::Empty => true,
            DirectoryState::NotExist => false,
        };

        let removed_local = self.ctx.cache.remove_dir(path).await?;
        if remote_present {
            for marker in [key.to_string(), legacy_marker_key(key)] {
                match self.ctx.store.delete_blob(container, &marker).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(self.ctx.store_error(&marker, e)),
                }
            }
        }

        if !remote_present && !removed_local && !allow_absent {
            return Err(NamespaceError::not_found(path));
        }
        debug!(path, removed_local, remote_present, "removed directory");
        Ok(())
    }
}

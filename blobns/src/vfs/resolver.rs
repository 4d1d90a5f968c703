//! Attribute resolution. The local cache mirror is consulted first and wins
//! whenever it has an entry; otherwise a short delimiter listing decides
//! between directory, file and absence.

use crate::cadapter::client::{ListRequest, lookup_blob};
use crate::vfs::context::MountContext;
use crate::vfs::error::{NamespaceError, Result};
use crate::vfs::markers::{is_directory_item, is_symlink_blob};
use crate::vfs::path::{DELIMITER, blob_key, is_root};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Page size of the resolution listing: the exact match plus one item of
/// evidence for children.
const RESOLVE_PAGE_SIZE: u32 = 2;
const DIRECTORY_SIZE: u64 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
    Symlink,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttr {
    pub kind: FileType,
    /// Permission bits only.
    pub perm: u32,
    /// Best effort for remote directories.
    pub nlink: u32,
    pub size: u64,
    pub mtime: SystemTime,
    pub uid: u32,
    pub gid: u32,
}

impl FileAttr {
    /// `st_mode` style value: type bits plus permission bits.
    pub fn mode(&self) -> u32 {
        let type_bits = match self.kind {
            FileType::File => libc::S_IFREG,
            FileType::Dir => libc::S_IFDIR,
            FileType::Symlink => libc::S_IFLNK,
        };
        type_bits as u32 | self.perm
    }

    fn from_local(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FileType::Dir
        } else if file_type.is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };
        Self {
            kind,
            perm: meta.mode() & 0o7777,
            nlink: u32::try_from(meta.nlink()).unwrap_or(u32::MAX),
            size: meta.size(),
            mtime: meta.modified().unwrap_or(UNIX_EPOCH),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

pub struct PathResolver {
    ctx: Arc<MountContext>,
}

impl PathResolver {
    pub fn new(ctx: Arc<MountContext>) -> Self {
        Self { ctx }
    }

    fn synthesized(&self, kind: FileType, nlink: u32, size: u64, mtime: SystemTime) -> FileAttr {
        FileAttr {
            kind,
            perm: self.ctx.config.default_permission,
            nlink,
            size,
            mtime,
            uid: self.ctx.config.uid,
            gid: self.ctx.config.gid,
        }
    }

    pub async fn resolve(&self, path: &str) -> Result<FileAttr> {
        if is_root(path) {
            return Ok(self.synthesized(FileType::Dir, 2, DIRECTORY_SIZE, SystemTime::now()));
        }

        let lock = self.ctx.locks.acquire(path);
        let _guard = lock.lock().await;

        match self.ctx.cache.probe(path).await {
            Ok(Some(meta)) => {
                debug!(path, "resolved from cache");
                return Ok(FileAttr::from_local(&meta));
            }
            Ok(None) => debug!(path, "not cached, asking the store"),
            Err(e) => {
                error!(path, error = %e, "failed to stat cached entry");
                return Err(e);
            }
        }

        let key = blob_key(path);
        let page = self
            .ctx
            .store
            .list_blobs(ListRequest {
                container: self.ctx.container(),
                delimiter: DELIMITER,
                prefix: key,
                marker: "",
                max_results: Some(RESOLVE_PAGE_SIZE),
            })
            .await
            .map_err(|e| self.ctx.store_error(key, e))?;

        let dir_name = format!("{key}{DELIMITER}");
        let Some(matched) = page
            .items
            .iter()
            .find(|item| item.name == key || item.name == dir_name)
        else {
            return Err(NamespaceError::not_found(path));
        };

        if is_directory_item(matched) {
            let has_child = matched.name == dir_name
                || page
                    .items
                    .iter()
                    .any(|item| item.name != matched.name && item.name.starts_with(&dir_name));
            let nlink = if has_child { 3 } else { 2 };
            let mtime = matched.last_modified.unwrap_or_else(SystemTime::now);
            return Ok(self.synthesized(FileType::Dir, nlink, DIRECTORY_SIZE, mtime));
        }

        // Listing pages carry partial metadata only.
        let prop = lookup_blob(self.ctx.store.as_ref(), self.ctx.container(), key)
            .await
            .map_err(|e| self.ctx.store_error(key, e))?
            .ok_or_else(|| NamespaceError::not_found(path))?;
        let kind = if is_symlink_blob(&prop.metadata) {
            FileType::Symlink
        } else {
            FileType::File
        };
        let mtime = prop
            .last_modified
            .or(matched.last_modified)
            .unwrap_or(UNIX_EPOCH);
        Ok(self.synthesized(kind, 1, prop.size, mtime))
    }
}

use crate::cadapter::client::BlobStore;
use crate::vfs::config::MountConfig;
use crate::vfs::context::MountContext;
use crate::vfs::error::Result;
use crate::vfs::lister::DirectoryState;
use crate::vfs::path::blob_key;
use crate::vfs::rename::{DirEntry, RenameReconciler};
use crate::vfs::resolver::{FileAttr, PathResolver};
use std::sync::Arc;
use tracing::info;

/// Entry point for filesystem-style callers. One instance per mount.
pub struct BlobNamespace {
    ctx: Arc<MountContext>,
    resolver: PathResolver,
    reconciler: RenameReconciler,
}

impl BlobNamespace {
    pub fn new(config: MountConfig, store: Arc<dyn BlobStore>) -> Self {
        Self::with_context(Arc::new(MountContext::new(config, store)))
    }

    pub fn with_context(ctx: Arc<MountContext>) -> Self {
        Self {
            resolver: PathResolver::new(ctx.clone()),
            reconciler: RenameReconciler::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }

    pub async fn getattr(&self, path: &str) -> Result<FileAttr> {
        self.resolver.resolve(path).await
    }

    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.reconciler.rename(src, dst).await
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.reconciler.read_dir(path).await
    }

    pub async fn remove_directory(&self, path: &str) -> Result<()> {
        self.reconciler.remove_directory(path).await
    }

    pub async fn is_directory_empty(&self, path: &str) -> DirectoryState {
        self.ctx
            .lister()
            .is_directory_empty(self.ctx.container(), blob_key(path))
            .await
    }

    /// Drop every cached entry. Called at unmount.
    pub async fn purge_cache(&self) -> Result<()> {
        info!(root = %self.ctx.cache.root().display(), "purging cache mirror");
        self.ctx.cache.purge().await
    }
}

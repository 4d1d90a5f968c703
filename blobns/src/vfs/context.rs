use crate::cadapter::client::{BlobStore, StoreError};
use crate::vfs::cache::CacheMirror;
use crate::vfs::config::MountConfig;
use crate::vfs::errno::ErrnoMapper;
use crate::vfs::error::NamespaceError;
use crate::vfs::lister::SegmentedLister;
use crate::vfs::lock::PathLockRegistry;
use std::sync::Arc;

/// Everything one mount shares between its components. Built once at mount
/// time and handed around as `Arc<MountContext>`.
pub struct MountContext {
    pub config: MountConfig,
    pub store: Arc<dyn BlobStore>,
    pub locks: PathLockRegistry,
    pub errno: ErrnoMapper,
    pub cache: CacheMirror,
}

impl MountContext {
    pub fn new(config: MountConfig, store: Arc<dyn BlobStore>) -> Self {
        let cache = CacheMirror::new(config.cache_root(), config.default_permission);
        Self {
            config,
            store,
            locks: PathLockRegistry::new(),
            errno: ErrnoMapper::new(),
            cache,
        }
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    pub fn lister(&self) -> SegmentedLister {
        SegmentedLister::new(self.store.clone())
    }

    /// Wrap a store failure for `key`, translating its code to an errno.
    pub fn store_error(&self, key: &str, source: StoreError) -> NamespaceError {
        NamespaceError::store(&self.errno, key, source)
    }
}

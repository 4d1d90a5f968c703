//! Per-path mutual exclusion keyed by the exact path string.
//!
//! The table holds weak references only. A slot lives as long as some
//! caller holds its `PathLock`; when the last handle drops, the slot removes
//! its own table entry, so the table never outgrows the set of paths that
//! are currently in use.
//!
//! Locks are per exact string: holding `/a` does not cover `/a/b` or `/`.
//! No ordering is imposed across paths; callers taking several locks must
//! take care of deadlock themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type SlotTable = Mutex<HashMap<String, Weak<Slot>>>;

struct Slot {
    path: String,
    table: Weak<SlotTable>,
    mutex: tokio::sync::Mutex<()>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        // A racing `acquire` may already have installed a fresh slot.
        if table
            .get(&self.path)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            table.remove(&self.path);
        }
    }
}

/// Handle for one path. All concurrent holders for the same path share the
/// same underlying mutex.
#[derive(Clone)]
pub struct PathLock {
    slot: Arc<Slot>,
}

impl PathLock {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.slot.mutex.lock().await
    }

    pub fn path(&self) -> &str {
        &self.slot.path
    }

    pub fn same_as(&self, other: &PathLock) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

#[derive(Default)]
pub struct PathLockRegistry {
    table: Arc<SlotTable>,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Weak<Slot>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic get-or-create of the handle for `path`.
    pub fn acquire(&self, path: &str) -> PathLock {
        let mut table = self.table();
        if let Some(slot) = table.get(path).and_then(Weak::upgrade) {
            return PathLock { slot };
        }
        let slot = Arc::new(Slot {
            path: path.to_string(),
            table: Arc::downgrade(&self.table),
            mutex: tokio::sync::Mutex::new(()),
        });
        table.insert(path.to_string(), Arc::downgrade(&slot));
        PathLock { slot }
    }

    /// Number of paths with a live handle.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_shares_handle() {
        let registry = PathLockRegistry::new();
        let a1 = registry.acquire("/a");
        let a2 = registry.acquire("/a");
        let b = registry.acquire("/a/b");
        assert!(a1.same_as(&a2));
        assert!(!a1.same_as(&b));
        assert_eq!(a1.path(), "/a");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_reclaimed_when_unreferenced() {
        let registry = PathLockRegistry::new();
        let a1 = registry.acquire("/a");
        let a2 = a1.clone();
        drop(a1);
        assert_eq!(registry.len(), 1);
        drop(a2);
        assert!(registry.is_empty());

        // A fresh handle after reclamation still works.
        let again = registry.acquire("/a");
        let _guard = again.lock().await;
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_critical_sections_are_serialized_per_path() {
        let registry = Arc::new(PathLockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                let handle = registry.acquire("/hot");
                let _guard = handle.lock().await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block_each_other() {
        let registry = PathLockRegistry::new();
        let parent = registry.acquire("/a");
        let child = registry.acquire("/a/b");
        let _p = parent.lock().await;
        let c = tokio::time::timeout(Duration::from_millis(100), child.lock()).await;
        assert!(c.is_ok());
    }
}

//! In-process blob store: an ordered key space per container with real
//! delimiter/continuation semantics. Used for tests and for embedding the
//! engine without a remote service.
//!
//! Two store misbehaviours can be switched on to exercise the engine:
//! repeating the boundary item at the start of the next page, and failing
//! a number of consecutive listing or lookup calls.

use crate::cadapter::client::{
    BlobItem, BlobProperty, BlobStore, ListPage, ListRequest, Metadata, StoreError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

const DEFAULT_MAX_RESULTS: usize = 5000;

/// Operation journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List { prefix: String, marker: String },
    GetProperty { key: String },
    Copy { src: String, dst: String },
    Delete { key: String },
}

#[derive(Debug, Clone)]
struct StoredBlob {
    size: u64,
    metadata: Metadata,
    last_modified: SystemTime,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, BTreeMap<String, StoredBlob>>,
    repeat_boundary: bool,
    failing_lists: usize,
    failing_lookups: usize,
    fail_code: i32,
    journal: Vec<StoreOp>,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_blob(&self, container: &str, key: &str, size: u64, metadata: Metadata) {
        self.state()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredBlob {
                    size,
                    metadata,
                    last_modified: SystemTime::now(),
                },
            );
    }

    pub fn contains(&self, container: &str, key: &str) -> bool {
        self.state()
            .containers
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(key))
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.state()
            .containers
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Re-emit the previous page's last item at the head of the next page.
    pub fn set_repeat_boundary(&self, repeat: bool) {
        self.state().repeat_boundary = repeat;
    }

    /// Fail the next `count` listing calls with `code`.
    pub fn fail_next_lists(&self, count: usize, code: i32) {
        let mut state = self.state();
        state.failing_lists = count;
        state.fail_code = code;
    }

    /// Fail the next `count` point lookups with `code`.
    pub fn fail_next_lookups(&self, count: usize, code: i32) {
        let mut state = self.state();
        state.failing_lookups = count;
        state.fail_code = code;
    }

    pub fn journal(&self) -> Vec<StoreOp> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    fn list_page(state: &State, request: &ListRequest<'_>) -> ListPage {
        let Some(blobs) = state.containers.get(request.container) else {
            return ListPage::default();
        };
        let base_limit = request
            .max_results
            .map(|n| n.max(1) as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);
        let repeat = state.repeat_boundary && !request.marker.is_empty();
        // The repeated boundary item does not count against the page size.
        let limit = if repeat { base_limit + 1 } else { base_limit };

        let mut items: Vec<BlobItem> = Vec::new();
        let mut truncated = false;
        let range = blobs.range::<str, _>((Bound::Included(request.prefix), Bound::Unbounded));
        for (key, blob) in range {
            if !key.starts_with(request.prefix) {
                break;
            }
            let rest = &key[request.prefix.len()..];
            let grouped = (!request.delimiter.is_empty())
                .then(|| rest.find(request.delimiter))
                .flatten()
                .map(|pos| &key[..request.prefix.len() + pos + request.delimiter.len()]);
            let name = grouped.unwrap_or(key.as_str());

            if !request.marker.is_empty() {
                let before_marker = if repeat {
                    name < request.marker
                } else {
                    name <= request.marker
                };
                if before_marker {
                    continue;
                }
            }
            if items.last().is_some_and(|last| last.name == name) {
                continue;
            }
            if items.len() == limit {
                truncated = true;
                break;
            }
            items.push(match grouped {
                Some(prefix) => BlobItem::prefix(prefix),
                None => BlobItem {
                    name: key.clone(),
                    size: blob.size,
                    last_modified: Some(blob.last_modified),
                    metadata: blob.metadata.clone(),
                    is_directory: false,
                },
            });
        }

        let next_marker = match (truncated, items.last()) {
            (true, Some(last)) => last.name.clone(),
            _ => String::new(),
        };
        ListPage { items, next_marker }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_blobs(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        let mut state = self.state();
        state.journal.push(StoreOp::List {
            prefix: request.prefix.to_string(),
            marker: request.marker.to_string(),
        });
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(StoreError::new(state.fail_code, "injected listing failure"));
        }
        Ok(Self::list_page(&state, &request))
    }

    async fn get_property(&self, container: &str, key: &str) -> Result<BlobProperty, StoreError> {
        let mut state = self.state();
        state.journal.push(StoreOp::GetProperty {
            key: key.to_string(),
        });
        if state.failing_lookups > 0 {
            state.failing_lookups -= 1;
            return Err(StoreError::new(state.fail_code, "injected lookup failure"));
        }
        state
            .containers
            .get(container)
            .and_then(|blobs| blobs.get(key))
            .map(|blob| BlobProperty {
                size: blob.size,
                last_modified: Some(blob.last_modified),
                metadata: blob.metadata.clone(),
                valid: true,
            })
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn copy_blob(&self, container: &str, src: &str, dst: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.journal.push(StoreOp::Copy {
            src: src.to_string(),
            dst: dst.to_string(),
        });
        let blobs = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StoreError::not_found(src))?;
        let mut blob = blobs
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::not_found(src))?;
        blob.last_modified = SystemTime::now();
        blobs.insert(dst.to_string(), blob);
        Ok(())
    }

    async fn delete_blob(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.journal.push(StoreOp::Delete {
            key: key.to_string(),
        });
        state
            .containers
            .get_mut(container)
            .and_then(|blobs| blobs.remove(key))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(key))
    }
}

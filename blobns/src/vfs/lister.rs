//! Paginated remote listing with a consecutive-failure budget, and the
//! directory emptiness test built on top of it.

use crate::cadapter::client::{BlobItem, BlobStore, ListRequest, StoreError, lookup_blob};
use crate::vfs::markers::{is_directory_blob, is_legacy_marker};
use crate::vfs::path::DELIMITER;
use futures::{Stream, TryStreamExt, stream};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Consecutive failed listing calls tolerated before giving up.
pub const MAX_LIST_FAILURES: usize = 20;
/// Two items are enough to prove a directory is not empty.
const EMPTINESS_PAGE_SIZE: u32 = 2;

/// One page of a logical listing. When `duplicate_boundary` is set the
/// first item repeats the last item of the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSegment {
    pub items: Vec<BlobItem>,
    pub duplicate_boundary: bool,
}

impl ListSegment {
    pub fn unique_items(&self) -> &[BlobItem] {
        if self.duplicate_boundary {
            &self.items[1..]
        } else {
            &self.items
        }
    }

    pub fn into_unique_items(mut self) -> Vec<BlobItem> {
        if self.duplicate_boundary {
            self.items.remove(0);
        }
        self.items
    }
}

/// Outcome of `SegmentedLister::is_directory_empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryState {
    NotExist,
    Empty,
    NotEmpty,
    Error(StoreError),
}

#[derive(Clone)]
pub struct SegmentedLister {
    store: Arc<dyn BlobStore>,
}

impl SegmentedLister {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Start a lazy listing. Nothing is sent to the store until the first
    /// segment is requested.
    pub fn list(
        &self,
        container: &str,
        delimiter: &str,
        prefix: &str,
        page_size: Option<u32>,
    ) -> SegmentedListing {
        SegmentedListing {
            store: self.store.clone(),
            container: container.to_string(),
            delimiter: delimiter.to_string(),
            prefix: prefix.to_string(),
            page_size,
            marker: String::new(),
            prior: None,
            done: false,
        }
    }

    /// Classify the directory whose blob key is `dir_name`.
    pub async fn is_directory_empty(&self, container: &str, dir_name: &str) -> DirectoryState {
        let marker_blob_found = match lookup_blob(self.store.as_ref(), container, dir_name).await {
            Ok(prop) => prop.is_some_and(|p| is_directory_blob(p.size, &p.metadata)),
            Err(e) => {
                debug!(dir = dir_name, code = e.code, "directory marker lookup failed");
                return DirectoryState::Error(e);
            }
        };

        let prefix = format!("{dir_name}{DELIMITER}");
        let mut listing = self.list(container, DELIMITER, &prefix, Some(EMPTINESS_PAGE_SIZE));
        let mut legacy_marker_found = false;
        while let Some(segment) = listing.next_segment().await {
            let segment = match segment {
                Ok(segment) => segment,
                Err(e) => return DirectoryState::Error(e),
            };
            match segment.unique_items() {
                [] => {}
                [only] => {
                    if !only.is_directory && is_legacy_marker(&only.name) && !legacy_marker_found {
                        legacy_marker_found = true;
                    } else {
                        return DirectoryState::NotEmpty;
                    }
                }
                _ => return DirectoryState::NotEmpty,
            }
        }

        if marker_blob_found || legacy_marker_found {
            DirectoryState::Empty
        } else {
            DirectoryState::NotExist
        }
    }
}

/// Cursor over the segments of one logical listing.
pub struct SegmentedListing {
    store: Arc<dyn BlobStore>,
    container: String,
    delimiter: String,
    prefix: String,
    page_size: Option<u32>,
    marker: String,
    /// Last item name of the previous non-empty page.
    prior: Option<String>,
    done: bool,
}

impl SegmentedListing {
    /// Next non-empty segment, `None` once the listing is complete. After an
    /// `Err` the listing is finished.
    pub async fn next_segment(&mut self) -> Option<Result<ListSegment, StoreError>> {
        let mut failures = 0;
        while !self.done {
            let request = ListRequest {
                container: &self.container,
                delimiter: &self.delimiter,
                prefix: &self.prefix,
                marker: &self.marker,
                max_results: self.page_size,
            };
            let page = match self.store.list_blobs(request).await {
                Ok(page) => page,
                Err(e) => {
                    failures += 1;
                    warn!(
                        prefix = %self.prefix,
                        attempt = failures,
                        code = e.code,
                        "listing call failed"
                    );
                    if failures >= MAX_LIST_FAILURES {
                        error!(
                            prefix = %self.prefix,
                            code = e.code,
                            "listing gave up after {MAX_LIST_FAILURES} consecutive failures"
                        );
                        self.done = true;
                        return Some(Err(e));
                    }
                    continue;
                }
            };

            failures = 0;
            self.marker = page.next_marker;
            self.done = self.marker.is_empty();
            let Some(first) = page.items.first() else {
                continue;
            };
            let duplicate_boundary = self.prior.as_deref() == Some(first.name.as_str());
            self.prior = page.items.last().map(|item| item.name.clone());
            return Some(Ok(ListSegment {
                items: page.items,
                duplicate_boundary,
            }));
        }
        None
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ListSegment, StoreError>> + Send {
        stream::unfold(self, |mut listing| async move {
            listing
                .next_segment()
                .await
                .map(|segment| (segment, listing))
        })
    }

    /// Drain the listing into one duplicate-free, store-ordered vector.
    pub async fn collect_unique(self) -> Result<Vec<BlobItem>, StoreError> {
        let mut segments = pin!(self.into_stream());
        let mut items = Vec::new();
        while let Some(segment) = segments.try_next().await? {
            items.extend(segment.into_unique_items());
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::memory::{MemoryBlobStore, StoreOp};
    use crate::vfs::markers::directory_marker_metadata;
    use tracing_test::traced_test;

    const C: &str = "c";

    fn store_with(keys: &[&str]) -> Arc<MemoryBlobStore> {
        let store = Arc::new(MemoryBlobStore::new());
        for key in keys {
            store.put_blob(C, key, 1, vec![]);
        }
        store
    }

    fn names(items: &[BlobItem]) -> Vec<String> {
        items.iter().map(|i| i.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_boundary_dedup_reconstructs_listing_for_any_page_size() {
        let keys = ["p/a", "p/b", "p/c", "p/d", "p/e", "p/f", "p/g"];
        for repeat in [false, true] {
            for page_size in 1..=8 {
                let store = store_with(&keys);
                store.set_repeat_boundary(repeat);
                let lister = SegmentedLister::new(store);
                let items = lister
                    .list(C, "", "p/", Some(page_size))
                    .collect_unique()
                    .await
                    .unwrap();
                assert_eq!(names(&items), keys, "repeat={repeat} page_size={page_size}");
            }
        }
    }

    #[tokio::test]
    async fn test_segments_flag_repeated_first_item() {
        let store = store_with(&["p/1", "p/2", "p/3", "p/4"]);
        store.set_repeat_boundary(true);
        let lister = SegmentedLister::new(store);
        let mut listing = lister.list(C, DELIMITER, "p/", Some(2));

        let first = listing.next_segment().await.unwrap().unwrap();
        assert!(!first.duplicate_boundary);
        assert_eq!(names(&first.items), ["p/1", "p/2"]);

        let second = listing.next_segment().await.unwrap().unwrap();
        assert!(second.duplicate_boundary);
        assert_eq!(names(&second.items), ["p/2", "p/3", "p/4"]);
        assert_eq!(names(second.unique_items()), ["p/3", "p/4"]);

        assert!(listing.next_segment().await.is_none());
    }

    #[tokio::test]
    async fn test_failures_do_not_advance_the_marker() {
        let store = store_with(&["p/1", "p/2", "p/3"]);
        let lister = SegmentedLister::new(store.clone());
        let mut listing = lister.list(C, DELIMITER, "p/", Some(2));
        listing.next_segment().await.unwrap().unwrap();

        store.clear_journal();
        store.fail_next_lists(3, 503);
        let second = listing.next_segment().await.unwrap().unwrap();
        assert_eq!(names(&second.items), ["p/3"]);
        let journal = store.journal();
        assert_eq!(journal.len(), 4);
        assert!(journal.iter().all(|op| *op
            == StoreOp::List {
                prefix: "p/".into(),
                marker: "p/2".into()
            }));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_retry_budget() {
        let store = store_with(&["p/1"]);
        let lister = SegmentedLister::new(store.clone());

        store.fail_next_lists(MAX_LIST_FAILURES - 1, 500);
        let items = lister.list(C, DELIMITER, "p/", None).collect_unique().await;
        assert_eq!(items.unwrap().len(), 1);
        assert!(logs_contain("listing call failed"));

        store.clear_journal();
        store.fail_next_lists(MAX_LIST_FAILURES, 500);
        let err = lister
            .list(C, DELIMITER, "p/", None)
            .collect_unique()
            .await
            .unwrap_err();
        assert_eq!(err.code, 500);
        assert_eq!(store.journal().len(), MAX_LIST_FAILURES);
        assert!(logs_contain("listing gave up"));
    }

    #[tokio::test]
    async fn test_directory_emptiness_states() {
        let store = Arc::new(MemoryBlobStore::new());
        let lister = SegmentedLister::new(store.clone());
        assert_eq!(lister.is_directory_empty(C, "a").await, DirectoryState::NotExist);

        store.put_blob(C, "a", 0, directory_marker_metadata());
        assert_eq!(lister.is_directory_empty(C, "a").await, DirectoryState::Empty);

        store.put_blob(C, "a/b", 4, vec![]);
        assert_eq!(lister.is_directory_empty(C, "a").await, DirectoryState::NotEmpty);
    }

    #[tokio::test]
    async fn test_lone_legacy_marker_means_empty() {
        let store = Arc::new(MemoryBlobStore::new());
        let lister = SegmentedLister::new(store.clone());
        store.put_blob(C, "d/.directory", 0, vec![]);
        assert_eq!(lister.is_directory_empty(C, "d").await, DirectoryState::Empty);

        store.put_blob(C, "d/z", 0, vec![]);
        assert_eq!(lister.is_directory_empty(C, "d").await, DirectoryState::NotEmpty);
    }

    #[tokio::test]
    async fn test_single_subdirectory_is_not_empty() {
        let store = Arc::new(MemoryBlobStore::new());
        let lister = SegmentedLister::new(store.clone());
        store.put_blob(C, "d/sub/x", 1, vec![]);
        assert_eq!(lister.is_directory_empty(C, "d").await, DirectoryState::NotEmpty);
    }

    #[tokio::test]
    async fn test_emptiness_errors() {
        let store = Arc::new(MemoryBlobStore::new());
        let lister = SegmentedLister::new(store.clone());
        store.put_blob(C, "a", 0, directory_marker_metadata());

        store.fail_next_lookups(1, 403);
        assert_eq!(
            lister.is_directory_empty(C, "a").await,
            DirectoryState::Error(StoreError::new(403, "injected lookup failure"))
        );

        store.fail_next_lists(MAX_LIST_FAILURES, 500);
        assert!(matches!(
            lister.is_directory_empty(C, "a").await,
            DirectoryState::Error(StoreError { code: 500, .. })
        ));
    }
}

//! Remote blob store contract consumed by the namespace engine.
//!
//! The store is a flat key space partitioned into containers. Directories do
//! not exist natively; they are simulated with delimiter listings and marker
//! objects (see `vfs::markers`).

use async_trait::async_trait;
use std::fmt;
use std::time::SystemTime;

/// Ordered metadata pairs. Keys are not guaranteed to be unique.
pub type Metadata = Vec<(String, String)>;

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// Full key. Prefix entries of a delimiter listing end with the delimiter.
    pub name: String,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub metadata: Metadata,
    /// Set by the store for prefix entries of a hierarchical listing.
    pub is_directory: bool,
}

impl BlobItem {
    pub fn blob(name: impl Into<String>, size: u64, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
            metadata,
            is_directory: false,
        }
    }

    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            last_modified: None,
            metadata: Vec::new(),
            is_directory: true,
        }
    }
}

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobProperty {
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub metadata: Metadata,
    /// `false` when the lookup target does not exist.
    pub valid: bool,
}

/// One page of a listing. An empty `next_marker` marks the final page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub items: Vec<BlobItem>,
    pub next_marker: String,
}

/// Arguments of a single listing call.
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    pub container: &'a str,
    /// Empty for a flat listing.
    pub delimiter: &'a str,
    pub prefix: &'a str,
    /// Continuation token from the previous page, empty for the first call.
    pub marker: &'a str,
    pub max_results: Option<u32>,
}

/// Failure reported by the store. `code` is the store's own numeric code
/// (HTTP status for the S3 adapter); it is never zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: i32,
    pub message: String,
}

impl StoreError {
    pub const NOT_FOUND: i32 = 404;
    /// No response was received from the store at all.
    pub const DISPATCH_FAILURE: i32 = 599;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(Self::NOT_FOUND, format!("blob not found: {key}"))
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Self::NOT_FOUND
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {}

/// Abstract remote store. Implementations must return listing items in
/// strictly increasing lexicographic key order across all pages of one
/// logical listing; the boundary dedup in `vfs::lister` depends on it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_blobs(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError>;

    async fn get_property(&self, container: &str, key: &str) -> Result<BlobProperty, StoreError>;

    /// Server-side copy, metadata included.
    async fn copy_blob(&self, container: &str, src: &str, dst: &str) -> Result<(), StoreError>;

    async fn delete_blob(&self, container: &str, key: &str) -> Result<(), StoreError>;
}

/// Point lookup folded into an existence answer: `Ok(None)` when the key is
/// absent, whichever way the store chose to say so.
pub async fn lookup_blob(
    store: &dyn BlobStore,
    container: &str,
    key: &str,
) -> Result<Option<BlobProperty>, StoreError> {
    match store.get_property(container, key).await {
        Ok(prop) if prop.valid => Ok(Some(prop)),
        Ok(_) => Ok(None),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

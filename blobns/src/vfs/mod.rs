//! VFS layer: the namespace reconciliation engine
//!
//! Responsibilities:
//! - Resolve attributes for a virtual path from the local cache mirror
//!   first and the remote store second.
//! - Enumerate and test virtual directories through paginated, retried
//!   remote listings.
//! - Rename and remove directory subtrees by merging local and remote
//!   entries without double processing.
//!
//! Submodules:
//! - `config`, `context`: per-mount configuration and shared state
//! - `errno`, `error`: store codes to POSIX errors
//! - `lock`: per-path mutual exclusion
//! - `cache`: local cache mirror and directory provisioning
//! - `lister`: segmented listing and the emptiness test
//! - `resolver`, `rename`: attribute resolution and subtree moves
//! - `namespace`: facade used by the binary and by embedders
pub mod cache;
pub mod config;
pub mod context;
pub mod errno;
pub mod error;
pub mod lister;
pub mod lock;
pub mod markers;
pub mod namespace;
pub mod path;
pub mod rename;
pub mod resolver;

pub use error::{NamespaceError, Result};
pub use lister::DirectoryState;
pub use namespace::BlobNamespace;
pub use resolver::{FileAttr, FileType};

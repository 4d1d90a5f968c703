//! Error surface of the namespace engine. Every variant projects onto a
//! POSIX errno so FUSE-style callers can return `-errno`.

use crate::cadapter::client::StoreError;
use crate::vfs::errno::ErrnoMapper;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("invalid path: {path}")]
    InvalidPath { path: String },

    /// Local cache mirror I/O. Not retried.
    #[error("cache i/o on {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Remote failure, already translated through the errno mapper.
    #[error("store request for '{key}' failed (errno {errno}): {source}")]
    Store {
        key: String,
        errno: i32,
        #[source]
        source: StoreError,
    },
}

pub type Result<T> = std::result::Result<T, NamespaceError>;

impl NamespaceError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn cache(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            source,
        }
    }

    pub fn store(mapper: &ErrnoMapper, key: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            key: key.into(),
            errno: mapper.map(source.code),
            source,
        }
    }

    /// Positive POSIX error code.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } => libc::ENOENT,
            Self::NotADirectory { .. } => libc::ENOTDIR,
            Self::NotEmpty { .. } => libc::ENOTEMPTY,
            Self::InvalidPath { .. } => libc::EINVAL,
            Self::Cache { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            Self::Store { errno, .. } => *errno,
        }
    }

    /// FUSE-style return value.
    pub fn to_negative_errno(&self) -> i32 {
        -self.errno()
    }

    pub fn is_not_found(&self) -> bool {
        self.errno() == libc::ENOENT
    }
}

impl From<NamespaceError> for io::Error {
    fn from(value: NamespaceError) -> Self {
        io::Error::from_raw_os_error(value.errno())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_projection() {
        let mapper = ErrnoMapper::new();
        assert_eq!(NamespaceError::not_found("/a").to_negative_errno(), -libc::ENOENT);
        let err = NamespaceError::store(&mapper, "a", StoreError::new(403, "denied"));
        assert_eq!(err.errno(), libc::EACCES);
        let err = NamespaceError::cache("/tmp/x", io::Error::from_raw_os_error(libc::EROFS));
        assert_eq!(err.errno(), libc::EROFS);
        let err = NamespaceError::cache("/tmp/x", io::Error::other("no os code"));
        assert_eq!(err.errno(), libc::EIO);
        let io_err: io::Error = NamespaceError::NotEmpty { path: "/d".into() }.into();
        assert_eq!(io_err.raw_os_error(), Some(libc::ENOTEMPTY));
    }
}

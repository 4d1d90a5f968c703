//! Wire-compatible metadata conventions shared with existing data.
//! These literals must not change.

use crate::cadapter::client::{BlobItem, Metadata};

/// Metadata key marking a zero-size blob as a directory.
pub const DIRECTORY_MARKER_KEY: &str = "hdi_isfolder";
/// Metadata key marking a blob whose content is a symlink target.
pub const SYMLINK_MARKER_KEY: &str = "is_symlink";
pub const MARKER_TRUE: &str = "true";
/// Reserved suffix of the legacy directory marker blob (`dir/.directory`).
pub const LEGACY_DIRECTORY_SUFFIX: &str = ".directory";

fn has_flag(metadata: &Metadata, key: &str) -> bool {
    metadata.iter().any(|(k, v)| k == key && v == MARKER_TRUE)
}

/// A zero-size blob tagged `hdi_isfolder=true`.
pub fn is_directory_blob(size: u64, metadata: &Metadata) -> bool {
    size == 0 && has_flag(metadata, DIRECTORY_MARKER_KEY)
}

/// A listed item that stands for a directory: a prefix entry of a
/// delimiter listing or a directory marker blob.
pub fn is_directory_item(item: &BlobItem) -> bool {
    item.is_directory || item.name.ends_with('/') || is_directory_blob(item.size, &item.metadata)
}

pub fn is_symlink_blob(metadata: &Metadata) -> bool {
    has_flag(metadata, SYMLINK_MARKER_KEY)
}

/// Key ends with the legacy suffix and carries something before it.
pub fn is_legacy_marker(name: &str) -> bool {
    name.len() > LEGACY_DIRECTORY_SUFFIX.len() && name.ends_with(LEGACY_DIRECTORY_SUFFIX)
}

/// Key of the legacy marker blob for the directory `dir_key`.
pub fn legacy_marker_key(dir_key: &str) -> String {
    format!("{dir_key}/{LEGACY_DIRECTORY_SUFFIX}")
}

pub fn directory_marker_metadata() -> Metadata {
    vec![(DIRECTORY_MARKER_KEY.to_string(), MARKER_TRUE.to_string())]
}

pub fn symlink_metadata() -> Metadata {
    vec![(SYMLINK_MARKER_KEY.to_string(), MARKER_TRUE.to_string())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_marker_requires_zero_size_and_exact_value() {
        let meta = directory_marker_metadata();
        assert!(is_directory_blob(0, &meta));
        assert!(!is_directory_blob(1, &meta));
        let wrong = vec![(DIRECTORY_MARKER_KEY.to_string(), "True".to_string())];
        assert!(!is_directory_blob(0, &wrong));
        // Duplicate keys: any truthy pair wins.
        let dup = vec![
            (DIRECTORY_MARKER_KEY.to_string(), "false".to_string()),
            (DIRECTORY_MARKER_KEY.to_string(), "true".to_string()),
        ];
        assert!(is_directory_blob(0, &dup));
    }

    #[test]
    fn test_legacy_marker_detection() {
        assert!(is_legacy_marker("a/.directory"));
        assert!(!is_legacy_marker(".directory"));
        assert!(!is_legacy_marker("a/directory"));
        assert_eq!(legacy_marker_key("a/b"), "a/b/.directory");
        assert!(is_symlink_blob(&symlink_metadata()));
    }

    #[test]
    fn test_directory_items() {
        assert!(is_directory_item(&BlobItem::prefix("a/")));
        assert!(is_directory_item(&BlobItem::blob("a", 0, directory_marker_metadata())));
        assert!(!is_directory_item(&BlobItem::blob("a", 0, vec![])));
    }
}

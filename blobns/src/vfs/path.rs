//! Path helpers for the virtual namespace.
//!
//! Virtual paths are absolute, `/`-separated strings (`/a/b`). Blob keys are
//! the same string without the leading separator (`a/b`). Every join
//! returns an owned `String`.

pub const SEPARATOR: char = '/';
pub const DELIMITER: &str = "/";

pub fn is_root(path: &str) -> bool {
    path.trim_start_matches(SEPARATOR).is_empty()
}

/// Blob key of a virtual path.
pub fn blob_key(path: &str) -> &str {
    path.trim_start_matches(SEPARATOR)
}

/// Listing prefix for the children of `path`: `key/`, or empty at the root.
pub fn child_prefix(path: &str) -> String {
    let key = blob_key(path);
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}{DELIMITER}")
    }
}

/// Join a bare child name onto a virtual directory path.
pub fn join(dir: &str, name: &str) -> String {
    let mut out = String::with_capacity(dir.len() + name.len() + 1);
    out.push_str(dir.trim_end_matches(SEPARATOR));
    out.push(SEPARATOR);
    out.push_str(name);
    out
}

/// Trailing component of a listed key under `prefix`, with any trailing
/// delimiter of a prefix entry removed.
pub fn bare_name<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
        .map(|rest| rest.trim_end_matches(SEPARATOR))
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_and_joins() {
        assert!(is_root("/"));
        assert!(!is_root("/a"));
        assert_eq!(blob_key("/a/b"), "a/b");
        assert_eq!(child_prefix("/a/b"), "a/b/");
        assert_eq!(child_prefix("/"), "");
        assert_eq!(join("/a", "x"), "/a/x");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/a/", "x"), "/a/x");
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("a/x", "a/"), Some("x"));
        assert_eq!(bare_name("a/sub/", "a/"), Some("sub"));
        assert_eq!(bare_name("a/", "a/"), None);
        assert_eq!(bare_name("b/x", "a/"), None);
    }
}

//! Translation of remote store error codes to POSIX errno values.

use tracing::info;

/// Fixed table of store codes with a POSIX meaning.
const ERROR_MAPPING: &[(i32, i32)] = &[
    (400, libc::EINVAL),
    (403, libc::EACCES),
    (404, libc::ENOENT),
    (409, libc::EEXIST),
    (412, libc::EBUSY),
    (503, libc::EAGAIN),
];

/// Total lookup from store codes to errno. Codes outside the table become
/// `EIO` and leave an info record behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrnoMapper;

impl ErrnoMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map(&self, code: i32) -> i32 {
        match ERROR_MAPPING.iter().find(|(c, _)| *c == code) {
            Some((_, errno)) => *errno,
            None => {
                info!(
                    code,
                    eio = libc::EIO,
                    "failed to map storage error code to a proper errno, returning EIO"
                );
                libc::EIO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_table_entries_map_exactly() {
        let mapper = ErrnoMapper::new();
        for (code, errno) in ERROR_MAPPING {
            assert_eq!(mapper.map(*code), *errno);
        }
        assert_eq!(mapper.map(404), libc::ENOENT);
        assert_eq!(mapper.map(403), libc::EACCES);
    }

    #[traced_test]
    #[test]
    fn test_unknown_code_falls_back_to_eio_and_logs() {
        let mapper = ErrnoMapper::new();
        assert_eq!(mapper.map(418), libc::EIO);
        assert!(logs_contain("failed to map storage error code"));
        assert!(logs_contain("code=418"));
    }

    #[traced_test]
    #[test]
    fn test_known_code_leaves_no_miss_record() {
        let mapper = ErrnoMapper::new();
        assert_eq!(mapper.map(409), libc::EEXIST);
        assert!(!logs_contain("failed to map storage error code"));
    }
}

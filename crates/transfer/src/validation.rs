use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use filestream_protocol::constants::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_REQUEST_SIZE};

use crate::TransferError;

/// A size ceiling violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("file {} is {size} bytes, exceeding the {max} byte limit", .path.display())]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("request totals {total} bytes, exceeding the {max} byte limit")]
    RequestTooLarge { total: u64, max: u64 },
}

/// Per-file and per-request size ceilings, checked before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLimits {
    pub max_file_size: u64,
    pub max_request_size: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

impl TransferLimits {
    pub fn new(max_file_size: u64, max_request_size: u64) -> Self {
        Self {
            max_file_size,
            max_request_size,
        }
    }

    /// Checks every `(path, size)` pair in order and returns the total size.
    ///
    /// The first file above `max_file_size` wins; the aggregate is checked
    /// only once every file passed individually.
    pub fn validate<'a, I>(&self, files: I) -> Result<u64, LimitError>
    where
        I: IntoIterator<Item = (&'a Path, u64)>,
    {
        let mut total: u64 = 0;
        for (path, size) in files {
            if size > self.max_file_size {
                return Err(LimitError::FileTooLarge {
                    path: path.to_path_buf(),
                    size,
                    max: self.max_file_size,
                });
            }
            total = total.saturating_add(size);
        }

        if total > self.max_request_size {
            return Err(LimitError::RequestTooLarge {
                total,
                max: self.max_request_size,
            });
        }
        Ok(total)
    }
}

/// Validates that `name` is a bare file name with no directory components.
///
/// Rejects:
/// - Empty or whitespace-only names
/// - Path separators (`/` or `\`)
/// - `.` and `..`
/// - NUL bytes
pub fn validate_upload_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }
    if name.contains('\0') {
        return Err(TransferError::InvalidName(format!(
            "NUL byte not allowed: {name:?}"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(sizes: &[(&'static str, u64)]) -> Vec<(&'static Path, u64)> {
        sizes.iter().map(|(p, s)| (Path::new(*p), *s)).collect()
    }

    #[test]
    fn accepts_within_limits() {
        let limits = TransferLimits::new(10, 25);
        let total = limits.validate(files(&[("a", 10), ("b", 10), ("c", 5)])).unwrap();
        assert_eq!(total, 25);
    }

    #[test]
    fn rejects_single_oversized_file_under_aggregate() {
        let limits = TransferLimits::new(10, 1000);
        let err = limits.validate(files(&[("a", 5), ("big", 11)])).unwrap_err();
        assert_eq!(
            err,
            LimitError::FileTooLarge {
                path: PathBuf::from("big"),
                size: 11,
                max: 10
            }
        );
    }

    #[test]
    fn rejects_aggregate_when_every_file_fits() {
        let limits = TransferLimits::new(10, 25);
        let err = limits.validate(files(&[("a", 10), ("b", 10), ("c", 10)])).unwrap_err();
        assert_eq!(err, LimitError::RequestTooLarge { total: 30, max: 25 });
    }

    #[test]
    fn first_failing_file_wins() {
        let limits = TransferLimits::new(10, 15);
        let err = limits
            .validate(files(&[("ok", 9), ("first", 20), ("second", 30)]))
            .unwrap_err();
        assert!(matches!(err, LimitError::FileTooLarge { ref path, .. } if path == Path::new("first")));
    }

    #[test]
    fn empty_input_is_zero() {
        let limits = TransferLimits::default();
        assert_eq!(limits.validate(files(&[])).unwrap(), 0);
    }

    #[test]
    fn boundary_values_are_inclusive() {
        let limits = TransferLimits::new(10, 10);
        assert_eq!(limits.validate(files(&[("a", 10)])).unwrap(), 10);
    }

    #[test]
    fn default_limits() {
        let limits = TransferLimits::default();
        assert_eq!(limits.max_file_size, 100 * 1024 * 1024);
        assert_eq!(limits.max_request_size, 500 * 1024 * 1024);
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_upload_name("a.txt").is_ok());
        assert!(validate_upload_name(".hidden").is_ok());
        assert!(validate_upload_name("보고서.pdf").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_upload_name("").is_err());
        assert!(validate_upload_name("   ").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_upload_name("..").is_err());
        assert!(validate_upload_name(".").is_err());
        assert!(validate_upload_name("../etc/passwd").is_err());
        assert!(validate_upload_name("sub/file.txt").is_err());
        assert!(validate_upload_name("C:\\Windows\\evil").is_err());
        assert!(validate_upload_name("/abs").is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(validate_upload_name("a\0b").is_err());
    }
}

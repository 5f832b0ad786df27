/// Error types for keyscout scans.
///
/// Only two kinds of error abort a whole scan: a missing target directory and an invalid
/// configuration. Everything else is absorbed at a lower level:
///
/// - per-file failures (`FileNotFound`, `PermissionDenied`, `FileAccess`, `Encoding`) are
///   counted by the worker that owns the file and never leave it
/// - a `WorkerFailure` degrades to a fatal-flagged partial result and does not stop
///   sibling workers or the driver
///
/// ```rust,ignore
/// match keyscout::scan(&config) {
///     Ok(output) => // keyword -> files, counters, elapsed time,
///     Err(ScanError::DirectoryNotFound(path)) => // nothing was dispatched,
///     Err(ScanError::InvalidConfiguration(msg)) => // nothing was dispatched,
///     Err(e) => // plumbing failure
/// }
/// ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while scanning a corpus
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to read {path}: {source}")]
    FileAccess {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid UTF-8 in file {path}: {source}")]
    Encoding {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
    #[error("Worker {worker_id} failed: {reason}")]
    WorkerFailure { worker_id: usize, reason: String },
    #[error("Failed to start workers: {0}")]
    WorkerSpawn(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed worker message: {0}")]
    Wire(#[from] serde_json::Error),
}

impl ScanError {
    pub fn directory_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DirectoryNotFound(path.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn worker_failure(worker_id: usize, reason: impl Into<String>) -> Self {
        Self::WorkerFailure {
            worker_id,
            reason: reason.into(),
        }
    }

    pub fn worker_spawn(msg: impl Into<String>) -> Self {
        Self::WorkerSpawn(msg.into())
    }

    /// Classifies an I/O failure on a single file.
    pub fn file_access(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::FileAccess {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn encoding(path: &Path, source: std::str::Utf8Error) -> Self {
        Self::Encoding {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error aborts the whole scan rather than a single file or worker
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DirectoryNotFound(_) | Self::InvalidConfiguration(_) | Self::WorkerSpawn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let err = ScanError::directory_not_found("corpus");
        assert!(matches!(err, ScanError::DirectoryNotFound(_)));

        let err = ScanError::invalid_configuration("worker count must be at least 1");
        assert!(matches!(err, ScanError::InvalidConfiguration(_)));

        let err = ScanError::worker_failure(3, "panicked");
        assert!(matches!(err, ScanError::WorkerFailure { worker_id: 3, .. }));
    }

    #[test]
    fn test_file_access_classification() {
        let path = Path::new("a.txt");

        let err = ScanError::file_access(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ScanError::FileNotFound(_)));

        let err = ScanError::file_access(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ScanError::PermissionDenied(_)));

        let err = ScanError::file_access(path, io::Error::from(io::ErrorKind::InvalidData));
        assert!(matches!(err, ScanError::FileAccess { .. }));
    }

    #[test]
    fn test_error_messages() {
        let err = ScanError::directory_not_found("missing_dir");
        assert_eq!(err.to_string(), "Directory not found: missing_dir");

        let err = ScanError::invalid_configuration("worker count must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: worker count must be at least 1"
        );

        let err = ScanError::worker_failure(2, "exited without a result");
        assert_eq!(err.to_string(), "Worker 2 failed: exited without a result");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ScanError::directory_not_found("x").is_fatal());
        assert!(ScanError::invalid_configuration("x").is_fatal());
        assert!(!ScanError::FileNotFound(PathBuf::from("x")).is_fatal());
        assert!(!ScanError::worker_failure(1, "x").is_fatal());
    }
}

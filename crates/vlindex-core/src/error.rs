//! Error taxonomy shared by descriptors, matchers and indexes.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid descriptor: {0}")]
    Validation(String),
    #[error("invalid descriptor batch: {0}")]
    InvalidBatch(String),
    #[error("descriptor version mismatch{}: expected {expected}, got {actual}", position_suffix(.position))]
    VersionMismatch {
        expected: u32,
        actual: u32,
        /// Offending element when the descriptor came from a batch.
        position: Option<usize>,
    },
    #[error("index is empty")]
    EmptyIndex,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation not supported: {0}")]
    UnsupportedOperation(&'static str),
    #[error("index file not found: {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("index file {} is malformed: {message}", .path.display())]
    Format { path: PathBuf, message: String },
    #[error("permission denied writing {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is a directory", .path.display())]
    IsADirectory { path: PathBuf },
    #[error("failed to serialize index to {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn position_suffix(position: &Option<usize>) -> String {
    match position {
        Some(pos) => format!(" at batch position {pos}"),
        None => String::new(),
    }
}

/// Serializable error report: stable numeric code, short description, detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub error_code: u32,
    pub desc: &'static str,
    pub detail: String,
}

impl Error {
    /// True for malformed descriptors or batches and descriptor/index version
    /// mismatches.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::InvalidBatch(_) | Error::VersionMismatch { .. }
        )
    }

    /// Stable numeric code, kept compatible with the engine's error table.
    pub fn code(&self) -> u32 {
        match self {
            Error::EmptyIndex => 100001,
            Error::VersionMismatch { .. } => 100004,
            Error::Validation(_) => 100007,
            Error::InvalidBatch(_) => 100008,
            Error::InvalidArgument(_) => 100013,
            Error::UnsupportedOperation(_) => 100020,
            Error::NotFound { .. } => 100022,
            Error::Serialization { .. } | Error::PermissionDenied { .. } => 100023,
            Error::Format { .. } => 100024,
            Error::IsADirectory { .. } => 100031,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        let desc = match self {
            Error::Validation(_) => "Invalid descriptor",
            Error::InvalidBatch(_) => "Invalid descriptor batch",
            Error::VersionMismatch { .. } => "Descriptors are incompatible",
            Error::EmptyIndex => "Buffer is empty",
            Error::InvalidArgument(_) => "Invalid input",
            Error::UnsupportedOperation(_) => "Module is not ready",
            Error::NotFound { .. } => "Error during index loading",
            Error::Format { .. } => "Archive error",
            Error::PermissionDenied { .. } | Error::Serialization { .. } => {
                "Error during index saving"
            }
            Error::IsADirectory { .. } => "Bad path for index saving / loading",
        };
        ErrorInfo {
            error_code: self.code(),
            desc,
            detail: self.to_string(),
        }
    }

    /// Classify an I/O failure that happened while writing `path`.
    pub(crate) fn from_write(path: &std::path::Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied { path, source },
            _ => Error::Serialization { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_is_validation() {
        let err = Error::VersionMismatch { expected: 54, actual: 56, position: None };
        assert!(err.is_validation());
        assert!(Error::Validation("bad".into()).is_validation());
        assert!(Error::InvalidBatch("empty".into()).is_validation());
        assert!(!Error::EmptyIndex.is_validation());
    }

    #[test]
    fn test_version_mismatch_message_names_position() {
        let err = Error::VersionMismatch { expected: 54, actual: 56, position: Some(3) };
        assert_eq!(
            err.to_string(),
            "descriptor version mismatch at batch position 3: expected 54, got 56"
        );
    }

    #[test]
    fn test_write_error_classification() {
        let path = std::path::Path::new("/tmp/index.bin");
        let denied = Error::from_write(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, Error::PermissionDenied { .. }));

        let other = Error::from_write(path, io::Error::from(io::ErrorKind::WriteZero));
        assert!(matches!(other, Error::Serialization { .. }));
    }

    #[test]
    fn test_info_carries_code_and_detail() {
        let info = Error::EmptyIndex.info();
        assert_eq!(info.error_code, 100001);
        assert_eq!(info.desc, "Buffer is empty");
        assert_eq!(info.detail, "index is empty");
    }
}

//! Error taxonomy for scanning and recovery
//!
//! Scan errors never escape `perform_full_scan`: they are logged and turned into
//! report failures. Recovery errors never escape `recover_file`: they are turned
//! into a failed `RecoveryOutcome` carrying an `ErrorKind`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a single source scanner
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanner {scanner} unavailable: {reason}")]
    ScannerUnavailable { scanner: String, reason: String },

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("media index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn unavailable(scanner: &str, reason: impl Into<String>) -> Self {
        ScanError::ScannerUnavailable {
            scanner: scanner.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ScanError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::ScannerUnavailable,
        }
    }
}

/// Errors raised while extracting a single record
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("source no longer exists: {}", .0.display())]
    SourceGone(PathBuf),

    #[error("raw extraction failed: {0}")]
    CarveFailed(String),

    #[error("cannot write to {}: {source}", .path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecoveryError {
    pub fn destination(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecoveryError::DestinationWrite {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoveryError::SourceGone(_) => ErrorKind::SourceGone,
            RecoveryError::CarveFailed(_) => ErrorKind::CarveFailed,
            RecoveryError::DestinationWrite { .. } => ErrorKind::DestinationWrite,
        }
    }
}

/// Serializable discriminant callers render for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ScannerUnavailable,
    PermissionDenied,
    SourceGone,
    CarveFailed,
    DestinationWrite,
    Cancelled,
    /// A scanner returned records stamped with another source
    MislabeledRecords,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::ScannerUnavailable => "scanner unavailable",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::SourceGone => "source gone",
            ErrorKind::CarveFailed => "carve failed",
            ErrorKind::DestinationWrite => "destination write failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MislabeledRecords => "mislabeled records",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_error_kinds() {
        assert_eq!(
            RecoveryError::SourceGone(PathBuf::from("/sdcard/a.jpg")).kind(),
            ErrorKind::SourceGone
        );
        assert_eq!(
            RecoveryError::CarveFailed("overwritten".into()).kind(),
            ErrorKind::CarveFailed
        );
        let err = RecoveryError::destination(
            "/out",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(err.kind(), ErrorKind::DestinationWrite);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_permission_denied_maps_to_own_kind() {
        let err = ScanError::PermissionDenied(PathBuf::from("/data"));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(
            ScanError::unavailable("indexed", "no db").kind(),
            ErrorKind::ScannerUnavailable
        );
    }
}

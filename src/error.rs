//! Crate-level error type.
//!
//! Every failure that leaves the engine is a [`MosaicError`], and every
//! `MosaicError` maps onto exactly one [`ErrorKind`]. Callers that need to
//! tell a fatal condition (the emblem is gone) from a recoverable one (one
//! photo failed to decode) match on the kind instead of the message text.

use crate::imaging::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Closed classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file or record the operation depends on does not exist.
    NotFound,
    /// Bytes exist but could not be decoded as an image (or encoded back).
    DecodeFailure,
    /// Filesystem or catalog I/O failed.
    IoFailure,
    /// The caller supplied values the engine refuses to work with.
    ValidationFailure,
}

#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("emblem unreadable ({path}): {source}")]
    EmblemUnreadable {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("image error: {0}")]
    Imaging(#[from] BackendError),
    #[error("{context} ({path}): {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog {operation} failed: {source}")]
    Catalog {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid {0}")]
    Validation(String),
}

impl MosaicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MosaicError::NotFound { .. } | MosaicError::EmblemUnreadable { .. } => {
                ErrorKind::NotFound
            }
            MosaicError::Imaging(e) => match e {
                BackendError::NotFound(_) => ErrorKind::NotFound,
                BackendError::Decode { .. } => ErrorKind::DecodeFailure,
                BackendError::Io(_) | BackendError::ProcessingFailed(_) => ErrorKind::IoFailure,
            },
            MosaicError::Io { .. } | MosaicError::Catalog { .. } => ErrorKind::IoFailure,
            MosaicError::Validation(_) => ErrorKind::ValidationFailure,
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MosaicError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn catalog(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| MosaicError::Catalog { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, MosaicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_not_found_maps_to_not_found_kind() {
        let err = MosaicError::from(BackendError::NotFound("/x/emblem.png".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn decode_failure_kind() {
        let err = MosaicError::from(BackendError::Decode {
            path: "/x/photo.jpg".into(),
            reason: "truncated".into(),
        });
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
        assert!(err.to_string().contains("photo.jpg"));
    }

    #[test]
    fn io_error_carries_context_and_path() {
        let err = MosaicError::io(
            "copy drop file",
            "/drop/a.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        let msg = err.to_string();
        assert!(msg.contains("copy drop file"));
        assert!(msg.contains("/drop/a.jpg"));
    }

    #[test]
    fn undecodable_emblem_is_still_not_found() {
        let err = MosaicError::EmblemUnreadable {
            path: "/x/emblem.png".into(),
            source: BackendError::Decode {
                path: "/x/emblem.png".into(),
                reason: "bad header".into(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn validation_kind() {
        let err = MosaicError::Validation("grid size 0x4".into());
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert_eq!(err.to_string(), "invalid grid size 0x4");
    }
}

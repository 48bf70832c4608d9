//! The error type returned by [`crate::backend::StorageBackend`] implementations.

use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The classification of a [`BackendError`].
///
/// Backend implementors should pick the kind carefully: it is the only part of the
/// error the connection core's translator (in `xfer-connection`) is allowed to branch
/// on. Everything else (the `source`) is preserved for logging only.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum BackendErrorKind {
    /// The path does not exist on the backend.
    #[display("not exist")]
    NotExist,
    /// The backend denied the operation for permission reasons.
    #[display("permission denied")]
    Permission,
    /// The backend does not implement this operation at all.
    #[display("unsupported")]
    Unsupported,
    /// The backend cannot currently report its free space (e.g. the remote quota
    /// endpoint is unreachable).
    #[display("storage size unavailable")]
    StorageSizeUnavailable,
    /// The underlying connection to the backend was closed or reset mid-operation.
    #[display("closed")]
    Closed,
    /// The operation was aborted, e.g. by a cancellation signal.
    #[display("aborted")]
    Aborted,
    /// Anything else: a local I/O error, a malformed response, ...
    #[display("other")]
    Other,
}

/// The error returned by [`crate::backend::StorageBackend`] implementations.
#[derive(Debug, Error)]
#[error("backend error: {kind}")]
pub struct BackendError {
    kind: BackendErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl BackendError {
    /// Creates a new backend error of the given kind, wrapping `error` as its source.
    pub fn new<E>(kind: BackendErrorKind, error: E) -> BackendError
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BackendError {
            kind,
            source: Some(error.into()),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }
}

impl From<BackendErrorKind> for BackendError {
    fn from(kind: BackendErrorKind) -> BackendError {
        BackendError { kind, source: None }
    }
}

// Maps IO errors to backend errors. Mirrors the `std::io::Error` classification a
// filesystem-backed implementation produces; other backends (object store, remote
// file-transfer client) construct `BackendError` directly from their own error types.
impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        let kind = err.kind();
        match kind {
            std::io::ErrorKind::NotFound => BackendError::new(BackendErrorKind::NotExist, err),
            std::io::ErrorKind::PermissionDenied => BackendError::new(BackendErrorKind::Permission, err),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionAborted => {
                BackendError::new(BackendErrorKind::Closed, err)
            }
            std::io::ErrorKind::Unsupported => BackendError::new(BackendErrorKind::Unsupported, err),
            _ => BackendError::new(BackendErrorKind::Other, err),
        }
    }
}

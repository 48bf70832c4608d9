//! Connection-level error vocabulary and protocol-aware translation.
//!
//! Generalizes the teacher crate's `storage::Error`/`ErrorKind` sentinel pattern:
//! a closed `kind` plus an optional boxed source, so identity-based predicates
//! (`is_quota_exceeded_error`, ...) keep working no matter how many times the error
//! has been wrapped or displayed.

use crate::protocol::Protocol;
use derive_more::Display;
use xfer_core::error::{BackendError, BackendErrorKind};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed taxonomy of connection-level error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnErrorKind {
    /// The target path does not exist.
    #[display("not exist")]
    NotExist,
    /// The permission oracle denied the operation.
    #[display("permission denied")]
    PermissionDenied,
    /// The backend does not support the requested operation.
    #[display("operation not supported")]
    OpUnsupported,
    /// A write-quota check failed.
    #[display("quota exceeded")]
    QuotaExceeded,
    /// A read-quota check failed. Distinct from `QuotaExceeded` because it signals
    /// exceeded-on-read rather than exceeded-on-write.
    #[display("read quota exceeded")]
    ReadQuotaExceeded,
    /// An uncategorized backend or core failure.
    #[display("generic failure")]
    GenericFailure,
    /// The connection (or the server) is shutting down.
    #[display("shutting down")]
    ShuttingDown,
    /// The backend cannot currently report available storage size.
    #[display("storage size unavailable")]
    StorageSizeUnavailable,
}

/// A connection-level error: a closed `kind` plus an optional underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ConnError {
    kind: ConnErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl ConnError {
    /// Builds a new error of `kind`, wrapping `source`.
    pub fn new<E>(kind: ConnErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ConnError {
            kind,
            source: Some(source.into()),
        }
    }

    /// The error's kind, surviving any amount of wrapping or redisplay.
    pub fn kind(&self) -> ConnErrorKind {
        self.kind
    }
}

impl From<ConnErrorKind> for ConnError {
    fn from(kind: ConnErrorKind) -> Self {
        ConnError { kind, source: None }
    }
}

impl From<BackendError> for ConnError {
    fn from(err: BackendError) -> Self {
        let kind = match err.kind() {
            BackendErrorKind::NotExist => ConnErrorKind::NotExist,
            BackendErrorKind::Permission => ConnErrorKind::PermissionDenied,
            BackendErrorKind::Unsupported => ConnErrorKind::OpUnsupported,
            BackendErrorKind::StorageSizeUnavailable => ConnErrorKind::StorageSizeUnavailable,
            BackendErrorKind::Closed | BackendErrorKind::Aborted => ConnErrorKind::GenericFailure,
            BackendErrorKind::Other => ConnErrorKind::GenericFailure,
        };
        ConnError::new(kind, err)
    }
}

/// How a `ProtocolError` should be rendered by its protocol handler: as a
/// protocol-native value (opaque to the core, preserved by identity) or as one of
/// the core's own sentinel error kinds.
#[derive(Debug)]
pub enum ProtocolErrorRepr {
    /// SFTP's native status codes (no-such-file, permission-denied, op-unsupported,
    /// failure), carried as a string tag since the wire encoding is a protocol
    /// handler concern, not the core's.
    SftpNative(&'static str),
    /// An OS-native error value, preserved by identity (e.g. `io::ErrorKind`).
    OsNative(Box<dyn std::error::Error + Send + Sync>),
    /// One of the core's own sentinel kinds, unchanged.
    Core(ConnErrorKind),
}

/// The user-visible error produced by [`translate`]: the protocol-specific
/// representation plus the original [`ConnErrorKind`], so predicates keep working
/// after translation regardless of which representation was chosen.
#[derive(Debug)]
pub struct ProtocolError {
    /// The original, untranslated kind.
    pub original_kind: ConnErrorKind,
    /// The representation the protocol handler should surface to its client.
    pub repr: ProtocolErrorRepr,
}

impl ProtocolError {
    /// Whether the original error was a quota-exceeded error.
    pub fn is_quota_exceeded(&self) -> bool {
        self.original_kind == ConnErrorKind::QuotaExceeded
    }

    /// Whether the original error was a not-exist error.
    pub fn is_not_exist(&self) -> bool {
        self.original_kind == ConnErrorKind::NotExist
    }
}

/// Translates a connection-level error to the representation appropriate for
/// `protocol`, per the fixed per-kind/per-protocol table. Idempotent: translating
/// an already-translated [`ConnErrorKind`] for the same protocol is a fixed point,
/// since translation only ever inspects `kind` (and, for `PermissionDenied`, whether
/// a backend cause is attached), never the previously chosen representation.
///
/// `PermissionDenied` is ambiguous by origin: a backend denying access (source
/// attached, via [`From<BackendError>`]) is reported to SFTP as its native
/// `permission-denied` status, while the permission oracle denying an operation
/// before any backend call (no source) is already a core sentinel and is wrapped
/// as SFTP's generic `failure` status instead, preserving the message. `ReadQuotaExceeded`
/// and `ShuttingDown` never originate from a backend, so they always take the
/// already-core path.
pub fn translate(err: ConnError, protocol: Protocol) -> ProtocolError {
    let kind = err.kind;
    let has_backend_source = err.source.is_some();
    let source = err
        .source
        .unwrap_or_else(|| Box::<dyn std::error::Error + Send + Sync>::from(kind.to_string()));
    let repr = match kind {
        ConnErrorKind::NotExist => match protocol {
            Protocol::Sftp => ProtocolErrorRepr::SftpNative("no-such-file"),
            Protocol::WebDav
            | Protocol::Ftp
            | Protocol::Http
            | Protocol::HttpShare
            | Protocol::DataRetention
            | Protocol::Oidc
            | Protocol::EventAction => ProtocolErrorRepr::OsNative(source),
        },
        ConnErrorKind::PermissionDenied if has_backend_source => match protocol {
            Protocol::Sftp => ProtocolErrorRepr::SftpNative("permission-denied"),
            _ => ProtocolErrorRepr::Core(ConnErrorKind::PermissionDenied),
        },
        ConnErrorKind::PermissionDenied | ConnErrorKind::ReadQuotaExceeded | ConnErrorKind::ShuttingDown => {
            match protocol {
                Protocol::Sftp => ProtocolErrorRepr::SftpNative("failure"),
                _ => ProtocolErrorRepr::Core(kind),
            }
        }
        ConnErrorKind::OpUnsupported => match protocol {
            Protocol::Sftp => ProtocolErrorRepr::SftpNative("op-unsupported"),
            _ => ProtocolErrorRepr::Core(ConnErrorKind::OpUnsupported),
        },
        ConnErrorKind::StorageSizeUnavailable => match protocol {
            Protocol::Sftp => ProtocolErrorRepr::SftpNative("op-unsupported"),
            _ => ProtocolErrorRepr::OsNative(source),
        },
        ConnErrorKind::QuotaExceeded | ConnErrorKind::GenericFailure => ProtocolErrorRepr::Core(kind),
    };
    ProtocolError { original_kind: kind, repr }
}

//! Core trait and error vocabulary consumed by `xfer-connection`'s operation engine.
//!
//! A storage provider (local disk, object store, a remote file-transfer client, an
//! encryption wrapper around another provider, ...) implements [`backend::StorageBackend`]
//! and is otherwise opaque to the connection core: the core never downcasts to a
//! concrete provider type, it only calls through the trait and inspects
//! [`error::BackendErrorKind`].

pub mod backend;
pub mod error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

//! Defines the service provider interface for storage back-end implementors.
//!
//! A connection serves its primary home directory plus zero or more virtual folders,
//! each potentially backed by a *different* provider (local disk, object store, a
//! remote file-transfer client, ...). Because the core has to hold a heterogeneous
//! set of backends for a single connection, `StorageBackend` is object-safe (no
//! generic parameters, a concrete [`FileMetadata`] return type) rather than generic
//! over an associated metadata type: the connection core stores backends as
//! `Arc<dyn StorageBackend>`.

use crate::error::BackendError;
use async_trait::async_trait;
use std::{
    fmt::Debug,
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Result type used throughout this module.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Metadata of a single entry on a storage back-end.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// The length of the file in bytes. Conventionally `0` for directories.
    pub len: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry is a regular file.
    pub is_file: bool,
    /// Whether the entry is a symbolic link.
    pub is_symlink: bool,
    /// The last-modified time of the entry, if the backend tracks one.
    pub modified: Option<SystemTime>,
    /// The owning uid, if the backend has a concept of one.
    pub uid: u32,
    /// The owning gid, if the backend has a concept of one.
    pub gid: u32,
    /// Unix mode bits, if the backend has a concept of one.
    pub mode: u32,
}

impl FileMetadata {
    /// Returns `self.len == 0`.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `modified`, converted to UTC for protocol surfaces that render a timestamp
    /// (SFTP attrs, WebDAV `Last-Modified`, an FTP `MDTM`/`MLST` reply). Returns
    /// `None` if the backend didn't report a modification time, or reported one
    /// unrepresentable as a `DateTime<Utc>`.
    pub fn modified_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.modified.map(chrono::DateTime::<chrono::Utc>::from)
    }
}

/// Path plus metadata, as produced by [`StorageBackend::walk`].
pub struct Entry {
    /// The path of the entry, relative to the root the walk was started from.
    pub path: PathBuf,
    /// The metadata of the entry, or the error encountered trying to stat it.
    ///
    /// A per-entry error does not abort the walk: the core requires the walker to be
    /// able to report per-entry errors without aborting.
    pub info: Result<FileMetadata>,
}

/// Called by [`StorageBackend::walk`] for each entry. Returning `ControlFlow::Break`
/// stops the walk early without it being an error.
pub type Visit = dyn FnMut(Entry) -> ControlFlow<()> + Send;

/// The `StorageBackend` trait can be implemented to plug a storage mechanism (local
/// disk, object store, a remote file-transfer server, an encryption wrapper around
/// another backend, ...) into the connection core.
///
/// Once constructed for a connection, a backend is used for the lifetime of that
/// connection; capabilities (`has_virtual_folders`, `is_upload_resume_supported`) are
/// queried once and assumed stable.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this backend emulates directory semantics rather than offering real
    /// ones (e.g. an object store, where directories are a synthetic prefix grouping).
    /// Backends that answer `true` here cannot cheaply walk a subtree, which changes
    /// how the operation engine classifies walk failures (see `xfer-connection`'s
    /// recursive remove/rename).
    fn has_virtual_folders(&self) -> bool;

    /// Whether uploads can resume from a non-zero offset on this backend.
    fn is_upload_resume_supported(&self) -> bool;

    /// Whether `err` represents the target not existing.
    fn is_not_exist(&self, err: &BackendError) -> bool {
        err.kind() == crate::error::BackendErrorKind::NotExist
    }

    /// Whether `err` represents a permission failure reported by the backend itself
    /// (as opposed to one rejected by the core's own permission oracle).
    fn is_permission(&self, err: &BackendError) -> bool {
        err.kind() == crate::error::BackendErrorKind::Permission
    }

    /// Returns metadata for `path`, following symlinks.
    async fn stat(&self, path: &Path) -> Result<FileMetadata>;

    /// Returns metadata for `path`, without following a terminal symlink.
    async fn lstat(&self, path: &Path) -> Result<FileMetadata> {
        self.stat(path).await
    }

    /// Opens `path` for reading starting at `start_pos`. `start_pos` is only ever
    /// non-zero when the backend supports resuming.
    async fn open(&self, path: &Path, start_pos: u64) -> Result<Box<dyn AsyncRead + Send + Sync + Unpin>>;

    /// Opens `path` for writing starting at `start_pos`, creating it if necessary.
    async fn create(&self, path: &Path, start_pos: u64) -> Result<Box<dyn AsyncWrite + Send + Sync + Unpin>>;

    /// Renames `from` to `to`. Both paths are backend-local (already mapped).
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Removes the file at `path`.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Removes the (empty, after a recursive remove has cleared it) directory at `path`.
    async fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Creates the directory at `path`. Does not create missing parents.
    async fn mkdir(&self, path: &Path) -> Result<()>;

    /// Walks the tree rooted at `path` in post-order (children before their parent),
    /// invoking `visit` for each entry.
    ///
    /// Implementations that can't cheaply enumerate a subtree (`has_virtual_folders`
    /// backends) should return `Err(BackendErrorKind::Unsupported)` rather than walk
    /// one key at a time.
    async fn walk(&self, path: &Path, visit: &mut Visit) -> Result<()>;

    /// Changes the mode bits of `path`.
    async fn chmod(&self, path: &Path, mode: u32) -> Result<()>;

    /// Changes the owning uid/gid of `path`. Either may be `None` to leave it unchanged.
    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()>;

    /// Changes the access/modification times of `path`. Either may be `None` to leave
    /// it unchanged. `is_uploading` tells the backend whether this call happens as
    /// part of an in-progress upload (some backends can only set times once the
    /// upload completes).
    async fn chtimes(&self, path: &Path, atime: Option<SystemTime>, mtime: Option<SystemTime>, is_uploading: bool) -> Result<()>;

    /// Returns the free space available to store `needed_bytes` more at `path`.
    /// Backends that can't answer (most object stores) should return `Ok(true)`.
    async fn check_space(&self, _path: &Path, _needed_bytes: u64) -> Result<bool> {
        Ok(true)
    }

    /// Validates that the backend's root is usable for `username` (and, on backends
    /// that map to OS users, `uid`/`gid`), called once when a connection is constructed.
    async fn check_root_path(&self, username: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()>;

    /// An implementation-defined identifier for this backend instance, used in logging.
    fn connection_id(&self) -> &str {
        ""
    }
}

#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

//! A protocol-independent connection core for a multi-protocol file-transfer server.
//!
//! A [`connection::Connection`] is constructed once per authenticated session and
//! exposes the operations every protocol handler (SFTP, FTP, WebDAV, HTTP, the
//! event-action runner, ...) needs: path resolution across a user's home directory
//! and virtual folders ([`path_mapper`]), permission checks ([`permission_oracle`]),
//! quota accounting ([`quota`]), and error translation back into a
//! protocol-appropriate representation ([`error`]).
//!
//! Storage itself is pluggable: [`xfer_core::backend::StorageBackend`] is the seam
//! a concrete object store, remote file-transfer client, or encrypting wrapper
//! implements. This crate ships only [`backend::local`], a local-disk reference
//! implementation used by the integration tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use xfer_connection::backend::local::LocalDisk;
//! use xfer_connection::config::ConfigHandle;
//! use xfer_connection::connection::Connection;
//! use xfer_connection::permissions::Permissions;
//! use xfer_connection::protocol::Protocol;
//! use xfer_connection::user::{Filters, User};
//! use xfer_connection::path::VirtualPath;
//!
//! # struct NoopQuota;
//! # #[async_trait::async_trait]
//! # impl xfer_connection::quota::QuotaProvider for NoopQuota {
//! #     async fn snapshot(&self, _scope: &xfer_connection::quota::QuotaScope) -> Result<xfer_connection::quota::QuotaSnapshot, xfer_connection::error::ConnError> {
//! #         unimplemented!()
//! #     }
//! #     async fn apply_delta(&self, _scope: &xfer_connection::quota::QuotaScope, _files_delta: i64, _bytes_delta: i64) -> Result<(), xfer_connection::error::ConnError> {
//! #         unimplemented!()
//! #     }
//! # }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut permissions = std::collections::BTreeMap::new();
//! permissions.insert(VirtualPath::root(), Permissions::ANY);
//! let user = User::new(
//!     "alice",
//!     std::path::PathBuf::from("/srv/alice"),
//!     Arc::new(LocalDisk::new("conn-1")),
//!     permissions,
//!     Filters::default(),
//!     vec![],
//!     None,
//!     None,
//! )?;
//! let conn = Connection::new("conn-1", user, Protocol::Sftp, Arc::new(ConfigHandle::default()), Arc::new(NoopQuota))?;
//! let _meta = conn.stat(&VirtualPath::root()).await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod order;
pub mod path;
pub mod path_mapper;
pub mod permission_oracle;
pub mod permissions;
pub mod protocol;
pub mod provider;
pub mod quota;
pub mod user;

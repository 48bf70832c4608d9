#![allow(missing_docs)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use xfer_connection::backend::local::LocalDisk;
use xfer_connection::config::ConfigHandle;
use xfer_connection::connection::Connection;
use xfer_connection::error::ConnError;
use xfer_connection::path::VirtualPath;
use xfer_connection::permissions::Permissions;
use xfer_connection::protocol::Protocol;
use xfer_connection::quota::{QuotaProvider, QuotaScope, QuotaSnapshot};
use xfer_connection::user::{Filters, User, VirtualFolder};

/// A quota provider that always reports unlimited space and ignores deltas,
/// for tests that only care about permission/path behavior.
pub struct UnlimitedQuota;

#[async_trait]
impl QuotaProvider for UnlimitedQuota {
    async fn snapshot(&self, _scope: &QuotaScope) -> Result<QuotaSnapshot, ConnError> {
        Ok(QuotaSnapshot {
            has_space: true,
            quota_size: -1,
            used_size: 0,
            quota_files: -1,
            used_files: 0,
        })
    }

    async fn apply_delta(&self, _scope: &QuotaScope, _files_delta: i64, _bytes_delta: i64) -> Result<(), ConnError> {
        Ok(())
    }
}

/// Builds a user rooted at `home` on a fresh [`LocalDisk`], granted `root_perms` at `/`,
/// with `virtual_folders` mounted on top.
pub fn make_user(home: PathBuf, root_perms: Permissions, virtual_folders: Vec<VirtualFolder>) -> User {
    let mut permissions = BTreeMap::new();
    permissions.insert(VirtualPath::root(), root_perms);
    User::new(
        "alice",
        home,
        Arc::new(LocalDisk::new("test-conn")),
        permissions,
        Filters::default(),
        virtual_folders,
        None,
        None,
    )
    .unwrap()
}

/// Builds a connection for `user` speaking `protocol`, backed by [`UnlimitedQuota`].
pub fn make_connection(user: User, protocol: Protocol) -> Connection {
    Connection::new("conn-1", user, protocol, Arc::new(ConfigHandle::default()), Arc::new(UnlimitedQuota)).unwrap()
}

//! The user and virtual-folder data model.
//!
//! A [`User`] is immutable for the lifetime of a connection; a permission change
//! made through the admin API is applied by publishing a new `User` and swapping the
//! connection's reference atomically (see [`crate::connection::Connection`]), not by
//! mutating this struct in place.

use crate::path::VirtualPath;
use crate::permissions::Permissions;
use crate::protocol::Protocol;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use xfer_core::backend::StorageBackend;

/// A mount point in a user's virtual tree, served by its own backend.
pub struct VirtualFolder {
    /// The absolute, normalized prefix under which this folder is mounted.
    pub virtual_path: VirtualPath,
    /// The path on `backend` that `virtual_path` maps to.
    pub mapped_path: PathBuf,
    /// The backend serving this folder. May differ from the primary backend.
    pub backend: Arc<dyn StorageBackend>,
    /// Per-folder byte quota. Negative means "inherit the user's quota".
    pub quota_size: i64,
    /// Per-folder file-count quota. Negative means "inherit the user's quota".
    pub quota_files: i64,
}

impl std::fmt::Debug for VirtualFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFolder")
            .field("virtual_path", &self.virtual_path)
            .field("mapped_path", &self.mapped_path)
            .field("backend", &self.backend.name())
            .field("quota_size", &self.quota_size)
            .field("quota_files", &self.quota_files)
            .finish()
    }
}

/// Per-user filters that aren't permission atoms.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// The largest single file a client may upload, in bytes. `0` means unlimited.
    pub max_upload_file_size: u64,
    /// Protocols this user may not connect over. A connection constructed for a
    /// denied protocol is rejected at construction time.
    pub denied_protocols: HashSet<Protocol>,
}

/// The error returned when constructing a [`User`] whose data violates an invariant.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// The permission map did not contain an entry for the root path `/`.
    #[error("user permission map must contain an entry for the root path \"/\"")]
    MissingRootPermission,
}

/// An authenticated user's profile, resolved once at connection construction time
/// and held immutably for the life of the connection.
#[derive(Debug)]
pub struct User {
    /// The username used to authenticate.
    pub username: String,
    /// Whether the account is currently enabled. A disabled user fails every
    /// permission check.
    pub account_enabled: bool,
    /// The home directory on the primary backend.
    pub home: PathBuf,
    /// The backend serving the primary home directory.
    pub primary_backend: Arc<dyn StorageBackend>,
    /// Per-path permission map. Always contains an entry for `/`.
    pub permissions: BTreeMap<VirtualPath, Permissions>,
    /// Filters such as `max_upload_file_size`.
    pub filters: Filters,
    /// The user's virtual folders, in the order they should be tried (longest-prefix
    /// match still wins regardless of order).
    pub virtual_folders: Vec<VirtualFolder>,
    /// An OS uid hint, passed to `StorageBackend::check_root_path` on backends that
    /// map to real OS users.
    pub uid: Option<u32>,
    /// An OS gid hint, passed to `StorageBackend::check_root_path`.
    pub gid: Option<u32>,
}

impl User {
    /// Constructs a `User`, validating the root-permission invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        username: impl Into<String>,
        home: PathBuf,
        primary_backend: Arc<dyn StorageBackend>,
        permissions: BTreeMap<VirtualPath, Permissions>,
        filters: Filters,
        virtual_folders: Vec<VirtualFolder>,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<Self, UserError> {
        if !permissions.contains_key(&VirtualPath::root()) {
            return Err(UserError::MissingRootPermission);
        }
        Ok(User {
            username: username.into(),
            account_enabled: true,
            home,
            primary_backend,
            permissions,
            filters,
            virtual_folders,
            uid,
            gid,
        })
    }

    /// Finds the longest virtual-folder prefix governing `path`, if any.
    pub(crate) fn matching_virtual_folder(&self, path: &VirtualPath) -> Option<&VirtualFolder> {
        self.virtual_folders
            .iter()
            .filter(|vf| path.starts_with(&vf.virtual_path))
            .max_by_key(|vf| vf.virtual_path.depth())
    }

    /// The longest key in the permission map that governs `path` (itself or an
    /// ancestor). Always succeeds because `/` is guaranteed present.
    pub(crate) fn governing_permissions(&self, path: &VirtualPath) -> Permissions {
        self.permissions
            .iter()
            .filter(|(key, _)| path.starts_with(key))
            .max_by_key(|(key, _)| key.depth())
            .map(|(_, perms)| *perms)
            .unwrap_or(Permissions::empty())
    }
}

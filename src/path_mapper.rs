//! Resolves virtual paths to (backend, backend-path) pairs across the virtual-folder
//! overlay, and the reverse for the primary backend.

use crate::path::VirtualPath;
use crate::user::User;
use std::path::PathBuf;
use std::sync::Arc;
use xfer_core::backend::StorageBackend;

/// A virtual path resolved down to the backend that serves it and the path on that
/// backend.
#[derive(Clone)]
pub struct Resolved {
    /// The backend that owns `backend_path`.
    pub backend: Arc<dyn StorageBackend>,
    /// The path on `backend` corresponding to the resolved virtual path.
    pub backend_path: PathBuf,
}

/// Resolves `v` to its serving backend and backend-local path. Virtual-folder
/// mounts win by longest-prefix match over the primary backend.
pub fn resolve(user: &User, v: &VirtualPath) -> Resolved {
    if let Some(folder) = user.matching_virtual_folder(v) {
        let remainder = v.strip_prefix(&folder.virtual_path).unwrap_or_default();
        let backend_path = if remainder.is_empty() {
            folder.mapped_path.clone()
        } else {
            folder.mapped_path.join(remainder)
        };
        return Resolved {
            backend: Arc::clone(&folder.backend),
            backend_path,
        };
    }
    let remainder = v.as_str().trim_start_matches('/');
    let backend_path = if remainder.is_empty() {
        user.home.clone()
    } else {
        user.home.join(remainder)
    };
    Resolved {
        backend: Arc::clone(&user.primary_backend),
        backend_path,
    }
}

/// Reverses a primary-backend path back into a virtual path, by stripping
/// `user.home`. Only defined for the primary backend; virtual-folder callers must
/// carry the virtual path alongside their backend path instead of recovering it.
pub fn unresolve_primary(user: &User, backend_path: &std::path::Path) -> Option<VirtualPath> {
    let remainder = backend_path.strip_prefix(&user.home).ok()?;
    let s = remainder.to_string_lossy();
    Some(VirtualPath::root().join(&s))
}

/// Whether `a` and `b` resolve to the same backend instance, by pointer identity.
/// Cross-backend operations (rename, recursive rename) must check this before
/// assuming a single filesystem's atomicity.
pub fn same_backend(a: &Resolved, b: &Resolved) -> bool {
    Arc::ptr_eq(&a.backend, &b.backend)
}

/// A short-TTL cache of `resolve()` results, keyed by the raw virtual path string.
/// Resolution itself is cheap (a linear scan over a user's virtual folders), but a
/// busy SFTP/WebDAV session can re-resolve the same handful of hot paths thousands
/// of times per second; this trades a small amount of staleness (capped by `ttl`)
/// for avoiding the repeated scan. Scoped to one connection and rebuilt whenever the
/// connection's user snapshot is replaced, since a permission/folder change must not
/// be served stale.
pub struct ResolveCache {
    inner: moka::sync::Cache<String, Resolved>,
}

impl ResolveCache {
    /// Builds a cache holding at most `capacity` entries, each valid for `ttl`.
    pub fn new(capacity: u64, ttl: std::time::Duration) -> Self {
        ResolveCache {
            inner: moka::sync::Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    /// Resolves `v`, serving a cached result if one is still fresh.
    pub fn resolve(&self, user: &User, v: &VirtualPath) -> Resolved {
        if let Some(hit) = self.inner.get(v.as_str()) {
            return hit;
        }
        let resolved = resolve(user, v);
        self.inner.insert(v.as_str().to_string(), resolved.clone());
        resolved
    }
}

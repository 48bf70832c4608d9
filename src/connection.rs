//! The connection object: one instance per authenticated session, composing the
//! path mapper, permission oracle, quota evaluator and error translator into the
//! operations a protocol handler actually calls.

use crate::config::ConfigHandle;
use crate::error::{translate, ConnError, ConnErrorKind, ProtocolError};
use crate::order;
use crate::path::VirtualPath;
use crate::path_mapper::{self, Resolved, ResolveCache};
use crate::permission_oracle::{self, RecursiveRenameOutcome};
use crate::permissions::Permissions;
use crate::protocol::Protocol;
use crate::provider::DataProvider;
use crate::quota::{self, MaxWriteSize, QuotaProvider};
use crate::user::User;
use arc_swap::ArcSwap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xfer_core::backend::Entry;
use xfer_core::error::BackendErrorKind;

/// One logical instance per authenticated client session.
pub struct Connection {
    id: String,
    protocol: ArcSwap<Protocol>,
    user: ArcSwap<User>,
    config: Arc<ConfigHandle>,
    quota: Arc<dyn QuotaProvider>,
    #[allow(dead_code)]
    data_provider: Option<Arc<dyn DataProvider>>,
    cancellation: CancellationToken,
    resolve_cache: ArcSwap<ResolveCache>,
}

impl Connection {
    /// Constructs a connection for `user` speaking `protocol`. Rejects construction
    /// if `protocol` is in the user's denied-protocol filter.
    pub fn new(
        id: impl Into<String>,
        user: User,
        protocol: Protocol,
        config: Arc<ConfigHandle>,
        quota: Arc<dyn QuotaProvider>,
    ) -> Result<Self, ConnError> {
        if user.filters.denied_protocols.contains(&protocol) {
            return Err(ConnErrorKind::PermissionDenied.into());
        }
        let resolve_cache = ArcSwap::from_pointee(Self::fresh_resolve_cache(&config));
        Ok(Connection {
            id: id.into(),
            protocol: ArcSwap::from_pointee(protocol),
            user: ArcSwap::from_pointee(user),
            config,
            quota,
            data_provider: None,
            cancellation: CancellationToken::new(),
            resolve_cache,
        })
    }

    /// Constructs a connection exactly like [`Connection::new`], generating a fresh
    /// random identifier rather than taking one from the caller. Used by protocol
    /// handlers (SFTP, WebDAV) that have no natural session identifier of their own
    /// to hand in.
    pub fn new_with_generated_id(
        user: User,
        protocol: Protocol,
        config: Arc<ConfigHandle>,
        quota: Arc<dyn QuotaProvider>,
    ) -> Result<Self, ConnError> {
        Self::new(uuid::Uuid::new_v4().to_string(), user, protocol, config, quota)
    }

    /// Short TTL for resolved-path cache entries: long enough to absorb a burst of
    /// repeated lookups against the same handful of hot paths, short enough that a
    /// virtual-folder mount change is picked up promptly even without a user swap.
    const RESOLVE_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(2);

    fn fresh_resolve_cache(config: &ConfigHandle) -> ResolveCache {
        ResolveCache::new(config.load().path_cache_capacity, Self::RESOLVE_CACHE_TTL)
    }

    /// The connection's stable identifier.
    pub fn get_id(&self) -> &str {
        &self.id
    }

    /// The currently authenticated username.
    pub fn get_username(&self) -> String {
        self.user.load().username.clone()
    }

    /// The protocol currently driving this connection.
    pub fn get_protocol(&self) -> Protocol {
        **self.protocol.load()
    }

    /// Switches the protocol this connection reports errors for (e.g. an SFTP
    /// session handing off to an event-action script).
    pub fn set_protocol(&self, protocol: Protocol) {
        self.protocol.store(Arc::new(protocol));
    }

    /// Atomically replaces the user snapshot, e.g. after an admin permission change.
    /// In-flight operations that already loaded a snapshot finish against it. Also
    /// discards the resolved-path cache, since a folder/permission change must not
    /// be served a resolution computed against the old user.
    pub fn replace_user(&self, user: User) {
        self.user.store(Arc::new(user));
        self.resolve_cache.store(Arc::new(Self::fresh_resolve_cache(&self.config)));
    }

    /// Signals cancellation to any in-flight walk-based operation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Resolves `path` against the currently loaded user, through the short-TTL
    /// resolved-path cache.
    fn resolve(&self, user: &User, path: &VirtualPath) -> Resolved {
        self.resolve_cache.load().resolve(user, path)
    }

    fn translate_core(&self, kind: ConnErrorKind) -> ProtocolError {
        translate(ConnError::from(kind), self.get_protocol())
    }

    fn translate_backend(&self, err: xfer_core::error::BackendError) -> ProtocolError {
        translate(ConnError::from(err), self.get_protocol())
    }

    /// Builds the permission-denied error for `operation` and counts the denial.
    fn deny_permission(&self, operation: &str) -> ProtocolError {
        record_denial(operation);
        self.translate_core(ConnErrorKind::PermissionDenied)
    }

    /// Builds the quota-exceeded error for `scope` and counts the rejection.
    fn deny_quota(&self, scope: &quota::QuotaScope) -> ProtocolError {
        record_rejection(scope.label());
        self.translate_core(ConnErrorKind::QuotaExceeded)
    }

    /// Builds the not-exist error for the current protocol.
    pub fn get_not_exist_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::NotExist)
    }

    /// Builds the permission-denied error for the current protocol.
    pub fn get_permission_denied_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::PermissionDenied)
    }

    /// Builds the op-unsupported error for the current protocol.
    pub fn get_op_unsupported_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::OpUnsupported)
    }

    /// Builds the generic-failure error for the current protocol.
    pub fn get_generic_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::GenericFailure)
    }

    /// Builds the quota-exceeded error for the current protocol.
    pub fn get_quota_exceeded_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::QuotaExceeded)
    }

    /// Builds the read-quota-exceeded error for the current protocol.
    pub fn get_read_quota_exceeded_error(&self) -> ProtocolError {
        self.translate_core(ConnErrorKind::ReadQuotaExceeded)
    }

    /// Translates an arbitrary backend error using the connection's protocol and
    /// current kind classification; the catch-all used by callers that already
    /// have a `BackendError` in hand.
    pub fn get_fs_error(&self, err: xfer_core::error::BackendError) -> ProtocolError {
        self.translate_backend(err)
    }

    /// Whether `err` is a quota-exceeded error, regardless of how it was wrapped.
    pub fn is_quota_exceeded_error(&self, err: &ProtocolError) -> bool {
        err.is_quota_exceeded()
    }

    /// Whether `err` is a not-exist error, regardless of how it was wrapped.
    pub fn is_not_exist_error(&self, err: &ProtocolError) -> bool {
        err.is_not_exist()
    }

    /// Whether the user may delete a file at `path`.
    pub fn is_remove_file_allowed(&self, path: &VirtualPath) -> bool {
        let user = self.user.load();
        permission_oracle::allowed(&user, &path.parent(), Permissions::DELETE_FILES)
    }

    /// Whether the user may delete a directory at `path`.
    pub fn is_remove_dir_allowed(&self, path: &VirtualPath) -> bool {
        let user = self.user.load();
        !self.is_protected_dir(&user, path) && permission_oracle::allowed(&user, &path.parent(), Permissions::DELETE_DIRS)
    }

    fn is_protected_dir(&self, user: &User, path: &VirtualPath) -> bool {
        path.is_root() || user.virtual_folders.iter().any(|vf| *path == vf.virtual_path || path.is_ancestor_of(&vf.virtual_path))
    }

    /// Resolves and stats `path`.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn stat(&self, path: &VirtualPath) -> Result<xfer_core::backend::FileMetadata, ProtocolError> {
        let user = self.user.load();
        let resolved = self.resolve(&user, path);
        let result = resolved.backend.stat(&resolved.backend_path).await;
        record_outcome("stat", result.is_ok());
        result.map_err(|e| self.translate_backend(e))
    }

    /// Removes a single file. Checks `delete-files` on the parent, then decrements
    /// the governing quota scope by the file's size on success.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn remove_file(&self, path: &VirtualPath) -> Result<(), ProtocolError> {
        let user = self.user.load();
        if !permission_oracle::allowed(&user, &path.parent(), Permissions::DELETE_FILES) {
            return Err(self.deny_permission("remove_file"));
        }
        let resolved = self.resolve(&user, path);
        let size = resolved.backend.stat(&resolved.backend_path).await.ok().map(|m| m.len);
        resolved
            .backend
            .remove_file(&resolved.backend_path)
            .await
            .map_err(|e| self.translate_backend(e))?;
        if let Some(size) = size {
            let scope = quota::governing_scope(&user, path);
            let _ = self.quota.apply_delta(&scope, -1, -(size as i64)).await;
        }
        record_outcome("remove_file", true);
        Ok(())
    }

    /// Removes an empty directory. Rejects the user's root, any virtual-folder
    /// mount point, or an ancestor of one.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn remove_dir(&self, path: &VirtualPath) -> Result<(), ProtocolError> {
        let user = self.user.load();
        if self.is_protected_dir(&user, path) {
            return Err(self.deny_permission("remove_dir"));
        }
        if !permission_oracle::allowed(&user, &path.parent(), Permissions::DELETE_DIRS) {
            return Err(self.deny_permission("remove_dir"));
        }
        let resolved = self.resolve(&user, path);
        resolved.backend.remove_dir(&resolved.backend_path).await.map_err(|e| self.translate_backend(e))
    }

    /// Recursively removes a directory tree: walks it in post-order, verifies
    /// delete permission on every entry, then issues removals child-before-parent.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn remove_dir_tree(&self, path: &VirtualPath) -> Result<(), ProtocolError> {
        let user = self.user.load();
        if self.is_protected_dir(&user, path) {
            return Err(self.deny_permission("remove_dir_tree"));
        }
        let resolved = self.resolve(&user, path);
        let root = resolved.backend_path.clone();

        let mut entries: Vec<(PathBuf, VirtualPath, bool, u64)> = Vec::new();
        let mut denied = false;
        let cancelled = &self.cancellation;
        let walk_result = resolved
            .backend
            .walk(&root, &mut |entry: Entry| {
                if cancelled.is_cancelled() {
                    return ControlFlow::Break(());
                }
                let Ok(meta) = entry.info else {
                    return ControlFlow::Continue(());
                };
                let suffix = entry.path.strip_prefix(&root).unwrap_or(&entry.path).to_string_lossy().into_owned();
                let v = if suffix.is_empty() { path.clone() } else { path.join(&suffix) };
                let atom = if meta.is_dir { Permissions::DELETE_DIRS } else { Permissions::DELETE_FILES };
                if !permission_oracle::allowed(&user, &v.parent(), atom) {
                    denied = true;
                    return ControlFlow::Break(());
                }
                entries.push((entry.path.clone(), v, meta.is_dir, meta.len));
                ControlFlow::Continue(())
            })
            .await;

        if self.cancellation.is_cancelled() {
            return Err(self.translate_core(ConnErrorKind::ShuttingDown));
        }
        if denied {
            return Err(self.deny_permission("remove_dir_tree"));
        }
        if let Err(err) = walk_result {
            return Err(if err.kind() == BackendErrorKind::NotExist {
                self.translate_backend(err)
            } else if resolved.backend.has_virtual_folders() {
                // Legacy contract: object-store-like backends cannot recursively
                // remove non-empty trees through this path.
                self.deny_permission("remove_dir_tree")
            } else {
                self.translate_core(ConnErrorKind::GenericFailure)
            });
        }

        let mut freed_bytes: i64 = 0;
        let mut freed_files: i64 = 0;
        for (backend_path, _, is_dir, size) in &entries {
            if !*is_dir {
                resolved
                    .backend
                    .remove_file(backend_path)
                    .await
                    .map_err(|e| self.translate_backend(e))?;
                freed_bytes += *size as i64;
                freed_files += 1;
            }
        }
        let dirs = entries
            .into_iter()
            .filter(|(_, _, is_dir, _)| *is_dir)
            .map(|(_, v, _, _)| v)
            .collect();
        for dir_v in order::order_dirs_to_remove(dirs) {
            let dir_resolved = self.resolve(&user, &dir_v);
            resolved
                .backend
                .remove_dir(&dir_resolved.backend_path)
                .await
                .map_err(|e| self.translate_backend(e))?;
        }
        resolved.backend.remove_dir(&root).await.map_err(|e| self.translate_backend(e))?;

        let scope = quota::governing_scope(&user, path);
        let _ = self.quota.apply_delta(&scope, -freed_files, -freed_bytes).await;
        record_outcome("remove_dir_tree", true);
        Ok(())
    }

    fn touches_any_mount(&self, user: &User, path: &VirtualPath) -> bool {
        user.virtual_folders
            .iter()
            .any(|vf| *path == vf.virtual_path || path.is_ancestor_of(&vf.virtual_path) || vf.virtual_path.is_ancestor_of(path))
    }

    fn is_rename_permitted(
        &self,
        user: &User,
        source: &VirtualPath,
        target: &VirtualPath,
        source_resolved: &Resolved,
        target_resolved: &Resolved,
        is_dir: bool,
    ) -> Result<(), ConnErrorKind> {
        if self.touches_any_mount(user, source) || self.touches_any_mount(user, target) {
            record_denial("rename");
            return Err(ConnErrorKind::PermissionDenied);
        }
        let cross_backend = !path_mapper::same_backend(source_resolved, target_resolved);
        let permitted = if cross_backend {
            let delete_atom = if is_dir { Permissions::DELETE_DIRS } else { Permissions::DELETE_FILES };
            permission_oracle::allowed(user, &target.parent(), Permissions::UPLOAD)
                && permission_oracle::allowed(user, &source.parent(), delete_atom)
        } else {
            permission_oracle::rename_allowed(user, source, target, is_dir)
        };
        if permitted {
            Ok(())
        } else {
            record_denial("rename");
            Err(ConnErrorKind::PermissionDenied)
        }
    }

    /// Renames `source` to `target`. Same-backend renames delegate directly;
    /// cross-backend renames are emulated (read + write + delete) and only
    /// supported for files.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn rename(&self, source: &VirtualPath, target: &VirtualPath) -> Result<(), ProtocolError> {
        let user = self.user.load();
        let source_resolved = self.resolve(&user, source);
        let target_resolved = self.resolve(&user, target);

        let meta = source_resolved
            .backend
            .stat(&source_resolved.backend_path)
            .await
            .map_err(|e| self.translate_backend(e))?;

        if let Err(kind) = self.is_rename_permitted(&user, source, target, &source_resolved, &target_resolved, meta.is_dir) {
            return Err(self.translate_core(kind));
        }

        if meta.is_dir {
            match permission_oracle::recursive_rename_allowed(&user, source, target).await {
                RecursiveRenameOutcome::Allowed => {}
                RecursiveRenameOutcome::Denied => return Err(self.deny_permission("rename")),
                RecursiveRenameOutcome::Unsupported => return Err(self.translate_core(ConnErrorKind::OpUnsupported)),
                RecursiveRenameOutcome::NotExist => return Err(self.translate_core(ConnErrorKind::NotExist)),
            }
        }

        if path_mapper::same_backend(&source_resolved, &target_resolved) {
            source_resolved
                .backend
                .rename(&source_resolved.backend_path, &target_resolved.backend_path)
                .await
                .map_err(|e| self.translate_backend(e))?;
        } else {
            if meta.is_dir {
                return Err(self.translate_core(ConnErrorKind::OpUnsupported));
            }
            if !self.has_space_for_cross_rename(&user, &meta, &target_resolved).await {
                let scope = quota::governing_scope(&user, target);
                return Err(self.deny_quota(&scope));
            }
            self.emulate_cross_backend_rename(&source_resolved, &target_resolved).await?;
        }

        let source_scope = quota::governing_scope(&user, source);
        let target_scope = quota::governing_scope(&user, target);
        if source_scope != target_scope && !meta.is_dir {
            let _ = self.quota.apply_delta(&source_scope, -1, -(meta.len as i64)).await;
            let _ = self.quota.apply_delta(&target_scope, 1, meta.len as i64).await;
        }
        record_outcome("rename", true);
        Ok(())
    }

    async fn has_space_for_cross_rename(&self, _user: &User, meta: &xfer_core::backend::FileMetadata, target: &Resolved) -> bool {
        target.backend.check_space(&target.backend_path, meta.len).await.unwrap_or(false)
    }

    async fn emulate_cross_backend_rename(&self, source: &Resolved, target: &Resolved) -> Result<(), ProtocolError> {
        let mut reader = source.backend.open(&source.backend_path, 0).await.map_err(|e| self.translate_backend(e))?;
        let mut writer = target.backend.create(&target.backend_path, 0).await.map_err(|e| self.translate_backend(e))?;
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| self.translate_backend(e.into()))?;
        source.backend.remove_file(&source.backend_path).await.map_err(|e| self.translate_backend(e))
    }

    /// Dispatches a chmod request per the configured setstat mode.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn handle_chmod(&self, path: &VirtualPath, mode: u32) -> Result<(), ProtocolError> {
        use crate::config::SetstatMode;
        let user = self.user.load();
        if !permission_oracle::allowed(&user, path, Permissions::CHMOD) {
            return Err(self.deny_permission("chmod"));
        }
        match self.config.load().setstat_mode {
            SetstatMode::Ignore => Ok(()),
            mode_policy => {
                let resolved = self.resolve(&user, path);
                match resolved.backend.chmod(&resolved.backend_path, mode).await {
                    Ok(()) => Ok(()),
                    Err(e) if mode_policy == SetstatMode::HonorIgnoreUnsupported && e.kind() == BackendErrorKind::Unsupported => Ok(()),
                    Err(e) => Err(self.translate_backend(e)),
                }
            }
        }
    }

    /// Dispatches a chown request per the configured setstat mode.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn handle_chown(&self, path: &VirtualPath, uid: Option<u32>, gid: Option<u32>) -> Result<(), ProtocolError> {
        use crate::config::SetstatMode;
        let user = self.user.load();
        if !permission_oracle::allowed(&user, path, Permissions::CHOWN) {
            return Err(self.deny_permission("chown"));
        }
        match self.config.load().setstat_mode {
            SetstatMode::Ignore => Ok(()),
            mode_policy => {
                let resolved = self.resolve(&user, path);
                match resolved.backend.chown(&resolved.backend_path, uid, gid).await {
                    Ok(()) => Ok(()),
                    Err(e) if mode_policy == SetstatMode::HonorIgnoreUnsupported && e.kind() == BackendErrorKind::Unsupported => Ok(()),
                    Err(e) => Err(self.translate_backend(e)),
                }
            }
        }
    }

    /// Dispatches a chtimes request per the configured setstat mode. Either
    /// timestamp may be `None`, meaning "leave unchanged".
    #[tracing_attributes::instrument(skip(self))]
    pub async fn handle_chtimes(
        &self,
        path: &VirtualPath,
        atime: Option<std::time::SystemTime>,
        mtime: Option<std::time::SystemTime>,
        is_uploading: bool,
    ) -> Result<(), ProtocolError> {
        use crate::config::SetstatMode;
        let user = self.user.load();
        if !permission_oracle::allowed(&user, path, Permissions::CHTIMES) {
            return Err(self.deny_permission("chtimes"));
        }
        match self.config.load().setstat_mode {
            SetstatMode::Ignore => Ok(()),
            mode_policy => {
                let resolved = self.resolve(&user, path);
                match resolved.backend.chtimes(&resolved.backend_path, atime, mtime, is_uploading).await {
                    Ok(()) => Ok(()),
                    Err(e) if mode_policy == SetstatMode::HonorIgnoreUnsupported && e.kind() == BackendErrorKind::Unsupported => Ok(()),
                    Err(e) => Err(self.translate_backend(e)),
                }
            }
        }
    }

    /// Creates every missing path segment of `path`'s ancestry, crossing from the
    /// primary backend into virtual-folder backends as needed. A segment served by
    /// an object-store backend (`has_virtual_folders`) is skipped: its prefixes are
    /// synthetic and never need creating.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn check_parent_dirs(&self, path: &VirtualPath) -> Result<(), ProtocolError> {
        let user = self.user.load();
        let mut segments: Vec<VirtualPath> = Vec::new();
        let mut cur = path.parent();
        while !cur.is_root() {
            segments.push(cur.clone());
            cur = cur.parent();
        }
        segments.push(VirtualPath::root());
        segments.reverse();

        for segment in segments {
            let resolved = self.resolve(&user, &segment);
            if resolved.backend.has_virtual_folders() {
                continue;
            }
            match resolved.backend.stat(&resolved.backend_path).await {
                Ok(meta) if meta.is_dir => continue,
                Ok(_) => return Err(self.translate_core(ConnErrorKind::GenericFailure)),
                Err(e) if e.kind() == BackendErrorKind::NotExist => {
                    resolved.backend.mkdir(&resolved.backend_path).await.map_err(|e| self.translate_backend(e))?;
                }
                Err(e) => return Err(self.translate_backend(e)),
            }
        }
        Ok(())
    }

    /// Computes the maximum bytes the caller may still write, wrapping
    /// [`quota::max_write_size`] with the resume-support check.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn get_max_write_size(&self, path: &VirtualPath, is_resume: bool, already_written: u64) -> Result<MaxWriteSize, ProtocolError> {
        let user = self.user.load();
        let resolved = self.resolve(&user, path);
        let resume_supported = resolved.backend.is_upload_resume_supported();
        let scope = quota::governing_scope(&user, path);
        let snapshot = self.quota.snapshot(&scope).await.map_err(|e| translate(e, self.get_protocol()))?;
        quota::max_write_size(snapshot, is_resume, already_written, resume_supported, user.filters.max_upload_file_size).map_err(|kind| {
            if kind == ConnErrorKind::QuotaExceeded {
                record_rejection(scope.label());
            }
            self.translate_core(kind)
        })
    }
}

fn record_outcome(_operation: &str, _ok: bool) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_operation(_operation, _ok);
}

fn record_denial(_operation: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_permission_denial(_operation);
}

fn record_rejection(_scope: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_quota_rejection(_scope);
}

//! Per-path, per-operation permission checks with nearest-ancestor matching.

use crate::path::VirtualPath;
use crate::path_mapper;
use crate::permissions::Permissions;
use crate::user::User;
use std::ops::ControlFlow;
use xfer_core::backend::Entry;
use xfer_core::error::BackendErrorKind;

/// The result of a recursive rename permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursiveRenameOutcome {
    /// Every entry in the tree is permitted to rename.
    Allowed,
    /// At least one entry denied the rename.
    Denied,
    /// The backend cannot be walked cheaply and the quick check at the root failed.
    Unsupported,
    /// The source directory does not exist.
    NotExist,
}

/// Whether `user` is granted `atom` at `path`, via nearest-ancestor matching in the
/// permission map. `atom` being `Permissions::ANY` or a rename/delete synonym is
/// handled by [`Permissions::grants`].
pub fn allowed(user: &User, path: &VirtualPath, atom: Permissions) -> bool {
    user.account_enabled && user.governing_permissions(path).grants(atom)
}

/// Whether renaming a subject of type `is_dir` from `source` to `target` is
/// permitted: both the source's and target's governing parent directories must
/// grant the type-specific rename atom.
pub fn rename_allowed(user: &User, source: &VirtualPath, target: &VirtualPath, is_dir: bool) -> bool {
    let atom = if is_dir { Permissions::RENAME_DIRS } else { Permissions::RENAME_FILES };
    allowed(user, &source.parent(), atom) && allowed(user, &target.parent(), atom)
}

/// Walks `source_dir` and checks that every entry may be renamed to the
/// corresponding path under `target_dir` (computed by substituting the source
/// root for the target root). On a `has-virtual-folders` backend, which cannot be
/// walked cheaply, only a quick check at the root is attempted: if both endpoints
/// already grant `rename-dirs`, the rename is allowed; otherwise it is unsupported.
/// A deny anywhere during the walk aborts it immediately.
pub async fn recursive_rename_allowed(user: &User, source_dir: &VirtualPath, target_dir: &VirtualPath) -> RecursiveRenameOutcome {
    let resolved = path_mapper::resolve(user, source_dir);

    if resolved.backend.has_virtual_folders() {
        return if allowed(user, source_dir, Permissions::RENAME_DIRS) && allowed(user, target_dir, Permissions::RENAME_DIRS) {
            RecursiveRenameOutcome::Allowed
        } else {
            RecursiveRenameOutcome::Unsupported
        };
    }

    let root = resolved.backend_path.clone();
    let mut denied = false;
    let walk_result = resolved
        .backend
        .walk(&root, &mut |entry: Entry| {
            let Ok(meta) = entry.info else {
                return ControlFlow::Continue(());
            };
            let suffix = entry.path.strip_prefix(&root).unwrap_or(&entry.path).to_string_lossy().into_owned();
            let (entry_source, entry_target) = if suffix.is_empty() {
                (source_dir.clone(), target_dir.clone())
            } else {
                (source_dir.join(&suffix), target_dir.join(&suffix))
            };
            if !rename_allowed(user, &entry_source, &entry_target, meta.is_dir) {
                denied = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })
        .await;

    if denied {
        return RecursiveRenameOutcome::Denied;
    }
    match walk_result {
        Ok(()) => RecursiveRenameOutcome::Allowed,
        Err(err) if err.kind() == BackendErrorKind::NotExist => RecursiveRenameOutcome::NotExist,
        Err(_) => RecursiveRenameOutcome::Unsupported,
    }
}

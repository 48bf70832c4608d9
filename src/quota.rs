//! Quota accounting: snapshots, write-size gating, and the scope a write is charged to.

use crate::error::{ConnError, ConnErrorKind};
use crate::path::VirtualPath;
use crate::user::User;
use async_trait::async_trait;
use dashmap::DashMap;

/// A point-in-time view of a quota scope's usage, as reported by the external quota
/// provider. A negative `quota_size`/`quota_files` means "unlimited".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Whether the scope currently has any free space at all.
    pub has_space: bool,
    /// The byte quota for this scope, or a negative value for unlimited.
    pub quota_size: i64,
    /// Bytes currently used in this scope.
    pub used_size: i64,
    /// The file-count quota for this scope, or a negative value for unlimited.
    pub quota_files: i64,
    /// Files currently counted in this scope.
    pub used_files: i64,
}

/// The (user or virtual folder) a write's byte/file counts are charged against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuotaScope {
    /// Charged to the user's overall quota.
    User {
        /// The username.
        username: String,
    },
    /// Charged to a specific virtual folder's own quota.
    Folder {
        /// The mount prefix identifying the folder.
        virtual_path: String,
    },
}

impl QuotaScope {
    /// A short label for metrics: `"user"` or `"folder"`.
    pub fn label(&self) -> &'static str {
        match self {
            QuotaScope::User { .. } => "user",
            QuotaScope::Folder { .. } => "folder",
        }
    }
}

/// Determines which scope governs writes under `path`: the virtual folder mounted
/// there if it carries its own (non-negative) limits, otherwise the user.
pub fn governing_scope(user: &User, path: &VirtualPath) -> QuotaScope {
    if let Some(folder) = user.matching_virtual_folder(path) {
        if folder.quota_size >= 0 || folder.quota_files >= 0 {
            return QuotaScope::Folder {
                virtual_path: folder.virtual_path.to_string(),
            };
        }
    }
    QuotaScope::User {
        username: user.username.clone(),
    }
}

/// External collaborator: persists and reports quota usage per scope. Implemented by
/// the data provider; the core only orchestrates calls through this trait.
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    /// Returns the current usage snapshot for `scope`.
    async fn snapshot(&self, scope: &QuotaScope) -> Result<QuotaSnapshot, ConnError>;

    /// Atomically applies `files_delta`/`bytes_delta` to `scope`'s usage counters.
    /// Implementations must guarantee at-most-one successful update per logical
    /// filesystem event, even under concurrent rename/remove of the same object.
    async fn apply_delta(&self, scope: &QuotaScope, files_delta: i64, bytes_delta: i64) -> Result<(), ConnError>;
}

/// The result of [`max_write_size`]: either a hard byte cap, or no cap at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxWriteSize {
    /// No binding constraint; the caller may write an arbitrary amount.
    Unlimited,
    /// The caller must not write more than this many additional bytes.
    Limited(u64),
}

impl MaxWriteSize {
    /// Returns the numeric cap, or `u64::MAX` if unlimited.
    pub fn as_u64(self) -> u64 {
        match self {
            MaxWriteSize::Unlimited => u64::MAX,
            MaxWriteSize::Limited(n) => n,
        }
    }
}

fn nonzero(x: i64) -> Option<i64> {
    if x > 0 {
        Some(x)
    } else {
        None
    }
}

/// Computes the hard upper bound, in bytes, that a caller may still write.
///
/// `already_written` is how much of this upload has already landed (the resume
/// offset for a resumed transfer, or the bytes accepted so far in a streaming write).
/// The result is monotonic non-increasing in `already_written` and is `Limited(0)`
/// exactly when a binding constraint is exhausted.
pub fn max_write_size(
    quota: QuotaSnapshot,
    is_resume: bool,
    already_written: u64,
    resume_supported: bool,
    max_upload_file_size: u64,
) -> Result<MaxWriteSize, ConnErrorKind> {
    if is_resume && !resume_supported {
        return Err(ConnErrorKind::OpUnsupported);
    }
    if !is_resume && !quota.has_space {
        return Err(ConnErrorKind::QuotaExceeded);
    }
    let user_component = nonzero(max_upload_file_size as i64 - already_written as i64);
    let quota_component = nonzero(quota.quota_size - quota.used_size - already_written as i64);
    let bound = match (user_component, quota_component) {
        (None, None) => return Ok(MaxWriteSize::Unlimited),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (Some(a), Some(b)) => a.min(b),
    };
    Ok(MaxWriteSize::Limited(bound.max(0) as u64))
}

/// An in-memory [`QuotaProvider`], keyed by [`QuotaScope`]. Intended for tests and
/// single-node deployments; a clustered deployment backs the trait with its data
/// provider's own persistent counters instead.
#[derive(Debug, Default)]
pub struct InMemoryQuotaProvider {
    limits: DashMap<QuotaScope, (i64, i64)>,
    usage: DashMap<QuotaScope, (i64, i64)>,
}

impl InMemoryQuotaProvider {
    /// Creates an empty provider: every scope starts unlimited with zero usage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the byte/file limits for `scope`. A negative value means unlimited,
    /// matching [`QuotaSnapshot`]'s convention.
    pub fn set_limit(&self, scope: QuotaScope, quota_size: i64, quota_files: i64) {
        self.limits.insert(scope, (quota_size, quota_files));
    }
}

#[async_trait]
impl QuotaProvider for InMemoryQuotaProvider {
    async fn snapshot(&self, scope: &QuotaScope) -> Result<QuotaSnapshot, ConnError> {
        let (quota_size, quota_files) = self.limits.get(scope).map(|l| *l).unwrap_or((-1, -1));
        let (used_size, used_files) = self.usage.get(scope).map(|u| *u).unwrap_or((0, 0));
        let has_space = (quota_size < 0 || used_size < quota_size) && (quota_files < 0 || used_files < quota_files);
        Ok(QuotaSnapshot {
            has_space,
            quota_size,
            used_size,
            quota_files,
            used_files,
        })
    }

    async fn apply_delta(&self, scope: &QuotaScope, files_delta: i64, bytes_delta: i64) -> Result<(), ConnError> {
        let mut entry = self.usage.entry(scope.clone()).or_insert((0, 0));
        entry.0 = (entry.0 + bytes_delta).max(0);
        entry.1 = (entry.1 + files_delta).max(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(has_space: bool, quota_size: i64, used_size: i64) -> QuotaSnapshot {
        QuotaSnapshot {
            has_space,
            quota_size,
            used_size,
            quota_files: -1,
            used_files: 0,
        }
    }

    #[test]
    fn exhausted_quota_without_resume_is_rejected() {
        let err = max_write_size(snapshot(false, 1000, 1000), false, 0, true, 0).unwrap_err();
        assert_eq!(err, ConnErrorKind::QuotaExceeded);
    }

    #[test]
    fn resume_without_backend_support_is_unsupported() {
        let err = max_write_size(snapshot(true, 0, 0), true, 10, false, 100).unwrap_err();
        assert_eq!(err, ConnErrorKind::OpUnsupported);
    }

    #[test]
    fn unlimited_when_both_constraints_absent() {
        let size = max_write_size(snapshot(true, 0, 0), false, 0, true, 0).unwrap();
        assert_eq!(size, MaxWriteSize::Unlimited);
    }

    #[test]
    fn resume_with_unlimited_quota_is_capped_by_user_limit() {
        // max-upload-file-size=100, quota-size=0 (unlimited), already=10, resuming.
        let size = max_write_size(snapshot(true, 0, 0), true, 10, true, 100).unwrap();
        assert_eq!(size, MaxWriteSize::Limited(90));
    }

    #[test]
    fn the_tighter_of_user_and_quota_limits_wins() {
        // max-upload-file-size=100, quota-size=1000, used=990, already=50:
        // user side allows 50 more bytes; quota side (1000-990-50 = -40) is exhausted
        // and contributes no constraint, so the user-side cap of 50 governs.
        let size = max_write_size(snapshot(true, 1000, 990), false, 50, true, 100).unwrap();
        assert_eq!(size, MaxWriteSize::Limited(50));
    }

    #[test]
    fn monotonic_non_increasing_in_already_written() {
        let a = max_write_size(snapshot(true, 1000, 500), false, 100, true, 0).unwrap().as_u64();
        let b = max_write_size(snapshot(true, 1000, 500), false, 200, true, 0).unwrap().as_u64();
        assert!(b <= a);
    }

    #[tokio::test]
    async fn in_memory_provider_tracks_usage_and_enforces_limits() {
        let provider = InMemoryQuotaProvider::new();
        let scope = QuotaScope::User { username: "alice".into() };
        provider.set_limit(scope.clone(), 100, -1);

        let snap = provider.snapshot(&scope).await.unwrap();
        assert!(snap.has_space);
        assert_eq!(snap.used_size, 0);

        provider.apply_delta(&scope, 1, 80).await.unwrap();
        let snap = provider.snapshot(&scope).await.unwrap();
        assert_eq!(snap.used_size, 80);
        assert!(snap.has_space);

        provider.apply_delta(&scope, 1, 30).await.unwrap();
        let snap = provider.snapshot(&scope).await.unwrap();
        assert_eq!(snap.used_size, 110);
        assert!(!snap.has_space);

        provider.apply_delta(&scope, -1, -30).await.unwrap();
        let snap = provider.snapshot(&scope).await.unwrap();
        assert_eq!(snap.used_size, 80);
        assert!(snap.has_space);
    }
}

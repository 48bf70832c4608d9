#![allow(missing_docs)]

mod common;

use async_trait::async_trait;
use common::{make_connection, make_user};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;
use xfer_connection::backend::local::LocalDisk;
use xfer_connection::config::SetstatMode;
use xfer_connection::connection::Connection;
use xfer_connection::path::VirtualPath;
use xfer_connection::permission_oracle::{self, RecursiveRenameOutcome};
use xfer_connection::permissions::Permissions;
use xfer_connection::protocol::Protocol;
use xfer_connection::user::{Filters, User, VirtualFolder};
use xfer_core::backend::{Entry, FileMetadata, Result as BeResult, StorageBackend, Visit};
use xfer_core::error::{BackendError, BackendErrorKind};

// Scenario D (dir-removal ordering) and Scenario G (quota write sizing) are covered at
// the unit level in `order.rs` and `quota.rs`; these integration tests exercise the
// whole `Connection` against a real local-disk backend instead.

#[tokio::test]
async fn remove_dir_tree_removes_nested_files_and_directories() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    tokio::fs::create_dir_all(home.join("a/b")).await.unwrap();
    tokio::fs::write(home.join("a/top.txt"), b"x").await.unwrap();
    tokio::fs::write(home.join("a/b/leaf.txt"), b"yy").await.unwrap();

    let user = make_user(home.clone(), Permissions::ANY, vec![]);
    let conn = make_connection(user, Protocol::Sftp);

    conn.remove_dir_tree(&VirtualPath::parse("/a")).await.unwrap();
    assert!(tokio::fs::metadata(home.join("a")).await.is_err());
}

#[tokio::test]
async fn remove_dir_tree_on_virtual_folder_mount_is_rejected() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    let shared = tempdir().unwrap();
    tokio::fs::create_dir_all(shared.path()).await.unwrap();

    let folder = VirtualFolder {
        virtual_path: VirtualPath::parse("/shared"),
        mapped_path: shared.path().to_path_buf(),
        backend: Arc::new(LocalDisk::new("test-conn")),
        quota_size: -1,
        quota_files: -1,
    };
    let user = make_user(home, Permissions::ANY, vec![folder]);
    let conn = make_connection(user, Protocol::Sftp);

    let err = conn.remove_dir_tree(&VirtualPath::parse("/shared")).await.unwrap_err();
    assert!(!conn.is_not_exist_error(&err));
}

#[tokio::test]
async fn rename_moves_a_file_within_the_same_backend() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    tokio::fs::write(home.join("a.txt"), b"hello").await.unwrap();

    let user = make_user(home.clone(), Permissions::ANY, vec![]);
    let conn = make_connection(user, Protocol::Sftp);

    conn.rename(&VirtualPath::parse("/a.txt"), &VirtualPath::parse("/b.txt")).await.unwrap();
    assert!(tokio::fs::metadata(home.join("b.txt")).await.is_ok());
    assert!(tokio::fs::metadata(home.join("a.txt")).await.is_err());
}

#[tokio::test]
async fn rename_without_permission_is_denied() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    tokio::fs::write(home.join("a.txt"), b"hello").await.unwrap();

    // Grants everything except rename.
    let user = make_user(home, Permissions::LIST_ITEMS | Permissions::DOWNLOAD | Permissions::UPLOAD, vec![]);
    let conn = make_connection(user, Protocol::Sftp);

    let err = conn.rename(&VirtualPath::parse("/a.txt"), &VirtualPath::parse("/b.txt")).await.unwrap_err();
    assert!(!conn.is_not_exist_error(&err));
}

#[tokio::test]
async fn rename_across_virtual_folder_boundary_is_rejected() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    let shared = tempdir().unwrap();
    tokio::fs::write(home.join("a.txt"), b"hello").await.unwrap();

    let folder = VirtualFolder {
        virtual_path: VirtualPath::parse("/avdir"),
        mapped_path: shared.path().to_path_buf(),
        backend: Arc::new(LocalDisk::new("test-conn")),
        quota_size: -1,
        quota_files: -1,
    };
    let user = make_user(home, Permissions::ANY, vec![folder]);
    let conn = make_connection(user, Protocol::Sftp);

    // Scenario B: renaming into a virtual-folder mount point is always rejected.
    let err = conn
        .rename(&VirtualPath::parse("/source.txt"), &VirtualPath::parse("/avdir/vdirtarget"))
        .await
        .unwrap_err();
    assert!(!conn.is_not_exist_error(&err));
}

#[tokio::test]
async fn setstat_mode_ignore_skips_the_backend_entirely() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    let missing = VirtualPath::parse("/does-not-exist.txt");

    let user = make_user(home, Permissions::ANY, vec![]);
    let conn = Connection::new(
        "conn-1",
        user,
        Protocol::Sftp,
        Arc::new(xfer_connection::config::ConfigHandle::new(xfer_connection::config::Config {
            setstat_mode: SetstatMode::Ignore,
            ..Default::default()
        })),
        Arc::new(common::UnlimitedQuota),
    )
    .unwrap();

    // Mode=1 (Scenario E): chmod succeeds without ever touching the (missing) target.
    conn.handle_chmod(&missing, 0o644).await.unwrap();
}

#[tokio::test]
async fn setstat_mode_honor_ignore_unsupported_swallows_unsupported_errors() {
    #[derive(Debug)]
    struct ChmodUnsupportedBackend;

    #[async_trait]
    impl StorageBackend for ChmodUnsupportedBackend {
        fn has_virtual_folders(&self) -> bool {
            false
        }
        fn is_upload_resume_supported(&self) -> bool {
            true
        }
        async fn stat(&self, _path: &Path) -> BeResult<FileMetadata> {
            Ok(FileMetadata {
                len: 0,
                is_dir: false,
                is_file: true,
                is_symlink: false,
                modified: None,
                uid: 0,
                gid: 0,
                mode: 0,
            })
        }
        async fn open(&self, _path: &Path, _start_pos: u64) -> BeResult<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>> {
            unimplemented!()
        }
        async fn create(&self, _path: &Path, _start_pos: u64) -> BeResult<Box<dyn tokio::io::AsyncWrite + Send + Sync + Unpin>> {
            unimplemented!()
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn remove_file(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn remove_dir(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn mkdir(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn walk(&self, _path: &Path, _visit: &mut Visit) -> BeResult<()> {
            Ok(())
        }
        async fn chmod(&self, _path: &Path, _mode: u32) -> BeResult<()> {
            Err(BackendError::from(BackendErrorKind::Unsupported))
        }
        async fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> BeResult<()> {
            Ok(())
        }
        async fn chtimes(&self, _path: &Path, _atime: Option<std::time::SystemTime>, _mtime: Option<std::time::SystemTime>, _is_uploading: bool) -> BeResult<()> {
            Ok(())
        }
        async fn check_root_path(&self, _username: &str, _uid: Option<u32>, _gid: Option<u32>) -> BeResult<()> {
            Ok(())
        }
    }

    let mut permissions = BTreeMap::new();
    permissions.insert(VirtualPath::root(), Permissions::ANY);
    let user = User::new(
        "alice",
        PathBuf::from("/"),
        Arc::new(ChmodUnsupportedBackend),
        permissions,
        Filters::default(),
        vec![],
        None,
        None,
    )
    .unwrap();

    let conn = Connection::new(
        "conn-1",
        user,
        Protocol::Sftp,
        Arc::new(xfer_connection::config::ConfigHandle::new(xfer_connection::config::Config {
            setstat_mode: SetstatMode::HonorIgnoreUnsupported,
            ..Default::default()
        })),
        Arc::new(common::UnlimitedQuota),
    )
    .unwrap();

    conn.handle_chmod(&VirtualPath::parse("/a.txt"), 0o644).await.unwrap();
}

// Scenario A: recursive-rename permission denial.
#[tokio::test]
async fn recursive_rename_reports_not_exist_for_a_missing_source() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    let user = make_user(home, Permissions::LIST_ITEMS | Permissions::UPLOAD | Permissions::DOWNLOAD | Permissions::RENAME_DIRS, vec![]);

    let outcome = permission_oracle::recursive_rename_allowed(&user, &VirtualPath::parse("/missing"), &VirtualPath::parse("/target")).await;
    assert_eq!(outcome, RecursiveRenameOutcome::Unsupported);
}

#[tokio::test]
async fn recursive_rename_short_circuits_on_missing_rename_dirs() {
    // No rename-dirs, only rename-files, on a has-virtual-folders backend: the quick
    // check must deny without attempting to walk.
    #[derive(Debug)]
    struct VirtualFolderBackend;

    #[async_trait]
    impl StorageBackend for VirtualFolderBackend {
        fn has_virtual_folders(&self) -> bool {
            true
        }
        fn is_upload_resume_supported(&self) -> bool {
            false
        }
        async fn stat(&self, _path: &Path) -> BeResult<FileMetadata> {
            unimplemented!()
        }
        async fn open(&self, _path: &Path, _start_pos: u64) -> BeResult<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>> {
            unimplemented!()
        }
        async fn create(&self, _path: &Path, _start_pos: u64) -> BeResult<Box<dyn tokio::io::AsyncWrite + Send + Sync + Unpin>> {
            unimplemented!()
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn remove_file(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn remove_dir(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn mkdir(&self, _path: &Path) -> BeResult<()> {
            Ok(())
        }
        async fn walk(&self, _path: &Path, _visit: &mut Visit) -> BeResult<()> {
            Err(BackendError::from(BackendErrorKind::Unsupported))
        }
        async fn chmod(&self, _path: &Path, _mode: u32) -> BeResult<()> {
            Ok(())
        }
        async fn chown(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> BeResult<()> {
            Ok(())
        }
        async fn chtimes(&self, _path: &Path, _atime: Option<std::time::SystemTime>, _mtime: Option<std::time::SystemTime>, _is_uploading: bool) -> BeResult<()> {
            Ok(())
        }
        async fn check_root_path(&self, _username: &str, _uid: Option<u32>, _gid: Option<u32>) -> BeResult<()> {
            Ok(())
        }
    }

    let mut permissions = BTreeMap::new();
    permissions.insert(VirtualPath::root(), Permissions::LIST_ITEMS | Permissions::UPLOAD | Permissions::DOWNLOAD | Permissions::RENAME_FILES);
    let user_with_vf_backend = User::new(
        "alice",
        PathBuf::from("/"),
        Arc::new(VirtualFolderBackend),
        permissions,
        Filters::default(),
        vec![],
        None,
        None,
    )
    .unwrap();

    let outcome = permission_oracle::recursive_rename_allowed(&user_with_vf_backend, &VirtualPath::parse("/source"), &VirtualPath::parse("/target")).await;
    assert_eq!(outcome, RecursiveRenameOutcome::Unsupported);
}

#[tokio::test]
async fn walk_based_remove_honors_permission_denial_mid_tree() {
    let dir = tempdir().unwrap();
    let home = dir.path().to_path_buf();
    tokio::fs::create_dir_all(home.join("a/locked")).await.unwrap();
    tokio::fs::write(home.join("a/locked/secret.txt"), b"x").await.unwrap();

    // Grant delete at root but explicitly withhold delete-files under /a/locked.
    let mut permissions = BTreeMap::new();
    permissions.insert(VirtualPath::root(), Permissions::ANY);
    permissions.insert(VirtualPath::parse("/a/locked"), Permissions::LIST_ITEMS);
    let user = User::new(
        "alice",
        home,
        Arc::new(LocalDisk::new("test-conn")),
        permissions,
        Filters::default(),
        vec![],
        None,
        None,
    )
    .unwrap();
    let conn = make_connection(user, Protocol::Sftp);

    let err = conn.remove_dir_tree(&VirtualPath::parse("/a")).await.unwrap_err();
    assert!(!conn.is_not_exist_error(&err));
}

// A sanity check that `Entry`'s post-order walk contract the operation engine relies
// on really does yield children before their parent directory.
#[tokio::test]
async fn local_disk_walk_is_post_order() {
    let dir = tempdir().unwrap();
    tokio::fs::create_dir_all(dir.path().join("x/y")).await.unwrap();
    tokio::fs::write(dir.path().join("x/y/f.txt"), b"z").await.unwrap();

    let backend = LocalDisk::new("test-conn");
    let mut order: Vec<PathBuf> = Vec::new();
    backend
        .walk(dir.path(), &mut |entry: Entry| {
            order.push(entry.path);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    let y_idx = order.iter().position(|p| p.ends_with("x/y")).unwrap();
    let f_idx = order.iter().position(|p| p.ends_with("x/y/f.txt")).unwrap();
    assert!(f_idx < y_idx, "file must be visited before its parent directory");
}

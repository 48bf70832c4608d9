//! A local-disk [`StorageBackend`], serving paths directly off the host filesystem.
//!
//! Reference implementation only: the pluggable production backends (object store,
//! remote file-transfer server, encrypted-local, HTTP-fronted) are out of scope
//! here and are consumed purely through the trait.

use async_trait::async_trait;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWrite};
use xfer_core::backend::{Entry, FileMetadata, Result as BeResult, StorageBackend, Visit};
use xfer_core::error::BackendError;

/// Serves a subtree of the real filesystem. Resume is supported (plain seek on
/// open), and it reports `has_virtual_folders = false` since every directory is a
/// real directory and can be walked cheaply.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    connection_id: String,
}

impl LocalDisk {
    /// Creates a backend tagged with `connection_id`, used only for diagnostics.
    pub fn new(connection_id: impl Into<String>) -> Self {
        LocalDisk {
            connection_id: connection_id.into(),
        }
    }
}

fn to_metadata(meta: std::fs::Metadata) -> FileMetadata {
    #[cfg(unix)]
    let (uid, gid, mode) = {
        use std::os::unix::fs::MetadataExt;
        (meta.uid(), meta.gid(), meta.mode())
    };
    #[cfg(not(unix))]
    let (uid, gid, mode) = (0, 0, 0);
    FileMetadata {
        len: meta.len(),
        is_dir: meta.is_dir(),
        is_file: meta.is_file(),
        is_symlink: meta.file_type().is_symlink(),
        modified: meta.modified().ok(),
        uid,
        gid,
        mode,
    }
}

fn walk_dir<'a>(
    root: PathBuf,
    visit: &'a mut Visit,
) -> Pin<Box<dyn Future<Output = BeResult<ControlFlow<()>>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(e) => e,
            Err(err) => return Err(BackendError::from(err)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(BackendError::from)? {
            let path = entry.path();
            let info = tokio::fs::symlink_metadata(&path).await.map(to_metadata).map_err(BackendError::from);
            let is_dir = matches!(&info, Ok(m) if m.is_dir);
            if is_dir {
                if let ControlFlow::Break(()) = walk_dir(path.clone(), &mut *visit).await? {
                    return Ok(ControlFlow::Break(()));
                }
            }
            if let ControlFlow::Break(()) = visit(Entry { path, info }) {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    })
}

#[async_trait]
impl StorageBackend for LocalDisk {
    fn has_virtual_folders(&self) -> bool {
        false
    }

    fn is_upload_resume_supported(&self) -> bool {
        true
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn stat(&self, path: &Path) -> BeResult<FileMetadata> {
        Ok(to_metadata(tokio::fs::metadata(path).await.map_err(BackendError::from)?))
    }

    async fn lstat(&self, path: &Path) -> BeResult<FileMetadata> {
        Ok(to_metadata(tokio::fs::symlink_metadata(path).await.map_err(BackendError::from)?))
    }

    async fn open(&self, path: &Path, start_pos: u64) -> BeResult<Box<dyn AsyncRead + Send + Sync + Unpin>> {
        use tokio::io::AsyncSeekExt;
        let mut file = tokio::fs::File::open(path).await.map_err(BackendError::from)?;
        if start_pos > 0 {
            file.seek(std::io::SeekFrom::Start(start_pos)).await.map_err(BackendError::from)?;
        }
        Ok(Box::new(file))
    }

    async fn create(&self, path: &Path, start_pos: u64) -> BeResult<Box<dyn AsyncWrite + Send + Sync + Unpin>> {
        use tokio::io::AsyncSeekExt;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(start_pos == 0)
            .open(path)
            .await
            .map_err(BackendError::from)?;
        if start_pos > 0 {
            file.seek(std::io::SeekFrom::Start(start_pos)).await.map_err(BackendError::from)?;
        }
        Ok(Box::new(file))
    }

    async fn rename(&self, from: &Path, to: &Path) -> BeResult<()> {
        tokio::fs::rename(from, to).await.map_err(BackendError::from)
    }

    async fn remove_file(&self, path: &Path) -> BeResult<()> {
        tokio::fs::remove_file(path).await.map_err(BackendError::from)
    }

    async fn remove_dir(&self, path: &Path) -> BeResult<()> {
        tokio::fs::remove_dir(path).await.map_err(BackendError::from)
    }

    async fn mkdir(&self, path: &Path) -> BeResult<()> {
        tokio::fs::create_dir(path).await.map_err(BackendError::from)
    }

    async fn walk(&self, path: &Path, visit: &mut Visit) -> BeResult<()> {
        walk_dir(path.to_path_buf(), visit).await?;
        Ok(())
    }

    async fn chmod(&self, path: &Path, mode: u32) -> BeResult<()> {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(mode);
        tokio::fs::set_permissions(path, perms).await.map_err(BackendError::from)
    }

    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> BeResult<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let uid = uid.map(nix::unistd::Uid::from_raw);
            let gid = gid.map(nix::unistd::Gid::from_raw);
            nix::unistd::chown(&path, uid, gid).map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
        })
        .await
        .map_err(|join_err| BackendError::new(xfer_core::error::BackendErrorKind::Other, join_err))?
        .map_err(BackendError::from)
    }

    async fn chtimes(&self, path: &Path, atime: Option<SystemTime>, mtime: Option<SystemTime>, _is_uploading: bool) -> BeResult<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let to_timespec = |t: Option<SystemTime>| match t {
                Some(t) => nix::sys::time::TimeSpec::from(t.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default()),
                None => nix::sys::stat::UTIME_OMIT,
            };
            nix::sys::stat::utimensat(
                None,
                &path,
                &to_timespec(atime),
                &to_timespec(mtime),
                nix::sys::stat::UtimensatFlags::FollowSymlink,
            )
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
        })
        .await
        .map_err(|join_err| BackendError::new(xfer_core::error::BackendErrorKind::Other, join_err))?
        .map_err(BackendError::from)
    }

    async fn check_root_path(&self, _username: &str, _uid: Option<u32>, _gid: Option<u32>) -> BeResult<()> {
        Ok(())
    }
}

//! The error kinds this filesystem can surface, and their conversion to the
//! negative-errno idiom the operation surface and the FUSE adapter both speak.

use std::io;

/// Everything that can go wrong while servicing a filesystem operation.
///
/// Every variant but [`FsError::Io`] corresponds to one of the POSIX error
/// kinds this filesystem is allowed to return; `Io` carries failures from the
/// backing image itself (open/resize/map), which are fatal to the mount.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("file name too long")]
    NameTooLong,
    #[error("no space left on device")]
    NoSpace,
    #[error("permission denied")]
    PermissionDenied,
    #[error("file already exists")]
    AlreadyExists,
    #[error("backing image error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// The negative-errno value this error corresponds to.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => -libc::ENOENT,
            FsError::NotADirectory => -libc::ENOTDIR,
            FsError::NotEmpty => -libc::ENOTEMPTY,
            FsError::NameTooLong => -libc::ENAMETOOLONG,
            FsError::NoSpace => -libc::ENOSPC,
            FsError::PermissionDenied => -libc::EACCES,
            FsError::AlreadyExists => -libc::EEXIST,
            FsError::Io(_) => -libc::EIO,
        }
    }

    /// The positive `libc::c_int` errno `fuser`'s `ReplyXxx::error` expects.
    pub fn to_libc_errno(&self) -> libc::c_int {
        -self.to_errno()
    }
}

pub type FsResult<T> = Result<T, FsError>;

//! The engine's closed error set.
//!
//! Every fallible operation in the crate returns [`FsError`]. Nothing is retried and nothing is
//! translated lossily: each variant maps to exactly one POSIX error number at the host boundary
//! through [`FsError::to_errno`].

use std::io;

/// An error produced by the storage engine.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path resolution failed to find the requested entry.
    #[error("no such file or directory")]
    NotFound,
    /// A directory entry with the requested name already exists.
    #[error("file already exists")]
    Exists,
    /// A path component that was expected to be a directory is not one.
    #[error("not a directory")]
    NotADirectory,
    /// An operation that requires a regular file was given a directory, or vice versa.
    #[error("is a directory")]
    IsDirectory,
    /// `rmdir` was called on a directory containing entries other than `.` and `..`.
    #[error("directory not empty")]
    NotEmpty,
    /// The inode or block bitmap has no free entry left.
    #[error("no space left on device")]
    NoSpace,
    /// The requested logical block lies beyond the triple-indirect addressing limit.
    #[error("file too large")]
    TooLarge,
    /// The superblock's magic number did not match.
    #[error("corrupted image")]
    BadImage,
    /// An entry name was empty, contained `/`, or exceeded the maximum length.
    #[error("invalid name")]
    InvalidName,
    /// A mode check rejected the operation.
    #[error("permission denied")]
    PermissionDenied,
    /// Underlying image I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Maps the error to the POSIX error number to report at the host boundary.
    ///
    /// The returned value is the positive `errno` value; callers that need the FUSE/libc
    /// convention of a negated value negate it themselves.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::Exists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NoSpace => libc::ENOSPC,
            FsError::TooLarge => libc::EFBIG,
            FsError::BadImage => libc::EIO,
            FsError::InvalidName => libc::ENAMETOOLONG,
            FsError::PermissionDenied => libc::EACCES,
            FsError::Io(_) => libc::EIO,
        }
    }
}

/// Convenience alias used throughout the engine.
pub type FsResult<T> = Result<T, FsError>;

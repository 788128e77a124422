//! Error categories surfaced by file-system operations.
//!
//! Operations whose contract is a byte count (`read_at`, `write_at`) report
//! short counts instead of errors; everything else returns `Result`.

use core::fmt;

/// Why a file-system operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The free map, or the file size limit, could not satisfy an allocation.
    NoSpace,
    /// A directory entry with this name already exists.
    Exists,
    /// Path resolution found no entry with this name.
    NotFound,
    /// The directory to remove still has entries.
    NotEmpty,
    /// A path component is empty, longer than `DIRSIZ` bytes, or reserved.
    BadName,
    /// A non-directory inode where a directory was required.
    NotDir,
    /// The directory is still open somewhere, or is the root.
    Busy,
    /// A file descriptor that is not open in this session.
    BadFd,
}

pub type Result<T> = core::result::Result<T, FsError>;

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::NoSpace => "no space left on device",
            FsError::Exists => "name already exists",
            FsError::NotFound => "no such file or directory",
            FsError::NotEmpty => "directory not empty",
            FsError::BadName => "bad file name",
            FsError::NotDir => "not a directory",
            FsError::Busy => "directory in use",
            FsError::BadFd => "bad file descriptor",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for FsError {}

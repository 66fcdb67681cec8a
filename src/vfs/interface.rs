//! VFS interface definitions

use crate::types::{FileStat, HandleId, OpenFlags};
use crate::vfs::error::{VfsError, VfsResult};
use std::io::SeekFrom;

/// Origin of an lseek offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Current,
    End,
}

impl SeekWhence {
    /// Combine with an offset. A negative absolute offset is rejected.
    pub fn with_offset(self, offset: i64) -> VfsResult<SeekFrom> {
        match self {
            SeekWhence::Set => u64::try_from(offset)
                .map(SeekFrom::Start)
                .map_err(|_| VfsError::InvalidArgument(format!("negative offset {}", offset))),
            SeekWhence::Current => Ok(SeekFrom::Current(offset)),
            SeekWhence::End => Ok(SeekFrom::End(offset)),
        }
    }
}

impl TryFrom<i32> for SeekWhence {
    type Error = VfsError;

    fn try_from(whence: i32) -> VfsResult<Self> {
        match whence {
            libc::SEEK_SET => Ok(SeekWhence::Set),
            libc::SEEK_CUR => Ok(SeekWhence::Current),
            libc::SEEK_END => Ok(SeekWhence::End),
            other => Err(VfsError::InvalidArgument(format!("bad whence {}", other))),
        }
    }
}

/// Storage backend mounted under one prefix.
///
/// Paths are backend-relative: the mount prefix and leading `/` are already
/// stripped. Handles are the backend's own; the router maps its handles onto
/// them.
pub trait VfsBackend: Send + Sync {
    /// Open a file
    ///
    /// # Arguments
    /// * `path` - Backend-relative path
    /// * `flags` - `O_*` open flags
    /// * `mode` - Permission bits for created files
    ///
    /// # Returns
    /// * `Ok(HandleId)` - Backend handle for the open file
    /// * `Err(VfsError)` if an error occurred
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<HandleId>;

    fn fstat(&self, handle: HandleId) -> VfsResult<FileStat>;

    fn close(&self, handle: HandleId) -> VfsResult<()>;

    fn read(&self, handle: HandleId, buf: &mut [u8]) -> VfsResult<usize>;

    fn write(&self, handle: HandleId, data: &[u8]) -> VfsResult<usize>;

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()>;

    /// Stat a file by path, without a handle
    fn stat(&self, _path: &str) -> VfsResult<FileStat> {
        Err(VfsError::Unsupported("stat"))
    }

    /// Reposition the file offset, returning the new offset
    fn lseek(&self, _handle: HandleId, _offset: i64, _whence: SeekWhence) -> VfsResult<u64> {
        Err(VfsError::Unsupported("lseek"))
    }

    /// Names of the entries at the top of the backend
    fn list(&self) -> VfsResult<Vec<String>> {
        Err(VfsError::Unsupported("list"))
    }
}

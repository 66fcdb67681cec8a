//! VFS error definitions

use crate::devicefs::DeviceFsError;
use crate::types::HandleId;
use crate::vfs::path::VfsKind;
use thiserror::Error;

/// VFS error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VfsError {
    /// Path does not start with any mount prefix
    #[error("Unknown mount prefix: {0}")]
    UnknownPrefix(String),
    /// Path names a mountpoint or the root, not a file
    #[error("Is a mountpoint: {0}")]
    IsMountpoint(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    /// No backend is attached for the mount
    #[error("No backend attached for {}", .0.name())]
    NoBackend(VfsKind),
    /// Rename between two different mounts
    #[error("Cross-device rename from {src} to {dst}")]
    CrossDevice { src: String, dst: String },
    #[error("Invalid VFS handle: {0}")]
    InvalidHandle(HandleId),
    /// Backend does not implement the operation
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Device filesystem error: {0}")]
    Device(#[from] DeviceFsError),
    /// Raw negative code from a non-device backend
    #[error("Backend error (code {0})")]
    Backend(i32),
}

impl VfsError {
    /// Negative value returned to a host VFS callback
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::UnknownPrefix(_) => -libc::ENOENT,
            VfsError::IsMountpoint(_) => -libc::EISDIR,
            VfsError::NotADirectory(_) => -libc::ENOTDIR,
            VfsError::NoBackend(_) => -libc::ENODEV,
            VfsError::CrossDevice { .. } => -libc::EXDEV,
            VfsError::InvalidHandle(_) => -libc::EBADF,
            VfsError::Unsupported(_) => -libc::ENOSYS,
            VfsError::InvalidArgument(_) => -libc::EINVAL,
            VfsError::Device(err) => err.raw_code(),
            VfsError::Backend(code) => *code,
        }
    }
}

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;

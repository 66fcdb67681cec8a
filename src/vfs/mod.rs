//! VFS (Virtual File System) module
//!
//! This module routes path-based calls to the storage backend mounted under
//! the matching prefix. The device mount is served by the device filesystem
//! dispatch layer.

// Re-export error types and result type
pub mod error;
pub use error::{VfsError, VfsResult};

// Re-export interface traits
pub mod interface;
pub use interface::{SeekWhence, VfsBackend};

pub mod path;
pub use path::{Mounts, VfsKind, resolve};

pub mod device;

pub mod memory;
pub use memory::MemoryBackend;

pub mod router;
pub use router::VfsRouter;

//! Device filesystem dispatch library
//!
//! Routes descriptor-style file calls (open, fstat, close, read, write,
//! rename) to pluggable device drivers, and mounts that layer next to other
//! storage backends behind a small path-prefix router.

// Global type definitions
pub mod types;

pub mod config;
pub mod devicefs;
pub mod vfs;

// Re-export the main entry points for easier access
pub use config::{ClosePolicy, ReferencePolicy, VfsConfig};
pub use devicefs::{DeviceDriver, DeviceFs, DeviceFsError, DeviceFsStatus, DriverTable};
pub use vfs::{VfsBackend, VfsError, VfsRouter};

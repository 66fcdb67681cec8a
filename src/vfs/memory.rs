//! In-memory storage backend
//!
//! Serves a mount straight from a `MemoryDriver`, with driver descriptors
//! used as backend handles. Stands in for the eeprom and sdcard filesystems.

use crate::devicefs::{DeviceDriver, DriverFault, DriverOp, MemoryDriver};
use crate::types::{FileStat, HandleId, OpenFlags};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::interface::{SeekWhence, VfsBackend};
use std::sync::Arc;

fn fault(op: &'static str) -> impl Fn(DriverFault) -> VfsError {
    move |fault| match fault {
        DriverFault::Unsupported => VfsError::Unsupported(op),
        DriverFault::Code(code) if code < 0 => VfsError::Backend(code),
        DriverFault::Code(_) => VfsError::Backend(-libc::EIO),
    }
}

pub struct MemoryBackend {
    driver: Arc<MemoryDriver>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_driver(Arc::new(MemoryDriver::new()))
    }

    pub fn with_driver(driver: Arc<MemoryDriver>) -> Self {
        Self { driver }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsBackend for MemoryBackend {
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<HandleId> {
        self.driver
            .open(path, flags, mode)
            .map_err(fault(DriverOp::Open.as_str()))
    }

    fn fstat(&self, handle: HandleId) -> VfsResult<FileStat> {
        self.driver
            .fstat(handle)
            .map_err(fault(DriverOp::Fstat.as_str()))
    }

    fn close(&self, handle: HandleId) -> VfsResult<()> {
        self.driver
            .close(handle)
            .map_err(fault(DriverOp::Close.as_str()))
    }

    fn read(&self, handle: HandleId, buf: &mut [u8]) -> VfsResult<usize> {
        self.driver
            .read(handle, buf)
            .map_err(fault(DriverOp::Read.as_str()))
    }

    fn write(&self, handle: HandleId, data: &[u8]) -> VfsResult<usize> {
        self.driver
            .write(handle, data)
            .map_err(fault(DriverOp::Write.as_str()))
    }

    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        self.driver.stat_name(path).map_err(fault("stat"))
    }

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        if self.driver.content(src).is_none() {
            return Err(VfsError::Backend(-libc::ENOENT));
        }
        self.driver
            .rename(src, dst)
            .map_err(fault(DriverOp::Rename.as_str()))
    }

    fn lseek(&self, handle: HandleId, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let pos = whence.with_offset(offset)?;
        self.driver.seek(handle, pos).map_err(fault("lseek"))
    }

    fn list(&self) -> VfsResult<Vec<String>> {
        Ok(self.driver.names())
    }
}

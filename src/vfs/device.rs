//! Device backend: the dispatch layer mounted as a VFS backend

use crate::devicefs::DeviceFs;
use crate::types::{FileStat, HandleId, O_RDONLY, OpenFlags};
use crate::vfs::error::VfsResult;
use crate::vfs::interface::VfsBackend;

impl VfsBackend for DeviceFs {
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<HandleId> {
        Ok(DeviceFs::open(self, path, flags, mode)?)
    }

    fn fstat(&self, handle: HandleId) -> VfsResult<FileStat> {
        Ok(DeviceFs::fstat(self, handle)?)
    }

    fn close(&self, handle: HandleId) -> VfsResult<()> {
        Ok(DeviceFs::close(self, handle)?)
    }

    fn read(&self, handle: HandleId, buf: &mut [u8]) -> VfsResult<usize> {
        Ok(DeviceFs::read(self, handle, buf)?)
    }

    fn write(&self, handle: HandleId, data: &[u8]) -> VfsResult<usize> {
        Ok(DeviceFs::write(self, handle, data)?)
    }

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        Ok(DeviceFs::rename(self, src, dst)?)
    }

    /// Drivers only stat open descriptors, so this opens and closes one
    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let handle = DeviceFs::open(self, path, O_RDONLY, 0)?;
        let stat = DeviceFs::fstat(self, handle);
        DeviceFs::close(self, handle)?;
        Ok(stat?)
    }

    // Device files have no offset at this layer; lseek keeps the default.

    fn list(&self) -> VfsResult<Vec<String>> {
        Ok(self.list_files().into_iter().map(|f| f.filename).collect())
    }
}

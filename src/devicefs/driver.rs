//! Driver capability interface
//!
//! A driver serves one (device type, subtype) pair. Every operation has a
//! default body reporting `DriverFault::Unsupported`, so a driver only
//! implements what its hardware can do.

use crate::devicefs::error::DeviceFsError;
use crate::types::{DriverFd, FileStat, OpenFlags};
use std::fmt;

/// Operations a driver may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Open,
    Fstat,
    Close,
    Read,
    Write,
    Rename,
}

impl DriverOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverOp::Open => "open",
            DriverOp::Fstat => "fstat",
            DriverOp::Close => "close",
            DriverOp::Read => "read",
            DriverOp::Write => "write",
            DriverOp::Rename => "rename",
        }
    }
}

impl fmt::Display for DriverOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverFault {
    /// The driver has no implementation for this operation
    Unsupported,
    /// Raw negative result code from the driver
    Code(i32),
}

impl DriverFault {
    /// Build a fault from an errno value (`EIO` becomes `Code(-EIO)`)
    pub fn errno(errno: i32) -> Self {
        DriverFault::Code(-errno.saturating_abs())
    }

    /// Convert into the layer's error for the given operation.
    ///
    /// Driver codes are expected to be negative; a non-negative code is
    /// reported as `-EIO` so it can never read as a success.
    pub fn into_error(self, op: DriverOp) -> DeviceFsError {
        match self {
            DriverFault::Unsupported => DeviceFsError::DriverUnimplementedFunction(op),
            DriverFault::Code(code) if code < 0 => DeviceFsError::Downstream(code),
            DriverFault::Code(_) => DeviceFsError::Downstream(-libc::EIO),
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverFault>;

/// Capability set every backing-store driver implements.
///
/// `open` returns a driver-local descriptor. The dispatch layer keeps it in
/// the handle table and hands it back on every later call for that handle.
pub trait DeviceDriver: Send + Sync {
    fn open(&self, _filename: &str, _flags: OpenFlags, _mode: u32) -> DriverResult<DriverFd> {
        Err(DriverFault::Unsupported)
    }

    fn fstat(&self, _fd: DriverFd) -> DriverResult<FileStat> {
        Err(DriverFault::Unsupported)
    }

    fn close(&self, _fd: DriverFd) -> DriverResult<()> {
        Err(DriverFault::Unsupported)
    }

    fn read(&self, _fd: DriverFd, _buf: &mut [u8]) -> DriverResult<usize> {
        Err(DriverFault::Unsupported)
    }

    fn write(&self, _fd: DriverFd, _data: &[u8]) -> DriverResult<usize> {
        Err(DriverFault::Unsupported)
    }

    fn rename(&self, _src: &str, _dst: &str) -> DriverResult<()> {
        Err(DriverFault::Unsupported)
    }
}

type OpenFn = Box<dyn Fn(&str, OpenFlags, u32) -> DriverResult<DriverFd> + Send + Sync>;
type FstatFn = Box<dyn Fn(DriverFd) -> DriverResult<FileStat> + Send + Sync>;
type CloseFn = Box<dyn Fn(DriverFd) -> DriverResult<()> + Send + Sync>;
type ReadFn = Box<dyn Fn(DriverFd, &mut [u8]) -> DriverResult<usize> + Send + Sync>;
type WriteFn = Box<dyn Fn(DriverFd, &[u8]) -> DriverResult<usize> + Send + Sync>;
type RenameFn = Box<dyn Fn(&str, &str) -> DriverResult<()> + Send + Sync>;

/// Function-table driver: one optional entry per operation.
///
/// Unset entries report `Unsupported` instead of being called.
///
/// # Examples
///
/// ```
/// use devicefs::devicefs::{DeviceDriver, DriverFault, DriverTable};
///
/// let table = DriverTable::new()
///     .with_open(|_name, _flags, _mode| Ok(0))
///     .with_read(|_fd, buf| {
///         buf[0] = b'1';
///         Ok(1)
///     });
///
/// let mut buf = [0u8; 1];
/// assert_eq!(table.read(0, &mut buf), Ok(1));
/// assert_eq!(table.write(0, b"x"), Err(DriverFault::Unsupported));
/// ```
#[derive(Default)]
pub struct DriverTable {
    open: Option<OpenFn>,
    fstat: Option<FstatFn>,
    close: Option<CloseFn>,
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    rename: Option<RenameFn>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(
        mut self,
        f: impl Fn(&str, OpenFlags, u32) -> DriverResult<DriverFd> + Send + Sync + 'static,
    ) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    pub fn with_fstat(
        mut self,
        f: impl Fn(DriverFd) -> DriverResult<FileStat> + Send + Sync + 'static,
    ) -> Self {
        self.fstat = Some(Box::new(f));
        self
    }

    pub fn with_close(
        mut self,
        f: impl Fn(DriverFd) -> DriverResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    pub fn with_read(
        mut self,
        f: impl Fn(DriverFd, &mut [u8]) -> DriverResult<usize> + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    pub fn with_write(
        mut self,
        f: impl Fn(DriverFd, &[u8]) -> DriverResult<usize> + Send + Sync + 'static,
    ) -> Self {
        self.write = Some(Box::new(f));
        self
    }

    pub fn with_rename(
        mut self,
        f: impl Fn(&str, &str) -> DriverResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.rename = Some(Box::new(f));
        self
    }

    /// Whether the table has an entry for `op`
    pub fn implements(&self, op: DriverOp) -> bool {
        match op {
            DriverOp::Open => self.open.is_some(),
            DriverOp::Fstat => self.fstat.is_some(),
            DriverOp::Close => self.close.is_some(),
            DriverOp::Read => self.read.is_some(),
            DriverOp::Write => self.write.is_some(),
            DriverOp::Rename => self.rename.is_some(),
        }
    }
}

impl DeviceDriver for DriverTable {
    fn open(&self, filename: &str, flags: OpenFlags, mode: u32) -> DriverResult<DriverFd> {
        let f = self.open.as_ref().ok_or(DriverFault::Unsupported)?;
        f(filename, flags, mode)
    }

    fn fstat(&self, fd: DriverFd) -> DriverResult<FileStat> {
        let f = self.fstat.as_ref().ok_or(DriverFault::Unsupported)?;
        f(fd)
    }

    fn close(&self, fd: DriverFd) -> DriverResult<()> {
        let f = self.close.as_ref().ok_or(DriverFault::Unsupported)?;
        f(fd)
    }

    fn read(&self, fd: DriverFd, buf: &mut [u8]) -> DriverResult<usize> {
        let f = self.read.as_ref().ok_or(DriverFault::Unsupported)?;
        f(fd, buf)
    }

    fn write(&self, fd: DriverFd, data: &[u8]) -> DriverResult<usize> {
        let f = self.write.as_ref().ok_or(DriverFault::Unsupported)?;
        f(fd, data)
    }

    fn rename(&self, src: &str, dst: &str) -> DriverResult<()> {
        let f = self.rename.as_ref().ok_or(DriverFault::Unsupported)?;
        f(src, dst)
    }
}

impl fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<&str> = [
            DriverOp::Open,
            DriverOp::Fstat,
            DriverOp::Close,
            DriverOp::Read,
            DriverOp::Write,
            DriverOp::Rename,
        ]
        .into_iter()
        .filter(|op| self.implements(*op))
        .map(|op| op.as_str())
        .collect();
        f.debug_struct("DriverTable").field("implements", &ops).finish()
    }
}

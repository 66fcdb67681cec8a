//! In-memory driver
//!
//! Keeps one byte buffer per file name and a cursor per open descriptor.
//! Used as the reference driver by tests, benchmarks and the shell.

use crate::devicefs::driver::{DeviceDriver, DriverFault, DriverResult};
use crate::types::{DriverFd, FileStat, OpenFlags};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest size a file may grow to
pub const MAX_FILE_SIZE: usize = 16 * 1024 * 1024;

struct OpenFile {
    name: String,
    offset: usize,
    append: bool,
}

#[derive(Default)]
struct MemoryState {
    contents: HashMap<String, Vec<u8>>,
    open_files: HashMap<DriverFd, OpenFile>,
    next_fd: DriverFd,
}

/// Driver backed by in-memory buffers
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
    /// Stat mode reported for every file
    stat_template: FileStat,
    /// Number of driver calls made, across all operations
    calls: AtomicUsize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::with_stat(FileStat::regular(0))
    }

    /// Driver whose files stat as character devices (pins, clocks)
    pub fn character_device() -> Self {
        Self::with_stat(FileStat::character_device())
    }

    fn with_stat(stat_template: FileStat) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            stat_template,
            calls: AtomicUsize::new(0),
        }
    }

    /// Preload the content of a file
    pub fn with_content(self, name: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .contents
            .insert(name.to_string(), data.to_vec());
        self
    }

    /// Current content of a file, if the driver knows it
    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().contents.get(name).cloned()
    }

    /// Known file names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().contents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Move the cursor of an open descriptor
    pub fn seek(&self, fd: DriverFd, pos: SeekFrom) -> DriverResult<u64> {
        self.record_call();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state
            .open_files
            .get_mut(&fd)
            .ok_or(DriverFault::errno(libc::EBADF))?;
        let len = state.contents.get(&file.name).map_or(0, |c| c.len()) as i64;

        let target = match pos {
            SeekFrom::Start(offset) => Some(i64::try_from(offset).unwrap_or(i64::MAX)),
            SeekFrom::Current(delta) => (file.offset as i64).checked_add(delta),
            SeekFrom::End(delta) => len.checked_add(delta),
        };
        match target {
            Some(offset) if offset > MAX_FILE_SIZE as i64 => Err(DriverFault::errno(libc::EFBIG)),
            Some(offset) if offset >= 0 => {
                file.offset = offset as usize;
                Ok(offset as u64)
            }
            _ => Err(DriverFault::errno(libc::EINVAL)),
        }
    }

    /// Stat a file by name without opening it
    pub fn stat_name(&self, name: &str) -> DriverResult<FileStat> {
        self.record_call();
        let state = self.state.lock();
        let size = state
            .contents
            .get(name)
            .map(|c| c.len())
            .ok_or(DriverFault::errno(libc::ENOENT))?;
        Ok(self.stat_for(size))
    }

    fn stat_for(&self, size: usize) -> FileStat {
        let mut stat = self.stat_template;
        if stat.is_regular() {
            stat.size = size as u64;
        }
        stat
    }

    #[cfg(test)]
    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().open_files.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDriver for MemoryDriver {
    fn open(&self, filename: &str, flags: OpenFlags, _mode: u32) -> DriverResult<DriverFd> {
        self.record_call();
        let mut state = self.state.lock();

        let content = state.contents.entry(filename.to_string()).or_default();
        if flags & libc::O_TRUNC != 0 {
            content.clear();
        }

        let fd = state.next_fd;
        state.next_fd += 1;
        state.open_files.insert(
            fd,
            OpenFile {
                name: filename.to_string(),
                offset: 0,
                append: flags & libc::O_APPEND != 0,
            },
        );
        Ok(fd)
    }

    fn fstat(&self, fd: DriverFd) -> DriverResult<FileStat> {
        self.record_call();
        let state = self.state.lock();
        let file = state
            .open_files
            .get(&fd)
            .ok_or(DriverFault::errno(libc::EBADF))?;
        let size = state.contents.get(&file.name).map_or(0, |c| c.len());
        Ok(self.stat_for(size))
    }

    fn close(&self, fd: DriverFd) -> DriverResult<()> {
        self.record_call();
        self.state
            .lock()
            .open_files
            .remove(&fd)
            .map(|_| ())
            .ok_or(DriverFault::errno(libc::EBADF))
    }

    fn read(&self, fd: DriverFd, buf: &mut [u8]) -> DriverResult<usize> {
        self.record_call();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state
            .open_files
            .get_mut(&fd)
            .ok_or(DriverFault::errno(libc::EBADF))?;
        let content = state
            .contents
            .get(&file.name)
            .ok_or(DriverFault::errno(libc::ENOENT))?;

        let start = file.offset.min(content.len());
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        file.offset = start + n;
        Ok(n)
    }

    fn write(&self, fd: DriverFd, data: &[u8]) -> DriverResult<usize> {
        self.record_call();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state
            .open_files
            .get_mut(&fd)
            .ok_or(DriverFault::errno(libc::EBADF))?;
        let content = state.contents.entry(file.name.clone()).or_default();

        let start = if file.append { content.len() } else { file.offset };
        let end = match start.checked_add(data.len()) {
            Some(end) if end <= MAX_FILE_SIZE => end,
            _ => return Err(DriverFault::errno(libc::EFBIG)),
        };
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        file.offset = end;
        Ok(data.len())
    }

    fn rename(&self, src: &str, dst: &str) -> DriverResult<()> {
        self.record_call();
        let mut state = self.state.lock();
        if let Some(content) = state.contents.remove(src) {
            state.contents.insert(dst.to_string(), content);
        }
        for file in state.open_files.values_mut().filter(|f| f.name == src) {
            file.name = dst.to_string();
        }
        Ok(())
    }
}

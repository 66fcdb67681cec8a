//! VFS router
//!
//! Resolves paths against the working directory, picks the backend from the
//! mount prefix and forwards the call. Router handles are allocated from
//! their own counter and map onto backend handles.

use crate::config::VfsConfig;
use crate::types::{FileStat, HandleId, OpenFlags};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::interface::{SeekWhence, VfsBackend};
use crate::vfs::path::{Mounts, VfsKind, resolve};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
struct RouterHandle {
    kind: VfsKind,
    backend_handle: HandleId,
}

struct RouterState {
    cwd: String,
    handles: HashMap<HandleId, RouterHandle>,
    next_handle: HandleId,
}

pub struct VfsRouter {
    mounts: Mounts,
    eeprom: Option<Arc<dyn VfsBackend>>,
    sdcard: Option<Arc<dyn VfsBackend>>,
    device: Option<Arc<dyn VfsBackend>>,
    state: RwLock<RouterState>,
}

impl VfsRouter {
    /// Router with no backends attached and the cwd at `/`
    pub fn new(config: &VfsConfig) -> Self {
        Self {
            mounts: Mounts::from_config(config),
            eeprom: None,
            sdcard: None,
            device: None,
            state: RwLock::new(RouterState {
                cwd: "/".to_string(),
                handles: HashMap::new(),
                next_handle: 0,
            }),
        }
    }

    pub fn with_eeprom(mut self, backend: Arc<dyn VfsBackend>) -> Self {
        self.eeprom = Some(backend);
        self
    }

    pub fn with_sdcard(mut self, backend: Arc<dyn VfsBackend>) -> Self {
        self.sdcard = Some(backend);
        self
    }

    pub fn with_device(mut self, backend: Arc<dyn VfsBackend>) -> Self {
        self.device = Some(backend);
        self
    }

    fn backend(&self, kind: VfsKind) -> VfsResult<&Arc<dyn VfsBackend>> {
        let mount = kind.mount().ok_or(VfsError::NoBackend(kind))?;
        let backend = match mount {
            VfsKind::Eeprom => &self.eeprom,
            VfsKind::Sdcard => &self.sdcard,
            _ => &self.device,
        };
        backend.as_ref().ok_or(VfsError::NoBackend(mount))
    }

    /// Resolve and classify a path, rejecting anything that is not a file
    fn locate(&self, path: &str) -> VfsResult<(VfsKind, String)> {
        let abs = resolve(&self.state.read().cwd, path)?;
        let (kind, rest) = self.mounts.classify(&abs);
        match kind {
            VfsKind::Error => Err(VfsError::UnknownPrefix(abs)),
            k if k.is_mountpoint() => Err(VfsError::IsMountpoint(abs)),
            _ => Ok((kind, rest.to_string())),
        }
    }

    fn entry(&self, handle: HandleId) -> VfsResult<RouterHandle> {
        self.state
            .read()
            .handles
            .get(&handle)
            .copied()
            .ok_or(VfsError::InvalidHandle(handle))
    }

    // ========== File operations ==========

    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<HandleId> {
        let (kind, rest) = self.locate(path)?;
        let backend = self.backend(kind)?;
        let backend_handle = backend.open(&rest, flags, mode)?;

        let allocated = {
            let mut state = self.state.write();
            let handle = state.next_handle;
            state.next_handle.checked_add(1).map(|next| {
                state.next_handle = next;
                state.handles.insert(
                    handle,
                    RouterHandle {
                        kind,
                        backend_handle,
                    },
                );
                handle
            })
        };

        match allocated {
            Some(handle) => {
                debug!(path, %kind, handle, backend_handle, "opened");
                Ok(handle)
            }
            None => {
                if let Err(err) = backend.close(backend_handle) {
                    warn!(path, backend_handle, %err, "failed to close after handle exhaustion");
                }
                Err(VfsError::InvalidArgument("router handle ids exhausted".to_string()))
            }
        }
    }

    pub fn fstat(&self, handle: HandleId) -> VfsResult<FileStat> {
        let entry = self.entry(handle)?;
        self.backend(entry.kind)?.fstat(entry.backend_handle)
    }

    /// Stat a file by path
    pub fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let (kind, rest) = self.locate(path)?;
        self.backend(kind)?.stat(&rest)
    }

    pub fn read(&self, handle: HandleId, buf: &mut [u8]) -> VfsResult<usize> {
        let entry = self.entry(handle)?;
        trace!(handle, size = buf.len(), "read");
        self.backend(entry.kind)?.read(entry.backend_handle, buf)
    }

    pub fn write(&self, handle: HandleId, data: &[u8]) -> VfsResult<usize> {
        let entry = self.entry(handle)?;
        trace!(handle, size = data.len(), "write");
        self.backend(entry.kind)?.write(entry.backend_handle, data)
    }

    pub fn lseek(&self, handle: HandleId, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let entry = self.entry(handle)?;
        self.backend(entry.kind)?
            .lseek(entry.backend_handle, offset, whence)
    }

    /// Close a router handle. The router handle is consumed even if the
    /// backend reports a failure.
    pub fn close(&self, handle: HandleId) -> VfsResult<()> {
        let entry = self
            .state
            .write()
            .handles
            .remove(&handle)
            .ok_or(VfsError::InvalidHandle(handle))?;
        let result = self.backend(entry.kind)?.close(entry.backend_handle);
        debug!(handle, ok = result.is_ok(), "closed");
        result
    }

    pub fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let (src_kind, src_rest) = self.locate(src)?;
        let (dst_kind, dst_rest) = self.locate(dst)?;
        if src_kind != dst_kind {
            return Err(VfsError::CrossDevice {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }

        self.backend(src_kind)?.rename(&src_rest, &dst_rest)?;
        debug!(src, dst, "renamed");
        Ok(())
    }

    pub fn open_handle_count(&self) -> usize {
        self.state.read().handles.len()
    }

    // ========== Directories ==========

    /// Change the working directory and return the new absolute path
    pub fn change_directory(&self, path: &str) -> VfsResult<String> {
        let mut state = self.state.write();
        let abs = resolve(&state.cwd, path)?;
        match self.mounts.classify(&abs).0 {
            VfsKind::Error => Err(VfsError::UnknownPrefix(abs)),
            VfsKind::Device => Err(VfsError::NotADirectory(abs)),
            _ => {
                state.cwd = abs.clone();
                Ok(abs)
            }
        }
    }

    pub fn current_directory(&self) -> String {
        self.state.read().cwd.clone()
    }

    pub fn list_directory(&self, path: &str) -> VfsResult<Vec<String>> {
        let abs = resolve(&self.current_directory(), path)?;
        match self.mounts.classify(&abs).0 {
            VfsKind::Root => Ok(self.mounts.names()),
            VfsKind::Error => Err(VfsError::UnknownPrefix(abs)),
            kind if kind.is_mountpoint() => self.backend(kind)?.list(),
            _ => Err(VfsError::NotADirectory(abs)),
        }
    }

    /// Classify a path relative to the working directory
    pub fn check_type(&self, path: &str) -> VfsKind {
        match resolve(&self.current_directory(), path) {
            Ok(abs) => self.mounts.classify(&abs).0,
            Err(_) => VfsKind::Error,
        }
    }

    pub fn check_type_string(&self, path: &str) -> &'static str {
        self.check_type(path).name()
    }
}

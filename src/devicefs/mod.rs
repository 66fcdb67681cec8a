//! Device filesystem dispatch layer
//!
//! Owns the driver registry, the file record table and the handle table
//! behind one lock, and turns filename- or handle-based calls into calls on
//! the registered driver.
//!
//! The lock is held only to resolve a driver and to mutate tables. Driver
//! calls run unlocked since they may block on hardware, so a driver
//! unregistered while a call is in flight does not abort that call.

pub mod driver;
pub mod error;
pub mod file_table;
mod handle_table;
pub mod memory;
pub mod registry;

pub use driver::{DeviceDriver, DriverFault, DriverOp, DriverResult, DriverTable};
pub use error::{DeviceFsError, DeviceFsResult, DeviceFsStatus, check_status};
pub use memory::MemoryDriver;
pub use registry::DriverKey;

use crate::config::{ClosePolicy, DeviceFsConfig, ReferencePolicy};
use crate::types::{
    DeviceType, DriverFd, FileStat, HandleId, NameKind, OpenFlags, check_name,
};
use file_table::{FileSlot, FileTable};
use handle_table::{HandleEntry, HandleTable};
use parking_lot::Mutex;
use registry::DriverRegistry;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct Tables {
    drivers: DriverRegistry,
    files: FileTable,
    handles: HandleTable,
}

/// A handle resolved to its driver, ready to be called without the lock
struct Resolved {
    driver: Arc<dyn DeviceDriver>,
    driver_fd: DriverFd,
}

/// Snapshot of a registered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: String,
    pub device_type: DeviceType,
    pub subtype: String,
    pub open_handles: Vec<HandleId>,
}

pub struct DeviceFs {
    tables: Mutex<Tables>,
    config: DeviceFsConfig,
}

impl DeviceFs {
    pub fn new() -> Self {
        Self::with_config(DeviceFsConfig::default())
    }

    pub fn with_config(config: DeviceFsConfig) -> Self {
        Self {
            tables: Mutex::new(Tables {
                drivers: DriverRegistry::new(),
                files: FileTable::new(),
                handles: HandleTable::new(config.first_handle),
            }),
            config,
        }
    }

    pub fn config(&self) -> &DeviceFsConfig {
        &self.config
    }

    // ========== Driver Registry ==========

    pub fn register_driver(
        &self,
        device_type: DeviceType,
        subtype: &str,
        driver: Arc<dyn DeviceDriver>,
    ) -> DeviceFsResult<()> {
        let subtype = check_subtype(subtype)?;
        self.tables
            .lock()
            .drivers
            .register(device_type, subtype, driver)?;
        debug!(%device_type, subtype, "registered driver");
        Ok(())
    }

    /// Remove a driver.
    ///
    /// File records assigned to it stay registered and fail with
    /// `NoMatchingDriver` until a driver is registered under the key again.
    /// Open handles on those files are governed by the reference policy.
    pub fn unregister_driver(&self, device_type: DeviceType, subtype: &str) -> DeviceFsResult<()> {
        let subtype = check_subtype(subtype)?;

        let (driver, released) = {
            let mut tables = self.tables.lock();
            if !tables.drivers.contains(device_type, subtype) {
                return Err(DeviceFsError::no_matching_driver(device_type, subtype));
            }

            let slots = tables.files.slots_for_driver(device_type, subtype);
            let open: Vec<HandleId> = slots
                .iter()
                .filter_map(|slot| tables.files.get(*slot))
                .flat_map(|r| r.handles.iter().copied())
                .collect();

            if !open.is_empty() && self.config.reference_policy == ReferencePolicy::FailWhileReferenced {
                return Err(DeviceFsError::invalid(format!(
                    "driver {}/{} has {} open handle(s)",
                    device_type,
                    subtype,
                    open.len()
                )));
            }

            let released = release_handles(&mut tables, &open);
            let driver = tables.drivers.unregister(device_type, subtype)?;
            (driver, released)
        };

        close_released(&driver, &released);
        debug!(%device_type, subtype, force_closed = released.len(), "unregistered driver");
        Ok(())
    }

    pub fn get_driver(
        &self,
        device_type: DeviceType,
        subtype: &str,
    ) -> DeviceFsResult<Arc<dyn DeviceDriver>> {
        let subtype = check_subtype(subtype)?;
        self.tables.lock().drivers.lookup(device_type, subtype)
    }

    /// Registered driver keys in registration order
    pub fn list_drivers(&self) -> Vec<DriverKey> {
        self.tables.lock().drivers.keys()
    }

    // ========== File Record Table ==========

    /// Register a filename against a driver key.
    ///
    /// The driver must already be registered.
    pub fn register_file(
        &self,
        filename: &str,
        device_type: DeviceType,
        subtype: &str,
    ) -> DeviceFsResult<()> {
        let filename = check_filename(filename)?;
        let subtype = check_subtype(subtype)?;

        let mut tables = self.tables.lock();
        if tables.files.contains(filename) {
            return Err(DeviceFsError::FilenameAlreadyExists(filename.to_string()));
        }
        if !tables.drivers.contains(device_type, subtype) {
            return Err(DeviceFsError::no_matching_driver(device_type, subtype));
        }
        tables.files.insert(filename, device_type, subtype)?;
        drop(tables);

        debug!(filename, %device_type, subtype, "registered file");
        Ok(())
    }

    pub fn unregister_file(&self, filename: &str) -> DeviceFsResult<()> {
        let filename = check_filename(filename)?;

        let (driver, released) = {
            let mut tables = self.tables.lock();
            let slot = tables.files.lookup(filename)?;
            let (open, device_type, subtype) = match tables.files.get(slot) {
                Some(r) => (
                    r.handles.iter().copied().collect::<Vec<_>>(),
                    r.device_type,
                    r.subtype.clone(),
                ),
                None => return Err(DeviceFsError::FileNotFound(filename.to_string())),
            };

            if !open.is_empty() && self.config.reference_policy == ReferencePolicy::FailWhileReferenced {
                return Err(DeviceFsError::invalid(format!(
                    "file {} has {} open handle(s)",
                    filename,
                    open.len()
                )));
            }

            let released = release_handles(&mut tables, &open);
            tables.files.remove(filename)?;
            let driver = tables.drivers.lookup(device_type, &subtype).ok();
            (driver, released)
        };

        match driver {
            Some(driver) => close_released(&driver, &released),
            None if !released.is_empty() => {
                warn!(filename, count = released.len(), "no driver to close released handles")
            }
            None => {}
        }
        debug!(filename, force_closed = released.len(), "unregistered file");
        Ok(())
    }

    pub fn list_files(&self) -> Vec<FileInfo> {
        let tables = self.tables.lock();
        let mut files: Vec<FileInfo> = tables.files.records().map(file_info).collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        files
    }

    pub fn file_info(&self, filename: &str) -> DeviceFsResult<FileInfo> {
        let filename = check_filename(filename)?;
        let tables = self.tables.lock();
        let slot = tables.files.lookup(filename)?;
        tables
            .files
            .get(slot)
            .map(file_info)
            .ok_or_else(|| DeviceFsError::FileNotFound(filename.to_string()))
    }

    /// Filename currently owning a handle
    pub fn handle_filename(&self, handle: HandleId) -> DeviceFsResult<String> {
        let tables = self.tables.lock();
        let entry = tables.handles.get(handle)?;
        tables
            .files
            .get(entry.slot)
            .map(|r| r.filename.clone())
            .ok_or(DeviceFsError::InvalidFileHandle(handle))
    }

    pub fn open_handle_count(&self) -> usize {
        self.tables.lock().handles.len()
    }

    // ========== Dispatch ==========

    pub fn open(&self, filename: &str, flags: OpenFlags, mode: u32) -> DeviceFsResult<HandleId> {
        let filename = check_filename(filename)?;

        let (driver, slot, record_id) = {
            let tables = self.tables.lock();
            let slot = tables.files.lookup(filename)?;
            let record = tables
                .files
                .get(slot)
                .ok_or_else(|| DeviceFsError::FileNotFound(filename.to_string()))?;
            let driver = tables.drivers.lookup(record.device_type, &record.subtype)?;
            (driver, slot, record.record_id)
        };

        let driver_fd = driver
            .open(filename, flags, mode)
            .map_err(|f| f.into_error(DriverOp::Open))?;

        let attached = {
            let mut tables = self.tables.lock();
            attach_handle(&mut tables, filename, slot, record_id, driver_fd)
        };

        match attached {
            Ok(handle) => {
                debug!(filename, handle, driver_fd, "opened device file");
                Ok(handle)
            }
            Err(err) => {
                // The driver opened a descriptor nobody can reach; give it back.
                if let Err(fault) = driver.close(driver_fd) {
                    warn!(filename, driver_fd, ?fault, "failed to roll back driver open");
                }
                Err(err)
            }
        }
    }

    pub fn fstat(&self, handle: HandleId) -> DeviceFsResult<FileStat> {
        let resolved = self.resolve(handle)?;
        trace!(handle, "fstat");
        resolved
            .driver
            .fstat(resolved.driver_fd)
            .map_err(|f| f.into_error(DriverOp::Fstat))
    }

    pub fn read(&self, handle: HandleId, buf: &mut [u8]) -> DeviceFsResult<usize> {
        let resolved = self.resolve(handle)?;
        trace!(handle, size = buf.len(), "read");
        resolved
            .driver
            .read(resolved.driver_fd, buf)
            .map_err(|f| f.into_error(DriverOp::Read))
    }

    pub fn write(&self, handle: HandleId, data: &[u8]) -> DeviceFsResult<usize> {
        let resolved = self.resolve(handle)?;
        trace!(handle, size = data.len(), "write");
        resolved
            .driver
            .write(resolved.driver_fd, data)
            .map_err(|f| f.into_error(DriverOp::Write))
    }

    /// Close a handle.
    ///
    /// With `ClosePolicy::ReleaseAlways` the handle is consumed even when
    /// the driver's close fails; the failure is still returned.
    pub fn close(&self, handle: HandleId) -> DeviceFsResult<()> {
        let resolved = {
            let mut tables = self.tables.lock();
            let entry = *tables.handles.get_open(handle)?;
            tables.handles.get_mut(handle)?.closing = true;
            resolve_driver(&tables, &entry).map(|driver| Resolved {
                driver,
                driver_fd: entry.driver_fd,
            })
        };

        let outcome = resolved.and_then(|r| {
            r.driver
                .close(r.driver_fd)
                .map_err(|f| f.into_error(DriverOp::Close))
        });

        let mut tables = self.tables.lock();
        if outcome.is_ok() || self.config.close_policy == ClosePolicy::ReleaseAlways {
            release_handles(&mut tables, &[handle]);
            drop(tables);
            match &outcome {
                Ok(()) => debug!(handle, "closed device file"),
                Err(err) => warn!(handle, %err, "driver close failed, handle released"),
            }
        } else if let Ok(entry) = tables.handles.get_mut(handle) {
            entry.closing = false;
        }
        outcome
    }

    /// Rename a registered file.
    ///
    /// The record keeps its slot, so handles opened under the old name keep
    /// working under the new one.
    pub fn rename(&self, src: &str, dst: &str) -> DeviceFsResult<()> {
        let src = check_filename(src)?;
        let dst = check_filename(dst)?;

        let (driver, slot, record_id) = {
            let tables = self.tables.lock();
            let slot = tables.files.lookup(src)?;
            if tables.files.contains(dst) {
                return Err(DeviceFsError::FilenameAlreadyExists(dst.to_string()));
            }
            let record = tables
                .files
                .get(slot)
                .ok_or_else(|| DeviceFsError::FileNotFound(src.to_string()))?;
            let driver = tables.drivers.lookup(record.device_type, &record.subtype)?;
            (driver, slot, record.record_id)
        };

        driver
            .rename(src, dst)
            .map_err(|f| f.into_error(DriverOp::Rename))?;

        let mut tables = self.tables.lock();
        if tables.files.get_live(slot, record_id).is_none() || tables.files.lookup(src)? != slot {
            warn!(src, dst, "file changed while driver rename was in flight");
            return Err(DeviceFsError::FileNotFound(src.to_string()));
        }
        tables.files.rekey(src, dst)?;
        drop(tables);

        debug!(src, dst, "renamed device file");
        Ok(())
    }

    /// Resolve an open handle to its driver and descriptor
    fn resolve(&self, handle: HandleId) -> DeviceFsResult<Resolved> {
        let tables = self.tables.lock();
        let entry = tables.handles.get_open(handle)?;
        let driver = resolve_driver(&tables, entry)?;
        Ok(Resolved {
            driver,
            driver_fd: entry.driver_fd,
        })
    }
}

impl Default for DeviceFs {
    fn default() -> Self {
        Self::new()
    }
}

fn check_filename(filename: &str) -> DeviceFsResult<&str> {
    check_name(NameKind::Filename, filename).map_err(DeviceFsError::Invalid)
}

fn check_subtype(subtype: &str) -> DeviceFsResult<&str> {
    check_name(NameKind::Subtype, subtype).map_err(DeviceFsError::Invalid)
}

fn file_info(record: &file_table::FileRecord) -> FileInfo {
    FileInfo {
        filename: record.filename.clone(),
        device_type: record.device_type,
        subtype: record.subtype.clone(),
        open_handles: record.handles.iter().copied().collect(),
    }
}

fn resolve_driver(tables: &Tables, entry: &HandleEntry) -> DeviceFsResult<Arc<dyn DeviceDriver>> {
    let record = tables
        .files
        .get_live(entry.slot, entry.record_id)
        .ok_or_else(|| DeviceFsError::DriverError("handle points at a removed file".to_string()))?;
    tables.drivers.lookup(record.device_type, &record.subtype)
}

/// Give a freshly opened descriptor a handle and link it both ways
fn attach_handle(
    tables: &mut Tables,
    filename: &str,
    slot: FileSlot,
    record_id: u64,
    driver_fd: DriverFd,
) -> DeviceFsResult<HandleId> {
    if tables.files.get_live(slot, record_id).is_none() {
        return Err(DeviceFsError::FileNotFound(filename.to_string()));
    }

    let handle = tables.handles.allocate()?;
    tables.handles.insert(
        handle,
        HandleEntry {
            slot,
            record_id,
            driver_fd,
            closing: false,
        },
    );
    if let Some(record) = tables.files.get_live_mut(slot, record_id) {
        record.handles.insert(handle);
    }
    Ok(handle)
}

/// Remove handles from both tables.
///
/// Returns the descriptors that still need a driver close; handles whose
/// close is already in flight are dropped from the tables but not returned.
fn release_handles(tables: &mut Tables, handles: &[HandleId]) -> Vec<(HandleId, DriverFd)> {
    let mut released = Vec::with_capacity(handles.len());
    for &handle in handles {
        let Ok(entry) = tables.handles.remove(handle) else {
            continue;
        };
        if let Some(record) = tables.files.get_live_mut(entry.slot, entry.record_id) {
            record.handles.remove(&handle);
        }
        if !entry.closing {
            released.push((handle, entry.driver_fd));
        }
    }
    released
}

/// Best-effort close of descriptors whose handles were force-released
fn close_released(driver: &Arc<dyn DeviceDriver>, released: &[(HandleId, DriverFd)]) {
    for &(handle, driver_fd) in released {
        match driver.close(driver_fd) {
            Ok(()) => debug!(handle, "force-closed handle"),
            Err(fault) => warn!(handle, driver_fd, ?fault, "force-close failed"),
        }
    }
}

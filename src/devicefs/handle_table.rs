//! Handle table
//!
//! Maps live handles to the slot of the record that owns them. Entries never
//! own the record; the file table is responsible for the fact that a handle
//! exists and removal cascades from there.

use crate::devicefs::error::{DeviceFsError, DeviceFsResult};
use crate::devicefs::file_table::FileSlot;
use crate::types::{DriverFd, HandleId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct HandleEntry {
    /// Owning record
    pub slot: FileSlot,
    /// Registration the handle was opened against
    pub record_id: u64,
    /// Descriptor returned by the driver's open
    pub driver_fd: DriverFd,
    /// Set while a close is in flight
    pub closing: bool,
}

pub struct HandleTable {
    entries: HashMap<HandleId, HandleEntry>,
    /// `None` once `HandleId::MAX` has been handed out
    next_handle: Option<HandleId>,
}

impl HandleTable {
    pub fn new(first_handle: HandleId) -> Self {
        Self {
            entries: HashMap::new(),
            next_handle: Some(first_handle),
        }
    }

    /// Take the next handle id. Ids are never reused.
    pub fn allocate(&mut self) -> DeviceFsResult<HandleId> {
        let id = self
            .next_handle
            .ok_or_else(|| DeviceFsError::DriverError("handle ids exhausted".to_string()))?;
        self.next_handle = id.checked_add(1);
        Ok(id)
    }

    pub fn insert(&mut self, handle: HandleId, entry: HandleEntry) {
        self.entries.insert(handle, entry);
    }

    pub fn get(&self, handle: HandleId) -> DeviceFsResult<&HandleEntry> {
        self.entries
            .get(&handle)
            .ok_or(DeviceFsError::InvalidFileHandle(handle))
    }

    pub fn get_mut(&mut self, handle: HandleId) -> DeviceFsResult<&mut HandleEntry> {
        self.entries
            .get_mut(&handle)
            .ok_or(DeviceFsError::InvalidFileHandle(handle))
    }

    /// Entry for a handle that is not being closed
    pub fn get_open(&self, handle: HandleId) -> DeviceFsResult<&HandleEntry> {
        match self.get(handle)? {
            entry if entry.closing => Err(DeviceFsError::InvalidFileHandle(handle)),
            entry => Ok(entry),
        }
    }

    pub fn remove(&mut self, handle: HandleId) -> DeviceFsResult<HandleEntry> {
        self.entries
            .remove(&handle)
            .ok_or(DeviceFsError::InvalidFileHandle(handle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

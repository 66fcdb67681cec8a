//! File record table
//!
//! Records live in an arena of slots; a filename index maps each key to its
//! slot. Handle entries refer to records by slot, so renaming a file only
//! re-keys the index and every open handle keeps resolving.

use crate::devicefs::error::{DeviceFsError, DeviceFsResult};
use crate::types::{DeviceType, HandleId};
use std::collections::{BTreeSet, HashMap};

/// Index of a record in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSlot(usize);

/// A registered device file
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Unique per registration, never reused
    pub record_id: u64,
    pub filename: String,
    pub device_type: DeviceType,
    pub subtype: String,
    /// Currently open handles on this file
    pub handles: BTreeSet<HandleId>,
}

pub struct FileTable {
    slots: Vec<Option<FileRecord>>,
    free_slots: Vec<usize>,
    index: HashMap<String, FileSlot>,
    next_record_id: u64,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            index: HashMap::new(),
            next_record_id: 1,
        }
    }

    /// Insert a record with an empty handle set
    pub fn insert(
        &mut self,
        filename: &str,
        device_type: DeviceType,
        subtype: &str,
    ) -> DeviceFsResult<FileSlot> {
        if self.index.contains_key(filename) {
            return Err(DeviceFsError::FilenameAlreadyExists(filename.to_string()));
        }

        let record = FileRecord {
            record_id: self.next_record_id,
            filename: filename.to_string(),
            device_type,
            subtype: subtype.to_string(),
            handles: BTreeSet::new(),
        };
        self.next_record_id += 1;

        let slot = match self.free_slots.pop() {
            Some(idx) => {
                self.slots[idx] = Some(record);
                FileSlot(idx)
            }
            None => {
                self.slots.push(Some(record));
                FileSlot(self.slots.len() - 1)
            }
        };

        self.index.insert(filename.to_string(), slot);
        Ok(slot)
    }

    pub fn lookup(&self, filename: &str) -> DeviceFsResult<FileSlot> {
        self.index
            .get(filename)
            .copied()
            .ok_or_else(|| DeviceFsError::FileNotFound(filename.to_string()))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.index.contains_key(filename)
    }

    pub fn get(&self, slot: FileSlot) -> Option<&FileRecord> {
        self.slots.get(slot.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, slot: FileSlot) -> Option<&mut FileRecord> {
        self.slots.get_mut(slot.0).and_then(|s| s.as_mut())
    }

    /// Record at `slot` only if it is still the same registration
    pub fn get_live(&self, slot: FileSlot, record_id: u64) -> Option<&FileRecord> {
        self.get(slot).filter(|r| r.record_id == record_id)
    }

    pub fn get_live_mut(&mut self, slot: FileSlot, record_id: u64) -> Option<&mut FileRecord> {
        self.get_mut(slot).filter(|r| r.record_id == record_id)
    }

    /// Remove a record, returning it with whatever handles it still held
    pub fn remove(&mut self, filename: &str) -> DeviceFsResult<FileRecord> {
        let slot = self
            .index
            .remove(filename)
            .ok_or_else(|| DeviceFsError::FileNotFound(filename.to_string()))?;

        let record = self.slots[slot.0]
            .take()
            .ok_or_else(|| DeviceFsError::DriverError(format!("empty slot for {}", filename)))?;
        self.free_slots.push(slot.0);
        Ok(record)
    }

    /// Move the record keyed `src` to key `dst`, leaving its slot,
    /// type, subtype and handle set unchanged
    pub fn rekey(&mut self, src: &str, dst: &str) -> DeviceFsResult<FileSlot> {
        if self.index.contains_key(dst) {
            return Err(DeviceFsError::FilenameAlreadyExists(dst.to_string()));
        }
        let slot = self
            .index
            .remove(src)
            .ok_or_else(|| DeviceFsError::FileNotFound(src.to_string()))?;

        if let Some(record) = self.get_mut(slot) {
            record.filename = dst.to_string();
        }
        self.index.insert(dst.to_string(), slot);
        Ok(slot)
    }

    /// Slots of every record assigned to the driver key
    pub fn slots_for_driver(&self, device_type: DeviceType, subtype: &str) -> Vec<FileSlot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.as_ref().map(|r| (idx, r)))
            .filter(|(_, r)| r.device_type == device_type && r.subtype == subtype)
            .map(|(idx, _)| FileSlot(idx))
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

//! Driver registry
//!
//! Keyed store of registered drivers, one per (device type, subtype).
//! Registration order is kept so listings are stable.

use crate::devicefs::driver::DeviceDriver;
use crate::devicefs::error::{DeviceFsError, DeviceFsResult};
use crate::types::DeviceType;
use linked_hash_map::LinkedHashMap;
use std::fmt;
use std::sync::Arc;

/// Registry key: device type plus subtype label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverKey {
    pub device_type: DeviceType,
    pub subtype: String,
}

impl DriverKey {
    pub fn new(device_type: DeviceType, subtype: &str) -> Self {
        Self {
            device_type,
            subtype: subtype.to_string(),
        }
    }
}

impl fmt::Display for DriverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_type, self.subtype)
    }
}

pub struct DriverRegistry {
    drivers: LinkedHashMap<DriverKey, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: LinkedHashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        device_type: DeviceType,
        subtype: &str,
        driver: Arc<dyn DeviceDriver>,
    ) -> DeviceFsResult<()> {
        let key = DriverKey::new(device_type, subtype);
        if self.drivers.contains_key(&key) {
            return Err(DeviceFsError::DriverAlreadyRegistered {
                device_type,
                subtype: subtype.to_string(),
            });
        }
        self.drivers.insert(key, driver);
        Ok(())
    }

    pub fn unregister(
        &mut self,
        device_type: DeviceType,
        subtype: &str,
    ) -> DeviceFsResult<Arc<dyn DeviceDriver>> {
        self.drivers
            .remove(&DriverKey::new(device_type, subtype))
            .ok_or_else(|| DeviceFsError::no_matching_driver(device_type, subtype))
    }

    pub fn lookup(
        &self,
        device_type: DeviceType,
        subtype: &str,
    ) -> DeviceFsResult<Arc<dyn DeviceDriver>> {
        self.drivers
            .get(&DriverKey::new(device_type, subtype))
            .cloned()
            .ok_or_else(|| DeviceFsError::no_matching_driver(device_type, subtype))
    }

    pub fn contains(&self, device_type: DeviceType, subtype: &str) -> bool {
        self.drivers
            .contains_key(&DriverKey::new(device_type, subtype))
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> Vec<DriverKey> {
        self.drivers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

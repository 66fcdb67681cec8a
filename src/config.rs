//! Configuration for the device filesystem and the VFS router
//!
//! Loaded from JSON; every field has a default so partial files work.

use crate::types::HandleId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// What to do when unregistering something that open handles still use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Refuse while any handle is open
    #[default]
    FailWhileReferenced,
    /// Release and close every referencing handle first
    ForceClose,
}

/// Whether a handle survives a failed driver close
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// The handle is consumed even if the driver reports failure
    #[default]
    ReleaseAlways,
    /// The handle stays valid when the driver's close fails
    KeepOnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFsConfig {
    /// First handle id handed out by `open`
    pub first_handle: HandleId,
    pub close_policy: ClosePolicy,
    pub reference_policy: ReferencePolicy,
}

impl Default for DeviceFsConfig {
    fn default() -> Self {
        Self {
            first_handle: 0,
            close_policy: ClosePolicy::default(),
            reference_policy: ReferencePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub eeprom_prefix: String,
    pub sdcard_prefix: String,
    pub device_prefix: String,
    pub devicefs: DeviceFsConfig,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            eeprom_prefix: "/eeprom".to_string(),
            sdcard_prefix: "/sdcard".to_string(),
            device_prefix: "/dev".to_string(),
            devicefs: DeviceFsConfig::default(),
        }
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

impl VfsConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: VfsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn prefixes(&self) -> [&str; 3] {
        [
            self.eeprom_prefix.as_str(),
            self.sdcard_prefix.as_str(),
            self.device_prefix.as_str(),
        ]
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for prefix in self.prefixes() {
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "prefix '{}' must be absolute, non-root and without a trailing '/'",
                    prefix
                )));
            }
        }

        let prefixes = self.prefixes();
        for (i, a) in prefixes.iter().enumerate() {
            for b in prefixes.iter().skip(i + 1) {
                if a == b || a.starts_with(&format!("{}/", b)) || b.starts_with(&format!("{}/", a)) {
                    return Err(ConfigError::Invalid(format!(
                        "prefixes '{}' and '{}' overlap",
                        a, b
                    )));
                }
            }
        }

        if self.devicefs.first_handle < 0 {
            return Err(ConfigError::Invalid(format!(
                "first_handle must be non-negative, got {}",
                self.devicefs.first_handle
            )));
        }
        Ok(())
    }
}

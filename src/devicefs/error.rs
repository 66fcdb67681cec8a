//! DeviceFS error definitions

use crate::devicefs::driver::DriverOp;
use crate::types::{DeviceType, HandleId};
use thiserror::Error;

/// Numeric status taxonomy shared by every device filesystem operation.
///
/// Codes between `DriverUnimplementedFunction`/`InvalidFileHandle` and
/// `Invalid` are reserved for this layer. Any other negative value is a
/// raw code from a driver and classifies as `Downstream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeviceFsStatus {
    Success = 0,
    NoMatchingDriver = -1,
    FileNotFound = -2,
    FilenameAlreadyExists = -3,
    DriverError = -4,
    DriverAlreadyRegistered = -5,
    DriverUnimplementedFunction = -6,
    InvalidFileHandle = -7,
    Invalid = -126,
    Downstream = -127,
}

/// Last status code in the contiguous block owned by this layer
pub const DEVICEFS_LAST_STATUS: i32 = DeviceFsStatus::InvalidFileHandle as i32;

impl DeviceFsStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Classify a raw integer result.
///
/// Non-negative results are successes, codes owned by this layer map to
/// their status, and every other negative value is a downstream code.
pub fn check_status(raw: i32) -> DeviceFsStatus {
    match raw {
        r if r >= 0 => DeviceFsStatus::Success,
        -1 => DeviceFsStatus::NoMatchingDriver,
        -2 => DeviceFsStatus::FileNotFound,
        -3 => DeviceFsStatus::FilenameAlreadyExists,
        -4 => DeviceFsStatus::DriverError,
        -5 => DeviceFsStatus::DriverAlreadyRegistered,
        -6 => DeviceFsStatus::DriverUnimplementedFunction,
        -7 => DeviceFsStatus::InvalidFileHandle,
        -126 => DeviceFsStatus::Invalid,
        _ => DeviceFsStatus::Downstream,
    }
}

/// DeviceFS error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceFsError {
    /// No driver registered for the device type and subtype
    #[error("No matching driver: {device_type}/{subtype}")]
    NoMatchingDriver {
        device_type: DeviceType,
        subtype: String,
    },
    /// Filename not in the file table
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Registration or rename target already exists
    #[error("Filename already exists: {0}")]
    FilenameAlreadyExists(String),
    /// Internal fault within this layer
    #[error("Driver error: {0}")]
    DriverError(String),
    /// Duplicate driver registry key
    #[error("Driver already registered: {device_type}/{subtype}")]
    DriverAlreadyRegistered {
        device_type: DeviceType,
        subtype: String,
    },
    /// The driver leaves this operation unimplemented
    #[error("Driver does not implement {0}")]
    DriverUnimplementedFunction(DriverOp),
    /// Handle absent from the handle table
    #[error("Invalid file handle: {0}")]
    InvalidFileHandle(HandleId),
    /// Malformed argument or request refused in the current state
    #[error("Invalid argument: {0}")]
    Invalid(String),
    /// Raw negative result from the driver, passed through untouched
    #[error("Downstream error (code {0})")]
    Downstream(i32),
}

impl DeviceFsError {
    pub fn no_matching_driver(device_type: DeviceType, subtype: &str) -> Self {
        DeviceFsError::NoMatchingDriver {
            device_type,
            subtype: subtype.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        DeviceFsError::Invalid(msg.into())
    }

    pub fn status(&self) -> DeviceFsStatus {
        match self {
            DeviceFsError::NoMatchingDriver { .. } => DeviceFsStatus::NoMatchingDriver,
            DeviceFsError::FileNotFound(_) => DeviceFsStatus::FileNotFound,
            DeviceFsError::FilenameAlreadyExists(_) => DeviceFsStatus::FilenameAlreadyExists,
            DeviceFsError::DriverError(_) => DeviceFsStatus::DriverError,
            DeviceFsError::DriverAlreadyRegistered { .. } => {
                DeviceFsStatus::DriverAlreadyRegistered
            }
            DeviceFsError::DriverUnimplementedFunction(_) => {
                DeviceFsStatus::DriverUnimplementedFunction
            }
            DeviceFsError::InvalidFileHandle(_) => DeviceFsStatus::InvalidFileHandle,
            DeviceFsError::Invalid(_) => DeviceFsStatus::Invalid,
            DeviceFsError::Downstream(_) => DeviceFsStatus::Downstream,
        }
    }

    /// Descriptor-style integer for this error.
    ///
    /// Downstream codes come back verbatim; everything else is the
    /// layer's own status code.
    pub fn raw_code(&self) -> i32 {
        match self {
            DeviceFsError::Downstream(code) => *code,
            other => other.status().code(),
        }
    }
}

/// Result type for DeviceFS operations
pub type DeviceFsResult<T> = Result<T, DeviceFsError>;

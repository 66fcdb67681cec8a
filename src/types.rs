use serde::{Deserialize, Serialize};
use std::fmt;

/// Global type definitions
///
/// Stores identifiers, bounds and metadata types shared by the device
/// filesystem and the outer VFS router
/// Handle ID type, returned by `open` and used by every per-open call
pub type HandleId = i32;

/// Descriptor handed out by a driver's own `open`
pub type DriverFd = i32;

/// Open flags (`libc::O_*` bit set)
pub type OpenFlags = i32;

/// Maximum filename length in bytes, excluding the terminator
pub const MAX_FILENAME_LEN: usize = 63;

/// Maximum driver subtype length in bytes, excluding the terminator
pub const MAX_SUBTYPE_LEN: usize = 15;

/// Read-only open
pub const O_RDONLY: OpenFlags = libc::O_RDONLY;

/// Write-only open
pub const O_WRONLY: OpenFlags = libc::O_WRONLY;

/// Read-write open
pub const O_RDWR: OpenFlags = libc::O_RDWR;

/// Primary kinds of backing store a driver can serve.
/// Drivers within one kind are told apart by a subtype label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// On-chip pins exposed as pseudo-files
    Pin,
    /// Real-time clock
    Rtc,
    /// SD-card backed store
    SdcardFs,
    /// EEPROM backed store
    EepromFs,
}

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Pin,
        DeviceType::Rtc,
        DeviceType::SdcardFs,
        DeviceType::EepromFs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Pin => "pin",
            DeviceType::Rtc => "rtc",
            DeviceType::SdcardFs => "sdcardfs",
            DeviceType::EepromFs => "eepromfs",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown device type: {}", s))
    }
}

/// File status returned by `fstat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Size in bytes
    pub size: u64,
    /// File type and permission bits (`libc::S_IF*` | perms)
    pub mode: u32,
    /// Preferred I/O block size
    pub blksize: u32,
    /// Last modification time (seconds)
    pub mtime: u64,
}

impl FileStat {
    /// Stat for a regular file of the given size
    pub fn regular(size: u64) -> Self {
        Self {
            size,
            mode: libc::S_IFREG as u32 | 0o644,
            blksize: 512,
            mtime: 0,
        }
    }

    /// Stat for a character device such as a pin or clock
    pub fn character_device() -> Self {
        Self {
            size: 0,
            mode: libc::S_IFCHR as u32 | 0o666,
            blksize: 1,
            mtime: 0,
        }
    }

    pub fn is_regular(&self) -> bool {
        (self.mode & libc::S_IFMT as u32) == libc::S_IFREG as u32
    }
}

/// Which bounded name is being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Filename,
    Subtype,
}

impl NameKind {
    pub fn max_len(&self) -> usize {
        match self {
            NameKind::Filename => MAX_FILENAME_LEN,
            NameKind::Subtype => MAX_SUBTYPE_LEN,
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Filename => f.write_str("filename"),
            NameKind::Subtype => f.write_str("subtype"),
        }
    }
}

/// Check a name against its bound.
///
/// Names are rejected, never truncated, so every table compares the
/// exact bytes the caller passed.
pub fn check_name(kind: NameKind, name: &str) -> Result<&str, String> {
    if name.is_empty() {
        return Err(format!("empty {}", kind));
    }
    if name.len() > kind.max_len() {
        return Err(format!(
            "{} '{}' exceeds {} bytes",
            kind,
            name,
            kind.max_len()
        ));
    }
    if name.contains('\0') {
        return Err(format!("{} contains NUL", kind));
    }
    Ok(name)
}

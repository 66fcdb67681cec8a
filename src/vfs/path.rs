//! Path classification and resolution
//!
//! Absolute paths are sorted into a `VfsKind` by matching the configured
//! mount prefixes. Relative paths are first joined to the working directory.

use crate::config::VfsConfig;
use crate::vfs::error::{VfsError, VfsResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsKind {
    Root,
    Eeprom,
    Sdcard,
    Device,
    /// The eeprom mountpoint itself
    EepromRoot,
    SdcardRoot,
    DeviceRoot,
    /// No mount prefix matched
    Error,
}

impl VfsKind {
    pub fn name(self) -> &'static str {
        match self {
            VfsKind::Root => "root",
            VfsKind::Eeprom => "eeprom",
            VfsKind::Sdcard => "sdcard",
            VfsKind::Device => "device",
            VfsKind::EepromRoot => "eeprom-root",
            VfsKind::SdcardRoot => "sdcard-root",
            VfsKind::DeviceRoot => "device-root",
            VfsKind::Error => "error",
        }
    }

    /// Kind of the backend serving this path, for anything under a mount
    pub fn mount(self) -> Option<VfsKind> {
        match self {
            VfsKind::Eeprom | VfsKind::EepromRoot => Some(VfsKind::Eeprom),
            VfsKind::Sdcard | VfsKind::SdcardRoot => Some(VfsKind::Sdcard),
            VfsKind::Device | VfsKind::DeviceRoot => Some(VfsKind::Device),
            VfsKind::Root | VfsKind::Error => None,
        }
    }

    pub fn is_mountpoint(self) -> bool {
        matches!(
            self,
            VfsKind::Root | VfsKind::EepromRoot | VfsKind::SdcardRoot | VfsKind::DeviceRoot
        )
    }
}

impl fmt::Display for VfsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mount prefixes, in the order they are tried
#[derive(Debug, Clone)]
pub struct Mounts {
    entries: [(String, VfsKind, VfsKind); 3],
}

impl Mounts {
    pub fn from_config(config: &VfsConfig) -> Self {
        Self {
            entries: [
                (config.eeprom_prefix.clone(), VfsKind::Eeprom, VfsKind::EepromRoot),
                (config.sdcard_prefix.clone(), VfsKind::Sdcard, VfsKind::SdcardRoot),
                (config.device_prefix.clone(), VfsKind::Device, VfsKind::DeviceRoot),
            ],
        }
    }

    /// Classify an absolute path and return the backend-relative remainder
    pub fn classify<'a>(&self, path: &'a str) -> (VfsKind, &'a str) {
        if path == "/" {
            return (VfsKind::Root, "");
        }
        for (prefix, kind, root_kind) in &self.entries {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() || rest == "/" {
                return (*root_kind, "");
            }
            if rest.starts_with('/') {
                return (*kind, rest.trim_start_matches('/'));
            }
        }
        (VfsKind::Error, "")
    }

    /// Mount names as listed under `/`
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(prefix, _, _)| prefix.trim_start_matches('/').to_string())
            .collect()
    }
}

impl Default for Mounts {
    fn default() -> Self {
        Self::from_config(&VfsConfig::default())
    }
}

/// Resolve `path` against `cwd` into a normalized absolute path
pub fn resolve(cwd: &str, path: &str) -> VfsResult<String> {
    if path.is_empty() {
        return Err(VfsError::InvalidArgument("empty path".to_string()));
    }
    if path.contains('\0') {
        return Err(VfsError::InvalidArgument(format!("path {:?} contains NUL", path)));
    }

    let base = if path.starts_with('/') { "" } else { cwd };
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_default_mounts() {
        let mounts = Mounts::default();
        assert_eq!(mounts.classify("/"), (VfsKind::Root, ""));
        assert_eq!(mounts.classify("/eeprom"), (VfsKind::EepromRoot, ""));
        assert_eq!(mounts.classify("/sdcard/"), (VfsKind::SdcardRoot, ""));
        assert_eq!(mounts.classify("/dev/pinA"), (VfsKind::Device, "pinA"));
        assert_eq!(
            mounts.classify("/sdcard/logs/today.txt"),
            (VfsKind::Sdcard, "logs/today.txt")
        );
        assert_eq!(mounts.classify("/devices/x").0, VfsKind::Error);
        assert_eq!(mounts.classify("/tmp").0, VfsKind::Error);
    }

    #[test]
    fn test_resolve_relative_and_dots() {
        assert_eq!(resolve("/", "dev/pinA").unwrap(), "/dev/pinA");
        assert_eq!(resolve("/sdcard/logs", "../data.bin").unwrap(), "/sdcard/data.bin");
        assert_eq!(resolve("/eeprom", "./a/./b").unwrap(), "/eeprom/a/b");
        assert_eq!(resolve("/eeprom", "/dev//pinA/").unwrap(), "/dev/pinA");
        assert_eq!(resolve("/", "../../..").unwrap(), "/");
        assert!(matches!(resolve("/", ""), Err(VfsError::InvalidArgument(_))));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(VfsKind::DeviceRoot.name(), "device-root");
        assert_eq!(VfsKind::Error.to_string(), "error");
        assert_eq!(VfsKind::SdcardRoot.mount(), Some(VfsKind::Sdcard));
        assert!(VfsKind::Root.is_mountpoint());
        assert!(!VfsKind::Eeprom.is_mountpoint());
    }
}

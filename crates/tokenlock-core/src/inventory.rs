//! Block device classification before destructive writes.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mountpoint: Option<String>,
    /// util-linux ≥ 2.37 reports every mountpoint as a list.
    #[serde(default)]
    pub mountpoints: Vec<Option<String>>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

impl BlockDevice {
    pub fn is_mounted(&self) -> bool {
        let mounted = |m: &Option<String>| m.as_deref().is_some_and(|s| !s.is_empty());
        mounted(&self.mountpoint) || self.mountpoints.iter().any(mounted)
    }

    /// First mounted device in this subtree, the device itself included.
    pub fn first_mounted(&self) -> Option<&BlockDevice> {
        if self.is_mounted() {
            return Some(self);
        }
        self.children.iter().find_map(BlockDevice::first_mounted)
    }
}

pub trait BlockDeviceInventory {
    fn describe(&self, device: &Path) -> Result<BlockDevice>;
}

/// Refuse anything that is not a whole, completely unmounted disk.
pub fn ensure_overwritable(device: &Path, info: &BlockDevice) -> Result<()> {
    let unsafe_device = |reason: String| Error::UnsafeDevice {
        device: device.to_path_buf(),
        reason,
    };
    if info.kind != "disk" {
        return Err(unsafe_device(format!(
            "device type is {:?}, expected \"disk\"",
            info.kind
        )));
    }
    if let Some(mounted) = info.first_mounted() {
        return Err(unsafe_device(format!("{} is mounted", mounted.name)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<BlockDevice>,
}

/// Queries `lsblk` for the device tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lsblk;

impl Lsblk {
    fn parse(device: &Path, stdout: &[u8]) -> Result<BlockDevice> {
        let parsed: LsblkOutput = serde_json::from_slice(stdout)
            .map_err(|e| Error::Inventory(format!("unparsable lsblk output: {e}")))?;
        parsed.blockdevices.into_iter().next().ok_or_else(|| {
            Error::Inventory(format!("lsblk reported nothing for {}", device.display()))
        })
    }
}

impl BlockDeviceInventory for Lsblk {
    fn describe(&self, device: &Path) -> Result<BlockDevice> {
        let output = Command::new("lsblk")
            .args(["--json", "--output", "NAME,TYPE,MOUNTPOINT"])
            .arg(device)
            .output()
            .map_err(|e| Error::Inventory(format!("run lsblk: {e}")))?;
        if !output.status.success() {
            return Err(Error::Inventory(format!(
                "lsblk {} failed: {}",
                device.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Self::parse(device, &output.stdout)
    }
}

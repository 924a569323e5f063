use crate::drives::{Device, FsType, PartitionType};
use crate::error::ConfigError;
use crate::internal::hardware;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Installability thresholds. These differ per platform, so they are read
/// from the installer settings instead of being baked in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
  /// Root size required when a swap partition exists
  pub min_root_gib: u64,
  /// Root size required when there is no swap partition and a swap file
  /// has to live on the root filesystem
  pub min_root_with_swap_gib: u64,
  pub boot_recommended_mib: u64,
  pub efi_recommended_gib: u64,
  /// Whether the machine booted in EFI mode
  pub efi: bool,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      min_root_gib: 20,
      min_root_with_swap_gib: 22,
      boot_recommended_mib: 300,
      efi_recommended_gib: 1,
      efi: false,
    }
  }
}

/// On-disk form of the policy. Missing keys fall back to the defaults and a
/// missing `efi` key means "ask the firmware".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyFile {
  min_root_gib: Option<u64>,
  min_root_with_swap_gib: Option<u64>,
  boot_recommended_mib: Option<u64>,
  efi_recommended_gib: Option<u64>,
  efi: Option<bool>,
}

impl Policy {
  pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
    let file: PolicyFile = toml::from_str(data)?;
    let defaults = Policy::default();
    Ok(Policy {
      min_root_gib: file.min_root_gib.unwrap_or(defaults.min_root_gib),
      min_root_with_swap_gib: file
        .min_root_with_swap_gib
        .unwrap_or(defaults.min_root_with_swap_gib),
      boot_recommended_mib: file
        .boot_recommended_mib
        .unwrap_or(defaults.boot_recommended_mib),
      efi_recommended_gib: file
        .efi_recommended_gib
        .unwrap_or(defaults.efi_recommended_gib),
      efi: file.efi.unwrap_or_else(hardware::is_efi),
    })
  }

  /// Read the policy file, or the defaults when no file is given
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    match path {
      Some(path) => {
        let data = std::fs::read_to_string(path)?;
        log::debug!("Read policy file {path:?}");
        Self::from_toml(&data)
      }
      None => Ok(Policy {
        efi: hardware::is_efi(),
        ..Policy::default()
      }),
    }
  }
}

/// Read a layout file: the JSON form of the device list
pub fn read_layout(path: &Path) -> Result<Vec<Device>, ConfigError> {
  let data = std::fs::read_to_string(path)?;
  log::debug!("Read layout file {path:?}");
  Ok(serde_json::from_str(&data)?)
}

/// A requested edit in a plan file. Partitions are addressed by their
/// block device path, new partitions by device and byte offset.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlanStep {
  Create {
    device: String,
    start: u64,
    size: String,
    #[serde(default)]
    logical: bool,
    #[serde(default)]
    fs: Option<String>,
    #[serde(default)]
    mount_point: Option<String>,
  },
  Delete {
    partition: String,
  },
  Resize {
    partition: String,
    size: String,
  },
  Format {
    partition: String,
    fs: String,
    #[serde(default)]
    mount_point: Option<String>,
  },
}

impl PlanStep {
  pub fn partition_type(logical: bool) -> PartitionType {
    if logical {
      PartitionType::Logical
    } else {
      PartitionType::Primary
    }
  }
  pub fn fs_type(name: Option<&str>) -> FsType {
    name.map(FsType::from_fs_name).unwrap_or_default()
  }
}

pub fn read_plan(path: &Path) -> Result<Vec<PlanStep>, ConfigError> {
  let data = std::fs::read_to_string(path)?;
  log::debug!("Read plan file {path:?}");
  Ok(serde_json::from_str(&data)?)
}

use thiserror::Error;

use crate::drives::PartitionType;

/// Rejected partition table edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
  #[error("Device not found: {0}")]
  DeviceNotFound(String),

  #[error("Partition {id} not found on {device}")]
  PartitionNotFound { device: String, id: u64 },

  #[error("Partition {0} is in use")]
  PartitionBusy(String),

  #[error("Extended partition {0} can not be edited directly")]
  ExtendedPartition(String),

  #[error("No more partitions can be created on {0}")]
  PartitionLimitReached(String),

  #[error("Not enough free space on {device}: {requested} bytes requested")]
  NotEnoughSpace { device: String, requested: u64 },

  #[error("Invalid partition size: {0} bytes")]
  InvalidSize(u64),

  #[error("Partitions of type {0:?} can not be created")]
  InvalidType(PartitionType),

  #[error("Mount point {mount_point} is already used on {device}")]
  MountPointInUse { device: String, mount_point: String },
}

/// Reasons a layout is not installable. Carries the numbers a presentation
/// layer needs to format its message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
  #[error("a root partition is required")]
  NoRootPartition,

  #[error("at least {required_gib} GiB is required for the root partition")]
  RootTooSmall { required_gib: u64 },

  #[error("an EFI partition is required")]
  NoEfiPartition,

  #[error("at least {required_gib} GiB is required for the EFI partition")]
  EfiTooSmall { required_gib: u64 },

  #[error("at least {required_mib} MiB is required for the /boot partition")]
  BootTooSmall { required_mib: u64 },
}

#[derive(Error, Debug)]
pub enum EncryptError {
  #[error("passwords do not match")]
  PasswordMismatch,

  #[error("password fields are disabled")]
  FieldDisabled,

  #[error("encryption settings already committed")]
  AlreadyFinished,

  #[error("failed to store the encryption password: {0}")]
  Sink(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid policy file: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("Invalid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Invalid lsblk output: {0}")]
  Lsblk(String),
}

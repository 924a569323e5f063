//! Installability checks over a proposed layout.

use log::debug;

use crate::drives::{Device, FsType, Partition};
use crate::error::LayoutError;
use crate::internal::Policy;
use crate::units::{gib_to_bytes, meets_threshold, mib_to_bytes};

pub const MOUNT_POINT_ROOT: &str = "/";
pub const MOUNT_POINT_BOOT: &str = "/boot";

/// Result of a successful validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutReport {
  /// No swap partition was found, so the install has to create a swap file
  pub swap_file_required: bool,
}

/// Receives the settings a successful validation hands on to later install
/// steps.
pub trait InstallSettings {
  fn write_requiring_swap_file(&mut self, required: bool);
}

/// The partitions the rules look at, found in one pass.
#[derive(Default)]
struct Classified<'a> {
  root: Option<&'a Partition>,
  boot: Option<&'a Partition>,
  efi: Option<&'a Partition>,
  swap: Option<&'a Partition>,
}

impl<'a> Classified<'a> {
  /// Each partition lands in at most one class, tested in the order root,
  /// boot, EFI, swap. The first partition seen keeps a class.
  fn scan(devices: &'a [Device]) -> Self {
    let mut found = Classified::default();
    for partition in devices.iter().flat_map(|d| d.used_partitions()) {
      let slot = if partition.mount_point() == MOUNT_POINT_ROOT {
        &mut found.root
      } else if partition.mount_point() == MOUNT_POINT_BOOT {
        &mut found.boot
      } else if partition.fs() == FsType::Efi {
        &mut found.efi
      } else if partition.fs() == FsType::LinuxSwap {
        &mut found.swap
      } else {
        continue;
      };
      if slot.is_none() {
        *slot = Some(partition);
      }
    }
    found
  }
}

/// Check that `devices` can be installed to under `policy`.
///
/// Rules run in a fixed order and the first failure is returned:
/// root present, root size, EFI present and size (EFI mode only),
/// then /boot size when a /boot partition exists.
pub fn validate(devices: &[Device], policy: &Policy) -> Result<LayoutReport, LayoutError> {
  let found = Classified::scan(devices);
  let swap_is_set = found.swap.is_some();

  let Some(root) = found.root else {
    return Err(LayoutError::NoRootPartition);
  };

  // Without a swap partition the swap file needs room on root.
  let root_required_gib = if swap_is_set {
    policy.min_root_gib
  } else {
    policy.min_root_with_swap_gib
  };
  if !meets_threshold(root.length(), gib_to_bytes(root_required_gib)) {
    debug!(
      "root {} has {} bytes, {} GiB required",
      root.describe(),
      root.length(),
      root_required_gib
    );
    return Err(LayoutError::RootTooSmall {
      required_gib: root_required_gib,
    });
  }

  if policy.efi {
    let Some(efi) = found.efi else {
      return Err(LayoutError::NoEfiPartition);
    };
    if !meets_threshold(efi.length(), gib_to_bytes(policy.efi_recommended_gib)) {
      return Err(LayoutError::EfiTooSmall {
        required_gib: policy.efi_recommended_gib,
      });
    }
  }

  if let Some(boot) = found.boot {
    if !meets_threshold(boot.length(), mib_to_bytes(policy.boot_recommended_mib)) {
      return Err(LayoutError::BootTooSmall {
        required_mib: policy.boot_recommended_mib,
      });
    }
  }

  Ok(LayoutReport {
    swap_file_required: !swap_is_set,
  })
}

/// Validate and, on success, pass the swap file decision on to `settings`.
pub fn validate_into(
  devices: &[Device],
  policy: &Policy,
  settings: &mut dyn InstallSettings,
) -> Result<LayoutReport, LayoutError> {
  let report = validate(devices, policy)?;
  settings.write_requiring_swap_file(report.swap_file_required);
  Ok(report)
}
